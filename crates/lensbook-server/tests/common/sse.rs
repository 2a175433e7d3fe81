//! Client-side reading of `text/event-stream` bodies.

/// A parsed event-stream block, as a client would see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Joined `data:` lines, if any.
    pub data: Option<String>,
    /// Comment text, if the block carried one.
    pub comment: Option<String>,
}

impl RawEvent {
    /// Parse one block (without its terminating blank line).
    pub fn parse(block: &str) -> Result<Self, String> {
        let mut event = RawEvent::default();
        let mut data_lines: Vec<&str> = Vec::new();

        for line in block.lines() {
            if let Some(comment) = line.strip_prefix(':') {
                event.comment = Some(comment.trim_start().to_string());
                continue;
            }
            let Some((field, value)) = line.split_once(':') else {
                return Err(format!("line without a field separator: {line:?}"));
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "event" => event.event = Some(value.to_string()),
                "data" => data_lines.push(value),
                "id" | "retry" => {}
                other => return Err(format!("unknown field `{other}`")),
            }
        }

        if !data_lines.is_empty() {
            event.data = Some(data_lines.join("\n"));
        }
        if event == RawEvent::default() {
            return Err(format!("empty block: {block:?}"));
        }
        Ok(event)
    }

    /// Split a buffer into complete blocks and the unconsumed tail.
    ///
    /// Any block that does not parse fails the whole split.
    pub fn split(buffer: &str) -> Result<(Vec<RawEvent>, String), String> {
        let mut events = Vec::new();
        let mut rest = buffer;
        while let Some(pos) = rest.find("\n\n") {
            events.push(RawEvent::parse(&rest[..pos])?);
            rest = &rest[pos + 2..];
        }
        Ok((events, rest.to_string()))
    }

    /// Whether this block is a keep-alive comment.
    pub fn is_heartbeat(&self) -> bool {
        self.event.is_none() && self.data.is_none() && self.comment.as_deref() == Some("heartbeat")
    }
}
