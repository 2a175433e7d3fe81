//! Frame to server-sent event conversion.

use axum::response::sse::Event;
use serde_json::json;

use lensbook_proto::{Frame, HEARTBEAT_COMMENT};

/// Build the wire event for a frame.
///
/// Inserts and updates carry the full row, deletes only the id. The connect
/// frame is an unnamed message and heartbeats are bare comments.
pub fn sse_event(frame: &Frame) -> Result<Event, axum::Error> {
    let event = match frame {
        Frame::Connected => Event::default().json_data(json!({ "type": "connected" }))?,
        Frame::Heartbeat => Event::default().comment(HEARTBEAT_COMMENT),
        Frame::Notification(notification) | Frame::NotificationUpdate(notification) => {
            Event::default()
                .event(frame.name())
                .json_data(notification.as_ref())?
        }
        Frame::NotificationDelete { notification_id } => Event::default()
            .event(frame.name())
            .json_data(json!({ "notificationId": notification_id }))?,
    };
    Ok(event)
}

/// Render events exactly as the response body writes them.
#[cfg(test)]
pub(crate) async fn render(events: Vec<Event>) -> String {
    use axum::response::{IntoResponse, Sse};

    let stream = futures::stream::iter(events.into_iter().map(Ok::<_, std::convert::Infallible>));
    let body = Sse::new(stream).into_response().into_body();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
