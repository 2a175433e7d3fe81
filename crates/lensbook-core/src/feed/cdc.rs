//! Change Data Capture (CDC) processing.
//!
//! Stores hand every committed mutation to a [`CdcHandle`]. A background
//! [`CdcProcessor`] drains the channel in FIFO order and publishes each record
//! on the change feed, so subscribers observe mutations in commit order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use lensbook_proto::ChangeRecord;

use super::memory::InMemoryChangeFeed;

/// CDC event processor that bridges store mutations to the change feed.
pub struct CdcProcessor {
    /// Receiver for change records.
    rx: mpsc::Receiver<ChangeRecord>,
    /// Feed the records are published on.
    feed: Arc<InMemoryChangeFeed>,
}

impl CdcProcessor {
    /// Create a new CDC processor.
    pub fn new(rx: mpsc::Receiver<ChangeRecord>, feed: Arc<InMemoryChangeFeed>) -> Self {
        Self { rx, feed }
    }

    /// Run the CDC processor until every sender is dropped.
    pub async fn run(mut self) {
        info!("CDC processor started");

        while let Some(record) = self.rx.recv().await {
            self.process_record(&record);
        }

        info!("CDC processor stopped (channel closed)");
    }

    fn process_record(&self, record: &ChangeRecord) {
        let delivered = self.feed.publish(record);
        debug!(
            table = %record.table,
            kind = ?record.kind,
            delivered,
            "processed CDC record"
        );
    }
}

/// CDC channel sender.
pub type CdcSender = mpsc::Sender<ChangeRecord>;

/// CDC channel receiver.
pub type CdcReceiver = mpsc::Receiver<ChangeRecord>;

/// Create a new CDC channel with the given buffer size.
pub fn channel(buffer_size: usize) -> (CdcSender, CdcReceiver) {
    mpsc::channel(buffer_size)
}

/// Handle for submitting records to a running CDC processor.
#[derive(Clone)]
pub struct CdcHandle {
    tx: CdcSender,
}

impl CdcHandle {
    /// Create a new CDC handle.
    pub fn new(tx: CdcSender) -> Self {
        Self { tx }
    }

    /// Submit a change record, waiting if the channel is full.
    pub async fn send(
        &self,
        record: ChangeRecord,
    ) -> Result<(), mpsc::error::SendError<ChangeRecord>> {
        self.tx.send(record).await
    }

    /// Submit a change record without waiting.
    pub fn try_send(
        &self,
        record: ChangeRecord,
    ) -> Result<(), mpsc::error::TrySendError<ChangeRecord>> {
        self.tx.try_send(record)
    }

    /// Whether the processor has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start a CDC processor and return a handle for sending records.
pub fn start_processor(feed: Arc<InMemoryChangeFeed>, buffer_size: usize) -> CdcHandle {
    let (tx, rx) = channel(buffer_size);
    let processor = CdcProcessor::new(rx, feed);

    tokio::spawn(async move {
        processor.run().await;
    });

    CdcHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ChangeCallback, ChangeFeed, SubscriptionRequest};
    use lensbook_proto::NOTIFICATIONS_TABLE;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_processor_publishes_in_order() {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |record| {
            sink.lock().push(record.new.clone());
            Ok(())
        });
        feed.subscribe(SubscriptionRequest::new(NOTIFICATIONS_TABLE), callback)
            .unwrap();

        let (tx, rx) = channel(10);
        let processor = CdcProcessor::new(rx, feed.clone());
        let task = tokio::spawn(processor.run());

        for i in 0..5 {
            tx.send(ChangeRecord::insert(NOTIFICATIONS_TABLE, json!({ "seq": i })))
                .await
                .unwrap();
        }
        drop(tx);
        task.await.unwrap();

        let seen = seen.lock();
        let seqs: Vec<i64> = seen
            .iter()
            .map(|row| row.as_ref().unwrap()["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_handle_clone_and_send() {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let handle1 = start_processor(feed, 10);
        let handle2 = handle1.clone();

        assert!(handle1
            .try_send(ChangeRecord::insert(NOTIFICATIONS_TABLE, json!({})))
            .is_ok());
        assert!(handle2
            .send(ChangeRecord::insert(NOTIFICATIONS_TABLE, json!({})))
            .await
            .is_ok());
        assert!(!handle1.is_closed());

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
