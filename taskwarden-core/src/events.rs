use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out channel of executed task ids.
///
/// The underlying channel is created on the first subscribe and dropped on
/// `close`, which ends every outstanding receiver. Publishing with no
/// channel or no live receivers is a silent no-op, and late subscribers
/// never see earlier events.
pub struct ExecutionEvents {
    sender: Option<broadcast::Sender<String>>,
}

impl ExecutionEvents {
    pub fn new() -> Self {
        Self { sender: None }
    }

    /// Hand out a receiver; dropping it unsubscribes.
    pub fn subscribe(&mut self) -> broadcast::Receiver<String> {
        match &self.sender {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
                self.sender = Some(sender);
                receiver
            }
        }
    }

    /// Fire-and-forget. A send error only means nobody is listening.
    pub fn publish(&self, task_id: &str) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(task_id.to_string());
        }
    }

    pub fn close(&mut self) {
        self.sender = None;
    }
}

impl Default for ExecutionEvents {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn subscriber_receives_published_ids() {
        let mut events = ExecutionEvents::new();
        let mut rx = events.subscribe();
        events.publish("sync");
        assert_eq!(rx.recv().await.unwrap(), "sync");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let events = ExecutionEvents::new();
        events.publish("sync");
    }

    #[tokio::test]
    async fn late_subscribers_do_not_see_earlier_events() {
        let mut events = ExecutionEvents::new();
        let mut first = events.subscribe();
        events.publish("before");
        let mut late = events.subscribe();
        events.publish("after");

        assert_eq!(first.recv().await.unwrap(), "before");
        assert_eq!(first.recv().await.unwrap(), "after");
        assert_eq!(late.recv().await.unwrap(), "after");
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn delivery_order_matches_publish_order() {
        let mut events = ExecutionEvents::new();
        let mut rx = events.subscribe();
        events.publish("a");
        events.publish("b");
        events.publish("c");
        assert_eq!(rx.recv().await.unwrap(), "a");
        assert_eq!(rx.recv().await.unwrap(), "b");
        assert_eq!(rx.recv().await.unwrap(), "c");
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_event() {
        let mut events = ExecutionEvents::new();
        let mut rx1 = events.subscribe();
        let mut rx2 = events.subscribe();
        events.publish("sync");
        assert_eq!(rx1.recv().await.unwrap(), "sync");
        assert_eq!(rx2.recv().await.unwrap(), "sync");
    }

    #[tokio::test]
    async fn close_ends_outstanding_receivers() {
        let mut events = ExecutionEvents::new();
        let mut rx = events.subscribe();
        events.close();
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[tokio::test]
    async fn subscribing_after_close_starts_a_fresh_channel() {
        let mut events = ExecutionEvents::new();
        let _old = events.subscribe();
        events.close();
        let mut rx = events.subscribe();
        events.publish("sync");
        assert_eq!(rx.recv().await.unwrap(), "sync");
    }

    #[tokio::test]
    async fn a_dropped_receiver_does_not_affect_the_rest() {
        let mut events = ExecutionEvents::new();
        let rx_dropped = events.subscribe();
        let mut rx = events.subscribe();
        drop(rx_dropped);
        events.publish("sync");
        assert_eq!(rx.recv().await.unwrap(), "sync");
    }
}
