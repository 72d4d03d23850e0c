//! Progress fan-out — one running investigation's events demultiplexed
//! to N subscribers.
//!
//! Each subscriber owns a bounded queue. Emission never blocks the loop:
//! when a queue is full, the oldest non-terminal event is dropped in
//! favor of the newest; terminal events (`Completed`/`Error`) always
//! enqueue. Ordering is preserved per subscriber, delivery is
//! at-most-once, and a slow subscriber affects nobody else.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use quarry_domain::progress::ProgressEvent;

/// Per-subscriber queue bound. Beyond it, oldest-non-terminal drops.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;

struct QueueInner {
    events: VecDeque<ProgressEvent>,
    closed: bool,
    dropped: u64,
}

struct SubscriberQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SubscriberQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                events: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn push(&self, event: ProgressEvent) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            if !event.is_terminal() && inner.events.len() >= SUBSCRIBER_QUEUE_CAPACITY {
                if let Some(pos) = inner.events.iter().position(|e| !e.is_terminal()) {
                    inner.events.remove(pos);
                    inner.dropped += 1;
                }
            }
            inner.events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Receiver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receiving end of one subscription.
pub struct ProgressReceiver {
    queue: Arc<SubscriberQueue>,
}

impl ProgressReceiver {
    /// Await the next event. Returns `None` once the channel is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            let notified = self.queue.notify.notified();
            {
                let mut inner = self.queue.inner.lock();
                if let Some(event) = inner.events.pop_front() {
                    return Some(event);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking poll.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.queue.inner.lock().events.pop_front()
    }

    /// Events this subscriber lost to backpressure.
    pub fn dropped(&self) -> u64 {
        self.queue.inner.lock().dropped
    }
}

impl Drop for ProgressReceiver {
    fn drop(&mut self) {
        self.queue.close();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Event bus keyed by investigation id.
#[derive(Default)]
pub struct ProgressBus {
    channels: RwLock<HashMap<String, Vec<Arc<SubscriberQueue>>>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for an investigation. Safe to call while
    /// events are being emitted.
    pub fn subscribe(&self, investigation_id: &str) -> ProgressReceiver {
        let queue = Arc::new(SubscriberQueue::new());
        let mut channels = self.channels.write();
        let subscribers = channels.entry(investigation_id.to_string()).or_default();
        // Dropped receivers leave closed queues behind; prune them here.
        subscribers.retain(|q| !q.is_closed());
        subscribers.push(queue.clone());
        ProgressReceiver { queue }
    }

    /// Deliver an event to every live subscriber of an investigation.
    pub fn publish(&self, investigation_id: &str, event: &ProgressEvent) {
        let channels = self.channels.read();
        if let Some(subscribers) = channels.get(investigation_id) {
            for queue in subscribers {
                queue.push(event.clone());
            }
        }
    }

    /// Close an investigation's channel: subscribers drain whatever is
    /// queued and then see end-of-stream.
    pub fn close(&self, investigation_id: &str) {
        if let Some(subscribers) = self.channels.write().remove(investigation_id) {
            for queue in subscribers {
                queue.close();
            }
        }
    }

    pub fn subscriber_count(&self, investigation_id: &str) -> usize {
        self.channels
            .read()
            .get(investigation_id)
            .map(|subs| subs.iter().filter(|q| !q.is_closed()).count())
            .unwrap_or(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The loop's emission handle: a bus plus an investigation id, or a
/// no-op when nobody is listening.
#[derive(Clone, Default)]
pub struct ProgressSink {
    target: Option<(Arc<ProgressBus>, String)>,
}

impl ProgressSink {
    pub fn new(bus: Arc<ProgressBus>, investigation_id: impl Into<String>) -> Self {
        Self {
            target: Some((bus, investigation_id.into())),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Emit without ever blocking the loop.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some((bus, id)) = &self.target {
            bus.publish(id, &event);
        }
    }

    /// End the stream for all subscribers.
    pub fn close(&self) {
        if let Some((bus, id)) = &self.target {
            bus.close(id);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(n: usize) -> ProgressEvent {
        ProgressEvent::Progress {
            message: format!("message {n}"),
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe("inv1");

        for n in 0..3 {
            bus.publish("inv1", &progress(n));
        }
        bus.close("inv1");

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event.render_text());
        }
        assert_eq!(received, vec!["message 0", "message 1", "message 2"]);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_non_terminal() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe("inv1");

        for n in 0..(SUBSCRIBER_QUEUE_CAPACITY + 10) {
            bus.publish("inv1", &progress(n));
        }
        bus.publish(
            "inv1",
            &ProgressEvent::Completed {
                summary: serde_json::json!({}),
            },
        );
        bus.close("inv1");

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        // Queue capacity of non-terminal events plus the terminal one.
        assert_eq!(received.len(), SUBSCRIBER_QUEUE_CAPACITY + 1);
        // The oldest events were dropped, the newest survived.
        assert_eq!(received[0].render_text(), "message 10");
        assert!(received.last().unwrap().is_terminal());
        assert_eq!(rx.dropped(), 10);
    }

    #[tokio::test]
    async fn terminal_event_is_never_dropped() {
        let bus = ProgressBus::new();
        let mut rx = bus.subscribe("inv1");

        for n in 0..SUBSCRIBER_QUEUE_CAPACITY {
            bus.publish("inv1", &progress(n));
        }
        bus.publish(
            "inv1",
            &ProgressEvent::Error {
                message: "boom".into(),
            },
        );
        bus.close("inv1");

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(ProgressEvent::Error { .. })));
    }

    #[tokio::test]
    async fn subscribers_are_independent() {
        let bus = Arc::new(ProgressBus::new());
        let mut fast = bus.subscribe("inv1");
        let _slow = bus.subscribe("inv1");

        bus.publish("inv1", &progress(0));
        // The slow subscriber never reads; the fast one still gets its
        // event immediately.
        assert!(fast.try_recv().is_some());
    }

    #[tokio::test]
    async fn publish_to_unknown_id_is_a_no_op() {
        let bus = ProgressBus::new();
        bus.publish("ghost", &progress(0));
        assert_eq!(bus.subscriber_count("ghost"), 0);
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_subscribe() {
        let bus = ProgressBus::new();
        let rx = bus.subscribe("inv1");
        drop(rx);
        let _rx2 = bus.subscribe("inv1");
        assert_eq!(bus.subscriber_count("inv1"), 1);
    }

    #[tokio::test]
    async fn sink_close_ends_stream() {
        let bus = Arc::new(ProgressBus::new());
        let mut rx = bus.subscribe("inv1");
        let sink = ProgressSink::new(bus.clone(), "inv1");

        sink.emit(progress(1));
        sink.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn disabled_sink_is_silent() {
        let sink = ProgressSink::disabled();
        sink.emit(progress(1));
        sink.close();
    }
}
