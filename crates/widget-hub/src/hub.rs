//! Connection Registry and Broadcast
//!
//! Reader loops feed one bounded event channel; a single worker drains it and
//! broadcasts. When the worker falls behind, readers wait on `send`, so the
//! channel is the only back-pressure point. Broadcast writes are sequential:
//! a slow client delays every client after it, but never by more than the
//! write timeout. A client that misses it is closed and deregistered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::error::{HubError, Result};
use crate::event::{HubEvent, Notice};

/// Default depth of the shared event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Default bound on a single client write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of one registered connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Write half of a client connection
#[async_trait]
pub trait ClientSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self);
}

/// Outcome of one broadcast
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Connections whose write failed; they are closed and deregistered
    pub dropped: usize,
}

/// Websocket notification hub
pub struct Hub {
    clients: Mutex<HashMap<ConnectionId, Box<dyn ClientSink>>>,
    events: mpsc::Sender<HubEvent>,
    write_timeout: Duration,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub").finish_non_exhaustive()
    }
}

impl Hub {
    /// Create a hub and the worker that must be spawned to drain its channel
    pub fn new(capacity: usize) -> (Arc<Self>, HubWorker) {
        Self::with_write_timeout(capacity, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(capacity: usize, write_timeout: Duration) -> (Arc<Self>, HubWorker) {
        let (events, rx) = mpsc::channel(capacity.max(1));
        let hub = Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            events,
            write_timeout,
        });
        let worker = HubWorker {
            hub: Arc::clone(&hub),
            rx,
        };
        (hub, worker)
    }

    /// Acknowledge and register a connection
    ///
    /// A connection whose acknowledgement cannot be written is closed and
    /// never registered.
    pub async fn register(&self, mut sink: Box<dyn ClientSink>) -> Result<ConnectionId> {
        let ack = serde_json::to_string(&Notice::ack())?;
        if let Err(e) = self.write(&mut sink, ack).await {
            self.close(&mut sink).await;
            return Err(e);
        }

        let id = ConnectionId::new();
        self.clients.lock().await.insert(id, sink);
        tracing::info!(connection = %id, "Client connected");
        Ok(id)
    }

    /// Read loop for one connection
    ///
    /// Frames that do not decode are ignored. Returns when the inbound stream
    /// ends, after deregistering the connection.
    pub async fn listen<S>(&self, id: ConnectionId, inbound: S)
    where
        S: Stream<Item = String> + Send,
    {
        let mut inbound = std::pin::pin!(inbound);
        while let Some(text) = inbound.next().await {
            let event = match HubEvent::decode(&text) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!(connection = %id, error = %e, "Ignoring malformed frame");
                    continue;
                }
            };
            if self.events.send(event).await.is_err() {
                tracing::warn!(connection = %id, "Event channel closed; stopping reader");
                break;
            }
        }
        self.deregister(id).await;
    }

    /// Queue an event from inside the server (e.g. an admin action)
    ///
    /// Never waits: a full channel is reported as [`HubError::ChannelFull`].
    pub fn publish(&self, event: HubEvent) -> Result<()> {
        self.events.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => HubError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => HubError::ChannelClosed,
        })
    }

    async fn write(&self, sink: &mut Box<dyn ClientSink>, text: String) -> Result<()> {
        tokio::time::timeout(self.write_timeout, sink.send_text(text))
            .await
            .unwrap_or(Err(HubError::WriteTimeout))
    }

    async fn close(&self, sink: &mut Box<dyn ClientSink>) {
        if tokio::time::timeout(self.write_timeout, sink.close()).await.is_err() {
            tracing::debug!("Client close timed out");
        }
    }

    /// Write `notice` to every connection, dropping those that fail
    pub async fn broadcast(&self, notice: &Notice) -> BroadcastReport {
        let text = match serde_json::to_string(notice) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Could not encode notice");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let mut clients = self.clients.lock().await;
        let mut failed = Vec::new();

        for (id, sink) in clients.iter_mut() {
            match self.write(sink, text.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(connection = %id, action = %notice.action, error = %e, "Websocket write failed");
                    failed.push(*id);
                }
            }
        }

        let removed: Vec<_> = failed.iter().filter_map(|id| clients.remove(id)).collect();
        drop(clients);
        report.dropped = failed.len();
        for mut sink in removed {
            self.close(&mut sink).await;
        }

        tracing::debug!(delivered = report.delivered, dropped = report.dropped, "Broadcast complete");
        report
    }

    pub async fn deregister(&self, id: ConnectionId) {
        let removed = self.clients.lock().await.remove(&id);
        if let Some(mut sink) = removed {
            self.close(&mut sink).await;
            tracing::info!(connection = %id, "Client disconnected");
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    async fn handle(&self, event: HubEvent) {
        match event.notice() {
            Some(notice) => {
                self.broadcast(&notice).await;
            }
            None => tracing::debug!(event = ?event, "Dropping unrecognized event"),
        }
    }
}

/// Single consumer of the event channel
pub struct HubWorker {
    hub: Arc<Hub>,
    rx: mpsc::Receiver<HubEvent>,
}

impl HubWorker {
    /// Drain events for the life of the hub
    pub async fn run(mut self) {
        tracing::info!("Notification hub worker started");
        while let Some(event) = self.rx.recv().await {
            self.hub.handle(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    type Outbox = Arc<StdMutex<Vec<String>>>;

    /// Accepts `ok_writes` writes, then fails every one after
    struct FakeSink {
        outbox: Outbox,
        closed: Arc<StdMutex<bool>>,
        ok_writes: usize,
    }

    /// Accepts the acknowledgement, then never finishes a write or a close
    struct StalledSink {
        acked: bool,
    }

    #[async_trait]
    impl ClientSink for StalledSink {
        async fn send_text(&mut self, _text: String) -> Result<()> {
            if !self.acked {
                self.acked = true;
                return Ok(());
            }
            futures::future::pending().await
        }

        async fn close(&mut self) {
            futures::future::pending::<()>().await;
        }
    }

    #[async_trait]
    impl ClientSink for FakeSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            if self.ok_writes == 0 {
                return Err(HubError::Write("broken pipe".into()));
            }
            self.ok_writes -= 1;
            self.outbox.lock().unwrap().push(text);
            Ok(())
        }

        async fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    fn sink(ok_writes: usize) -> (Box<dyn ClientSink>, Outbox, Arc<StdMutex<bool>>) {
        let outbox = Outbox::default();
        let closed = Arc::new(StdMutex::new(false));
        let sink = FakeSink {
            outbox: outbox.clone(),
            closed: closed.clone(),
            ok_writes,
        };
        (Box::new(sink), outbox, closed)
    }

    fn logout(user_id: i64) -> String {
        serde_json::to_string(&Notice::logout(user_id)).unwrap()
    }

    #[tokio::test]
    async fn test_register_sends_ack() {
        let (hub, _worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        let (sink, outbox, _) = sink(usize::MAX);

        hub.register(sink).await.unwrap();
        let sent = outbox.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Connected to server"));
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_ack_is_not_registered() {
        let (hub, _worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        let (sink, _, closed) = sink(0);

        assert!(hub.register(sink).await.is_err());
        assert!(*closed.lock().unwrap());
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_write_drops_only_that_client() {
        let (hub, _worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        let (first, first_out, _) = sink(usize::MAX);
        let (second, second_out, second_closed) = sink(1);
        let (third, third_out, _) = sink(usize::MAX);
        for s in [first, second, third] {
            hub.register(s).await.unwrap();
        }

        let report = hub.broadcast(&Notice::logout(7)).await;
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });

        assert_eq!(first_out.lock().unwrap().last(), Some(&logout(7)));
        assert_eq!(third_out.lock().unwrap().last(), Some(&logout(7)));
        assert_eq!(second_out.lock().unwrap().len(), 1);
        assert!(*second_closed.lock().unwrap());
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_listen_forwards_valid_frames_and_deregisters() {
        let (hub, mut worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        let (sink, _, closed) = sink(usize::MAX);
        let id = hub.register(sink).await.unwrap();

        let frames = futures::stream::iter(vec![
            "garbage".to_string(),
            r#"{"action":"deleteUser","user_id":3}"#.to_string(),
            r#"{"action":"typing"}"#.to_string(),
        ]);
        hub.listen(id, frames).await;

        assert_eq!(worker.rx.recv().await, Some(HubEvent::UserDeleted { user_id: 3 }));
        assert_eq!(
            worker.rx.recv().await,
            Some(HubEvent::Unrecognized { action: "typing".into() })
        );
        assert!(worker.rx.try_recv().is_err());
        assert_eq!(hub.connection_count().await, 0);
        assert!(*closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_worker_broadcasts_published_events() {
        let (hub, worker) = Hub::new(DEFAULT_EVENT_CAPACITY);
        let (sink, outbox, _) = sink(usize::MAX);
        hub.register(sink).await.unwrap();
        tokio::spawn(worker.run());

        hub.publish(HubEvent::Unrecognized { action: "noop".into() }).unwrap();
        hub.publish(HubEvent::UserDeleted { user_id: 9 }).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while outbox.lock().unwrap().len() < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let sent = outbox.lock().unwrap().clone();
        assert_eq!(sent, vec![serde_json::to_string(&Notice::ack()).unwrap(), logout(9)]);
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped_and_hub_keeps_serving() {
        let timeout = std::time::Duration::from_millis(50);
        let (hub, worker) = Hub::with_write_timeout(1, timeout);
        hub.register(Box::new(StalledSink { acked: false })).await.unwrap();
        let (healthy, healthy_out, _) = sink(usize::MAX);
        hub.register(healthy).await.unwrap();
        tokio::spawn(worker.run());

        hub.publish(HubEvent::UserDeleted { user_id: 1 }).unwrap();

        let deadline = std::time::Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            while hub.connection_count().await != 1 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(healthy_out.lock().unwrap().last(), Some(&logout(1)));

        hub.publish(HubEvent::UserDeleted { user_id: 2 }).unwrap();
        tokio::time::timeout(deadline, async {
            while healthy_out.lock().unwrap().last() != Some(&logout(2)) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_publish_never_waits_on_a_full_channel() {
        let (hub, _worker) = Hub::new(1);
        hub.publish(HubEvent::UserDeleted { user_id: 1 }).unwrap();
        assert!(matches!(
            hub.publish(HubEvent::UserDeleted { user_id: 2 }),
            Err(HubError::ChannelFull)
        ));
    }

    #[tokio::test]
    async fn test_publish_after_worker_gone() {
        let (hub, worker) = Hub::new(1);
        drop(worker);
        assert!(matches!(
            hub.publish(HubEvent::UserDeleted { user_id: 1 }),
            Err(HubError::ChannelClosed)
        ));
    }
}
