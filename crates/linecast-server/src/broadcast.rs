//! Line fan-out to every registered connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use linecast_core::{ConnectionId, Line};
use linecast_telemetry::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_FAILURES_TOTAL};
use tracing::{debug, warn};

use crate::connection::{DisconnectReason, SendError};
use crate::registry::ConnectionRegistry;

/// Outcome of one [`Broadcaster::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Members in the snapshot that were offered the line.
    pub recipients: usize,
    /// Members whose queue accepted the line.
    pub delivered: usize,
    /// Members that could not take the line.
    pub failed: usize,
}

/// Delivers each published line to every member of a registry snapshot.
///
/// Enqueueing never blocks: a member whose outbound queue is full is evicted
/// as a slow consumer rather than silently skipped, so any member that stays
/// connected has received every line published while it was registered.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    echo_to_sender: bool,
    lines_published: AtomicU64,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, echo_to_sender: bool) -> Self {
        Self {
            registry,
            echo_to_sender,
            lines_published: AtomicU64::new(0),
        }
    }

    /// Deliver `line` to every current member.
    ///
    /// `origin` identifies the sending connection; it is skipped when
    /// self-delivery is disabled. Per-member failures never abort delivery to
    /// the others.
    pub fn publish(&self, line: &Line, origin: Option<&ConnectionId>) -> PublishReport {
        let _ = self.lines_published.fetch_add(1, Ordering::Relaxed);
        let members = self.registry.snapshot();
        let mut report = PublishReport::default();

        for conn in &members {
            if !self.echo_to_sender && origin == Some(conn.id()) {
                continue;
            }
            report.recipients += 1;
            match conn.send(line.clone()) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Full) => {
                    report.failed += 1;
                    warn!(conn_id = %conn.id(), peer = %conn.peer_addr(), "outbound queue full, evicting");
                    metrics::counter!(BROADCAST_FAILURES_TOTAL, "reason" => "full").increment(1);
                    conn.terminate(DisconnectReason::SlowConsumer);
                }
                Err(SendError::Closed) => {
                    report.failed += 1;
                    debug!(conn_id = %conn.id(), "skipping closing connection");
                    metrics::counter!(BROADCAST_FAILURES_TOTAL, "reason" => "closed").increment(1);
                }
            }
        }

        metrics::counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        debug!(
            origin = origin.map(ConnectionId::as_str),
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            "published line"
        );
        report
    }

    /// Whether senders receive their own lines.
    pub fn echo_to_sender(&self) -> bool {
        self.echo_to_sender
    }

    /// Total lines published since start.
    pub fn lines_published(&self) -> u64 {
        self.lines_published.load(Ordering::Relaxed)
    }

    /// The registry this broadcaster delivers to.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_member(
        registry: &ConnectionRegistry,
        capacity: usize,
    ) -> (Arc<Connection>, mpsc::Receiver<Line>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Arc::new(Connection::new(
            ConnectionId::new(),
            "127.0.0.1:40000".parse().unwrap(),
            tx,
            CancellationToken::new(),
        ));
        assert!(registry.add(conn.clone()));
        (conn, rx)
    }

    #[tokio::test]
    async fn publish_reaches_every_member_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let mut rxs: Vec<_> = (0..3).map(|_| make_member(&registry, 8)).collect();

        let report = broadcaster.publish(&Line::from("hi"), None);
        assert_eq!(
            report,
            PublishReport {
                recipients: 3,
                delivered: 3,
                failed: 0
            }
        );
        for (_, rx) in &mut rxs {
            assert_eq!(rx.recv().await.unwrap().as_str(), "hi");
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn recipients_share_one_allocation() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let (_a, mut ra) = make_member(&registry, 8);
        let (_b, mut rb) = make_member(&registry, 8);

        let line = Line::from("shared");
        let _ = broadcaster.publish(&line, None);
        let got_a = ra.recv().await.unwrap();
        let got_b = rb.recv().await.unwrap();
        assert!(Line::ptr_eq(&got_a, &line));
        assert!(Line::ptr_eq(&got_b, &line));
    }

    #[tokio::test]
    async fn sender_receives_own_line_when_echo_enabled() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let (sender, mut rx) = make_member(&registry, 8);

        let report = broadcaster.publish(&Line::from("hello"), Some(sender.id()));
        assert_eq!(report.delivered, 1);
        assert_eq!(rx.recv().await.unwrap().as_str(), "hello");
    }

    #[test]
    fn sender_skipped_when_echo_disabled() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), false);
        let (sender, mut sender_rx) = make_member(&registry, 8);
        let (_other, mut other_rx) = make_member(&registry, 8);

        let report = broadcaster.publish(&Line::from("x"), Some(sender.id()));
        assert_eq!(report.recipients, 1);
        assert!(sender_rx.try_recv().is_err());
        assert_eq!(other_rx.try_recv().unwrap().as_str(), "x");
    }

    #[test]
    fn publish_to_empty_registry_is_noop() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry, true);
        let report = broadcaster.publish(&Line::from("into the void"), None);
        assert_eq!(report, PublishReport::default());
        assert_eq!(broadcaster.lines_published(), 1);
    }

    #[test]
    fn full_queue_evicts_member_without_affecting_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let (slow, _slow_rx) = make_member(&registry, 1);
        let (fast, mut fast_rx) = make_member(&registry, 8);

        let _ = broadcaster.publish(&Line::from("1"), None);
        let report = broadcaster.publish(&Line::from("2"), None);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(slow.disconnect_reason(), Some(DisconnectReason::SlowConsumer));
        assert!(!fast.is_terminating());
        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "1");
        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "2");
    }

    #[test]
    fn closed_member_is_skipped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let (gone, gone_rx) = make_member(&registry, 8);
        drop(gone_rx);
        let (_live, mut live_rx) = make_member(&registry, 8);

        let report = broadcaster.publish(&Line::from("still delivered"), None);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        // Closed is not an eviction: the handler reports its own reason.
        assert!(gone.disconnect_reason().is_none());
        assert_eq!(live_rx.try_recv().unwrap().as_str(), "still delivered");
    }

    #[test]
    fn per_sender_order_preserved() {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), true);
        let (_m, mut rx) = make_member(&registry, 64);

        for i in 0..20 {
            let _ = broadcaster.publish(&Line::from(format!("msg {i}")), None);
        }
        for i in 0..20 {
            assert_eq!(rx.try_recv().unwrap().as_str(), format!("msg {i}"));
        }
    }
}
