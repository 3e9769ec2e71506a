//! Liveness heartbeats and other broadcast notifications.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::transport::Publisher;

use super::SERVER_TARGET;

/// Frame broadcast when the heartbeat interval elapses.
pub const HEARTBEAT: &[u8] = b"FCT_HEARTBEAT";

/// Publishes notifications and keeps the heartbeat schedule.
///
/// Every broadcast postpones the next heartbeat by a full interval, so a
/// busy notification stream doubles as a liveness signal. Publishing is best
/// effort: failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct Broadcaster {
    publisher: Arc<dyn Publisher>,
    interval: Duration,
    next_heartbeat: Arc<Mutex<Instant>>,
}

impl Broadcaster {
    /// Creates a broadcaster whose first heartbeat is due one interval from
    /// now.
    pub fn new(publisher: Arc<dyn Publisher>, interval: Duration) -> Self {
        Self {
            publisher,
            interval,
            next_heartbeat: Arc::new(Mutex::new(Instant::now() + interval)),
        }
    }

    /// Sends `message` to every subscriber.
    pub fn broadcast(&self, message: &[u8]) {
        if let Err(error) = self.publisher.publish(message) {
            warn!(
                target: SERVER_TARGET,
                error = %error,
                "broadcast failed"
            );
        }
        self.reschedule(Instant::now());
    }

    /// Sends a heartbeat if one is due at `now`. Returns whether one was
    /// sent.
    pub fn heartbeat_if_due(&self, now: Instant) -> bool {
        if now < self.due() {
            return false;
        }
        trace!(target: SERVER_TARGET, "heartbeat");
        self.broadcast(HEARTBEAT);
        true
    }

    fn due(&self) -> Instant {
        *self
            .next_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reschedule(&self, now: Instant) {
        *self
            .next_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = now + self.interval;
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Broadcaster")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::transport::TransportError;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        messages: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn messages(&self) -> Vec<Vec<u8>> {
            self.messages.lock().expect("messages lock").clone()
        }
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, message: &[u8]) -> Result<(), TransportError> {
            self.messages
                .lock()
                .expect("messages lock")
                .push(message.to_vec());
            if self.fail {
                return Err(TransportError::Publish {
                    source: zmq::Error::EAGAIN,
                });
            }
            Ok(())
        }
    }

    #[test]
    fn heartbeat_waits_for_the_interval() {
        let publisher = Arc::new(RecordingPublisher::default());
        let broadcaster = Broadcaster::new(publisher.clone(), Duration::from_secs(5));
        let now = Instant::now();
        assert!(!broadcaster.heartbeat_if_due(now));
        assert!(broadcaster.heartbeat_if_due(now + Duration::from_secs(6)));
        assert_eq!(publisher.messages(), vec![HEARTBEAT.to_vec()]);
    }

    #[test]
    fn any_broadcast_postpones_the_heartbeat() {
        let publisher = Arc::new(RecordingPublisher::default());
        let broadcaster = Broadcaster::new(publisher.clone(), Duration::from_millis(200));
        std::thread::sleep(Duration::from_millis(150));
        broadcaster.broadcast(b"relay tripped");
        assert!(!broadcaster.heartbeat_if_due(Instant::now() + Duration::from_millis(100)));
        assert_eq!(publisher.messages(), vec![b"relay tripped".to_vec()]);
    }

    #[test]
    fn publisher_failures_are_not_fatal() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        });
        let broadcaster = Broadcaster::new(publisher.clone(), Duration::ZERO);
        assert!(broadcaster.heartbeat_if_due(Instant::now()));
        assert!(broadcaster.heartbeat_if_due(Instant::now()));
        assert_eq!(publisher.messages().len(), 2);
    }
}
