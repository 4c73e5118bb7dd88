//! Wireless transport abstraction (§6, upstream): `transport_send` /
//! `transport_on_recv`. The transport itself — radio init, advertising,
//! GATT layout — is out of scope; this crate only consumes a send/recv
//! pair.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConnected,
}

pub trait Transport {
    /// Fire-and-forget send; may fail with `NotConnected` mid-reconnect.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use super::{Transport, TransportError};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One direction of an in-memory, back-to-back transport pair, with
    /// optional injected one-way latency and a connected/disconnected
    /// flag for simulating link loss.
    #[derive(Clone)]
    pub struct MockLink {
        inbox: Arc<Mutex<VecDeque<(Vec<u8>, i64)>>>,
        connected: Arc<Mutex<bool>>,
    }

    impl MockLink {
        pub fn new() -> Self {
            Self {
                inbox: Arc::new(Mutex::new(VecDeque::new())),
                connected: Arc::new(Mutex::new(true)),
            }
        }

        pub fn set_connected(&self, connected: bool) {
            *self.connected.lock().unwrap() = connected;
        }

        /// Delivers `bytes` to be received at `rx_time_us`, as if the
        /// other end just transmitted it.
        pub fn deliver(&self, bytes: &[u8], rx_time_us: i64) {
            self.inbox.lock().unwrap().push_back((bytes.to_vec(), rx_time_us));
        }

        /// Drains everything queued with an rx-timestamp `<= now_us`.
        pub fn poll(&self, now_us: i64) -> Vec<(Vec<u8>, i64)> {
            let mut inbox = self.inbox.lock().unwrap();
            let mut out = Vec::new();
            while let Some((_, t)) = inbox.front() {
                if *t <= now_us {
                    out.push(inbox.pop_front().unwrap());
                } else {
                    break;
                }
            }
            out
        }
    }

    impl Default for MockLink {
        fn default() -> Self {
            Self::new()
        }
    }

    /// One node's endpoint of a simulated pair: sends land in `peer`'s
    /// inbox at `now_us + latency_us`.
    pub struct MockTransport {
        pub peer: MockLink,
        pub latency_us: i64,
        pub now_us: Arc<Mutex<i64>>,
    }

    impl Transport for MockTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if !*self.peer.connected.lock().unwrap() {
                return Err(TransportError::NotConnected);
            }
            let now = *self.now_us.lock().unwrap();
            self.peer.deliver(bytes, now + self.latency_us);
            Ok(())
        }
    }
}
