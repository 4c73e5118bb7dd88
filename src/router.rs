//! Coordination Router (§4.5): parses incoming serialized messages,
//! applies early-arrival buffering and cross-transport deduplication, and
//! hands the result to the caller for dispatch.

use crate::error::RouterError;
use crate::wire::Message;

/// One buffered slot each for `TimeRequest` and `ClientReady`, replayed
/// once the Sync Engine finishes initializing. Prevents connection-setup
/// races from stalling the handshake.
#[derive(Default)]
struct EarlyArrivalBuffer {
    time_request: Option<Message>,
    client_ready: Option<Message>,
}

/// Tracks the last-processed sequence per message class so a message
/// delivered redundantly over a second (e.g. more reliable, higher
/// latency) transport is dropped. First-received wins.
#[derive(Default)]
struct DedupTracker {
    last_beacon_sequence: Option<u8>,
}

impl DedupTracker {
    /// Returns `Err(RouterError::Duplicate)` for a beacon sequence already
    /// seen, recording the sequence otherwise.
    fn check(&mut self, msg: &Message) -> Result<(), RouterError> {
        if let Message::Beacon(b) = msg {
            if self.last_beacon_sequence == Some(b.sequence) {
                return Err(RouterError::Duplicate { sequence: b.sequence });
            }
            self.last_beacon_sequence = Some(b.sequence);
        }
        Ok(())
    }
}

pub struct Router {
    early: EarlyArrivalBuffer,
    dedup: DedupTracker,
}

impl Router {
    pub fn new() -> Self {
        Self {
            early: EarlyArrivalBuffer::default(),
            dedup: DedupTracker::default(),
        }
    }

    /// Decodes one wire message and applies buffering/dedup policy.
    /// Returns `Ok(None)` when the message was buffered — there's nothing
    /// further to dispatch this call. Returns `Err(RouterError::Duplicate)`
    /// for a beacon sequence already processed on another transport.
    pub fn ingest(&mut self, buf: &[u8], sync_initialized: bool) -> Result<Option<Message>, RouterError> {
        let (msg, _timestamp_ms) = Message::decode(buf)?;

        self.dedup.check(&msg)?;

        if !sync_initialized {
            match msg {
                Message::TimeRequest(_) => {
                    if self.early.time_request.is_some() {
                        return Err(RouterError::BufferFull);
                    }
                    self.early.time_request = Some(msg);
                    return Ok(None);
                }
                Message::ClientReady => {
                    if self.early.client_ready.is_some() {
                        return Err(RouterError::BufferFull);
                    }
                    self.early.client_ready = Some(msg);
                    return Ok(None);
                }
                _ => {}
            }
        }

        Ok(Some(msg))
    }

    /// Call once the Sync Engine finishes initializing: replays any
    /// buffered `TimeRequest`/`ClientReady`, clearing the buffer.
    pub fn drain_buffered(&mut self) -> heapless::Vec<Message, 2> {
        let mut out = heapless::Vec::new();
        if let Some(m) = self.early.time_request.take() {
            let _ = out.push(m);
        }
        if let Some(m) = self.early.client_ready.take() {
            let _ = out.push(m);
        }
        out
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Beacon, Message, TimeRequest};

    fn encode(msg: &Message) -> heapless::Vec<u8, { crate::wire::MAX_MESSAGE_LEN }> {
        let mut buf = [0u8; crate::wire::MAX_MESSAGE_LEN];
        let n = msg.encode(0, &mut buf);
        let mut v = heapless::Vec::new();
        v.extend_from_slice(&buf[..n]).unwrap();
        v
    }

    #[test]
    fn time_request_buffered_before_sync_init_then_replayed() {
        let mut router = Router::new();
        let msg = Message::TimeRequest(TimeRequest { t1_us: 42 });
        let bytes = encode(&msg);

        assert_eq!(router.ingest(&bytes, false).unwrap(), None);
        let replayed = router.drain_buffered();
        assert_eq!(replayed.as_slice(), &[msg]);
    }

    #[test]
    fn second_early_message_overflows_buffer_slot() {
        let mut router = Router::new();
        let msg = Message::TimeRequest(TimeRequest { t1_us: 1 });
        let bytes = encode(&msg);
        router.ingest(&bytes, false).unwrap();
        assert_eq!(router.ingest(&bytes, false), Err(RouterError::BufferFull));
    }

    #[test]
    fn duplicate_beacon_across_transports_dropped() {
        let mut router = Router::new();
        let msg = Message::Beacon(Beacon::new_with_crc(1000, 0, 2000, 25, 0, 5));
        let bytes = encode(&msg);

        assert_eq!(router.ingest(&bytes, true).unwrap(), Some(msg));
        // same sequence, arriving 50ms later via a second transport
        assert_eq!(
            router.ingest(&bytes, true),
            Err(RouterError::Duplicate { sequence: 5 })
        );
    }

    #[test]
    fn after_sync_init_time_request_dispatched_directly() {
        let mut router = Router::new();
        let msg = Message::TimeRequest(TimeRequest { t1_us: 7 });
        let bytes = encode(&msg);
        assert_eq!(router.ingest(&bytes, true).unwrap(), Some(msg));
    }
}
