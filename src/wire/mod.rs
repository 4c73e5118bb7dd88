//! Coordination message protocol: discriminated union, framing, and the
//! little-endian packed wire codec for each type.
//!
//! Every message begins with a 1-byte type tag and a 4-byte
//! `timestamp_ms` (leader time, diagnostics only), followed by a
//! type-specific fixed-length payload. Receivers validate the declared
//! length before parsing — there is no length prefix because every type
//! has a compile-time known size.

pub mod crc;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::RouterError;

const ENVELOPE_LEN: usize = 5;

/// Node identifier, compared lexicographically for role-election tiebreak.
pub type NodeId = [u8; 6];

macro_rules! type_tag {
    ($($name:ident = $val:expr),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum MessageType {
            $($name = $val),*
        }

        impl MessageType {
            pub fn from_tag(tag: u8) -> Option<Self> {
                match tag {
                    $($val => Some(MessageType::$name),)*
                    _ => None,
                }
            }
        }
    };
}

type_tag! {
    TimeRequest = 0,
    TimeResponse = 1,
    Beacon = 2,
    ModeProposal = 3,
    ModeAck = 4,
    ActivationReport = 5,
    ReverseProbe = 6,
    ReverseProbeResponse = 7,
    Shutdown = 8,
    Settings = 9,
    FirmwareVersion = 10,
    StartAdvertising = 11,
    ClientBattery = 12,
    ClientReady = 13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRequest {
    pub t1_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeResponse {
    pub t1_us: u64,
    pub t2_us: u64,
    pub t3_us: u64,
    pub epoch_us: u64,
    pub period_ms: u32,
}

/// 25 bytes per the wire format table: `leader_time_us(u64) epoch_us(u64)
/// period_ms(u32) duty_percent(u8) mode_id(u8) sequence(u8) crc16(u16)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    pub leader_time_us: u64,
    pub epoch_us: u64,
    pub period_ms: u32,
    pub duty_percent: u8,
    pub mode_id: u8,
    pub sequence: u8,
    pub crc16_ccitt: u16,
}

pub const BEACON_WIRE_LEN: usize = 25;

impl Beacon {
    /// Encodes the beacon body (the 23 bytes the checksum covers) and
    /// appends the freshly computed CRC, producing the full 25-byte form.
    pub fn new_with_crc(
        leader_time_us: u64,
        epoch_us: u64,
        period_ms: u32,
        duty_percent: u8,
        mode_id: u8,
        sequence: u8,
    ) -> Self {
        let mut buf = [0u8; BEACON_WIRE_LEN];
        LittleEndian::write_u64(&mut buf[0..8], leader_time_us);
        LittleEndian::write_u64(&mut buf[8..16], epoch_us);
        LittleEndian::write_u32(&mut buf[16..20], period_ms);
        buf[20] = duty_percent;
        buf[21] = mode_id;
        buf[22] = sequence;
        let crc16_ccitt = crc::crc16_ccitt(&buf[0..23]);
        Beacon {
            leader_time_us,
            epoch_us,
            period_ms,
            duty_percent,
            mode_id,
            sequence,
            crc16_ccitt,
        }
    }

    pub fn encode(&self, buf: &mut [u8; BEACON_WIRE_LEN]) {
        LittleEndian::write_u64(&mut buf[0..8], self.leader_time_us);
        LittleEndian::write_u64(&mut buf[8..16], self.epoch_us);
        LittleEndian::write_u32(&mut buf[16..20], self.period_ms);
        buf[20] = self.duty_percent;
        buf[21] = self.mode_id;
        buf[22] = self.sequence;
        LittleEndian::write_u16(&mut buf[23..25], self.crc16_ccitt);
    }

    /// Decodes and validates the CRC in one step; `Err(CrcMismatch)` if the
    /// checksum over bytes `0..23` doesn't match the trailing field.
    pub fn decode(buf: &[u8]) -> Result<Self, RouterError> {
        if buf.len() < BEACON_WIRE_LEN {
            return Err(RouterError::LengthMismatch {
                expected: BEACON_WIRE_LEN,
                actual: buf.len(),
            });
        }
        let crc16_ccitt = LittleEndian::read_u16(&buf[23..25]);
        Ok(Beacon {
            leader_time_us: LittleEndian::read_u64(&buf[0..8]),
            epoch_us: LittleEndian::read_u64(&buf[8..16]),
            period_ms: LittleEndian::read_u32(&buf[16..20]),
            duty_percent: buf[20],
            mode_id: buf[21],
            sequence: buf[22],
            crc16_ccitt,
        })
    }

    pub fn crc_valid(&self) -> bool {
        let mut buf = [0u8; BEACON_WIRE_LEN];
        self.encode(&mut buf);
        crc::crc16_ccitt(&buf[0..23]) == self.crc16_ccitt
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProposal {
    pub new_mode: u8,
    pub new_period_ms: u32,
    pub new_active_ms: u32,
    pub leader_effective_us: u64,
    pub follower_effective_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeAck {
    pub new_mode: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationReport {
    pub actual_active_time_sync_us: u64,
    pub target_time_sync_us: u64,
    pub measured_error_ms: i32,
    pub cycle: u32,
    pub beacon_t1_us: u64,
    pub beacon_t2_us: u64,
    pub report_t3_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseProbe {
    pub probe_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseProbeResponse {
    pub probe_id: u32,
    pub t_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBattery {
    pub percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// Opaque blob forwarded to the external settings-persistence collaborator
/// untouched; the core never interprets its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub raw: [u8; 16],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    TimeRequest(TimeRequest),
    TimeResponse(TimeResponse),
    Beacon(Beacon),
    ModeProposal(ModeProposal),
    ModeAck(ModeAck),
    ActivationReport(ActivationReport),
    ReverseProbe(ReverseProbe),
    ReverseProbeResponse(ReverseProbeResponse),
    Shutdown,
    Settings(Settings),
    FirmwareVersion(FirmwareVersion),
    StartAdvertising,
    ClientBattery(ClientBattery),
    ClientReady,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::TimeRequest(_) => MessageType::TimeRequest,
            Message::TimeResponse(_) => MessageType::TimeResponse,
            Message::Beacon(_) => MessageType::Beacon,
            Message::ModeProposal(_) => MessageType::ModeProposal,
            Message::ModeAck(_) => MessageType::ModeAck,
            Message::ActivationReport(_) => MessageType::ActivationReport,
            Message::ReverseProbe(_) => MessageType::ReverseProbe,
            Message::ReverseProbeResponse(_) => MessageType::ReverseProbeResponse,
            Message::Shutdown => MessageType::Shutdown,
            Message::Settings(_) => MessageType::Settings,
            Message::FirmwareVersion(_) => MessageType::FirmwareVersion,
            Message::StartAdvertising => MessageType::StartAdvertising,
            Message::ClientBattery(_) => MessageType::ClientBattery,
            Message::ClientReady => MessageType::ClientReady,
        }
    }

    fn payload_len(ty: MessageType) -> usize {
        use MessageType::*;
        match ty {
            TimeRequest => 8,
            TimeResponse => 8 + 8 + 8 + 8 + 4,
            Beacon => BEACON_WIRE_LEN,
            ModeProposal => 1 + 1 + 4 + 4 + 8 + 8,
            ModeAck => 1,
            ActivationReport => 8 + 8 + 4 + 4 + 8 + 8 + 8,
            ReverseProbe => 4,
            ReverseProbeResponse => 4 + 8,
            Shutdown => 0,
            Settings => 16,
            FirmwareVersion => 3,
            StartAdvertising => 0,
            ClientBattery => 1,
            ClientReady => 0,
        }
    }

    /// Total wire length (envelope + payload) for a given type.
    pub fn wire_len(ty: MessageType) -> usize {
        ENVELOPE_LEN + Self::payload_len(ty)
    }

    /// Encodes the envelope and payload into `buf`, returning the number
    /// of bytes written. `buf` must be at least `wire_len()` long.
    pub fn encode(&self, timestamp_ms: u32, buf: &mut [u8]) -> usize {
        let ty = self.message_type();
        let total = Self::wire_len(ty);
        assert!(buf.len() >= total);

        buf[0] = ty as u8;
        LittleEndian::write_u32(&mut buf[1..5], timestamp_ms);
        let body = &mut buf[ENVELOPE_LEN..total];

        match self {
            Message::TimeRequest(m) => {
                LittleEndian::write_u64(&mut body[0..8], m.t1_us);
            }
            Message::TimeResponse(m) => {
                LittleEndian::write_u64(&mut body[0..8], m.t1_us);
                LittleEndian::write_u64(&mut body[8..16], m.t2_us);
                LittleEndian::write_u64(&mut body[16..24], m.t3_us);
                LittleEndian::write_u64(&mut body[24..32], m.epoch_us);
                LittleEndian::write_u32(&mut body[32..36], m.period_ms);
            }
            Message::Beacon(m) => {
                let mut bb = [0u8; BEACON_WIRE_LEN];
                m.encode(&mut bb);
                body.copy_from_slice(&bb);
            }
            Message::ModeProposal(m) => {
                body[0] = m.new_mode;
                body[1] = 0; // pad, per §6 field list
                LittleEndian::write_u32(&mut body[2..6], m.new_period_ms);
                LittleEndian::write_u32(&mut body[6..10], m.new_active_ms);
                LittleEndian::write_u64(&mut body[10..18], m.leader_effective_us);
                LittleEndian::write_u64(&mut body[18..26], m.follower_effective_us);
            }
            Message::ModeAck(m) => {
                body[0] = m.new_mode;
            }
            Message::ActivationReport(m) => {
                LittleEndian::write_u64(&mut body[0..8], m.actual_active_time_sync_us);
                LittleEndian::write_u64(&mut body[8..16], m.target_time_sync_us);
                LittleEndian::write_i32(&mut body[16..20], m.measured_error_ms);
                LittleEndian::write_u32(&mut body[20..24], m.cycle);
                LittleEndian::write_u64(&mut body[24..32], m.beacon_t1_us);
                LittleEndian::write_u64(&mut body[32..40], m.beacon_t2_us);
                LittleEndian::write_u64(&mut body[40..48], m.report_t3_us);
            }
            Message::ReverseProbe(m) => {
                LittleEndian::write_u32(&mut body[0..4], m.probe_id);
            }
            Message::ReverseProbeResponse(m) => {
                LittleEndian::write_u32(&mut body[0..4], m.probe_id);
                LittleEndian::write_u64(&mut body[4..12], m.t_us);
            }
            Message::Shutdown => {}
            Message::Settings(m) => {
                body.copy_from_slice(&m.raw);
            }
            Message::FirmwareVersion(m) => {
                body[0] = m.major;
                body[1] = m.minor;
                body[2] = m.patch;
            }
            Message::StartAdvertising => {}
            Message::ClientBattery(m) => {
                body[0] = m.percent;
            }
            Message::ClientReady => {}
        }

        total
    }

    /// Parses the envelope, validates the declared type's fixed length,
    /// and decodes the payload. Returns the message plus its
    /// `timestamp_ms` envelope field.
    pub fn decode(buf: &[u8]) -> Result<(Self, u32), RouterError> {
        if buf.len() < ENVELOPE_LEN {
            return Err(RouterError::LengthMismatch {
                expected: ENVELOPE_LEN,
                actual: buf.len(),
            });
        }
        let ty = MessageType::from_tag(buf[0]).ok_or(RouterError::UnknownType(buf[0]))?;
        let timestamp_ms = LittleEndian::read_u32(&buf[1..5]);
        let total = Self::wire_len(ty);
        if buf.len() < total {
            return Err(RouterError::LengthMismatch {
                expected: total,
                actual: buf.len(),
            });
        }
        let body = &buf[ENVELOPE_LEN..total];

        let msg = match ty {
            MessageType::TimeRequest => Message::TimeRequest(TimeRequest {
                t1_us: LittleEndian::read_u64(&body[0..8]),
            }),
            MessageType::TimeResponse => Message::TimeResponse(TimeResponse {
                t1_us: LittleEndian::read_u64(&body[0..8]),
                t2_us: LittleEndian::read_u64(&body[8..16]),
                t3_us: LittleEndian::read_u64(&body[16..24]),
                epoch_us: LittleEndian::read_u64(&body[24..32]),
                period_ms: LittleEndian::read_u32(&body[32..36]),
            }),
            MessageType::Beacon => Message::Beacon(Beacon::decode(body)?),
            MessageType::ModeProposal => Message::ModeProposal(ModeProposal {
                new_mode: body[0],
                // body[1] is the pad byte (§6 field list), not parsed.
                new_period_ms: LittleEndian::read_u32(&body[2..6]),
                new_active_ms: LittleEndian::read_u32(&body[6..10]),
                leader_effective_us: LittleEndian::read_u64(&body[10..18]),
                follower_effective_us: LittleEndian::read_u64(&body[18..26]),
            }),
            MessageType::ModeAck => Message::ModeAck(ModeAck { new_mode: body[0] }),
            MessageType::ActivationReport => Message::ActivationReport(ActivationReport {
                actual_active_time_sync_us: LittleEndian::read_u64(&body[0..8]),
                target_time_sync_us: LittleEndian::read_u64(&body[8..16]),
                measured_error_ms: LittleEndian::read_i32(&body[16..20]),
                cycle: LittleEndian::read_u32(&body[20..24]),
                beacon_t1_us: LittleEndian::read_u64(&body[24..32]),
                beacon_t2_us: LittleEndian::read_u64(&body[32..40]),
                report_t3_us: LittleEndian::read_u64(&body[40..48]),
            }),
            MessageType::ReverseProbe => Message::ReverseProbe(ReverseProbe {
                probe_id: LittleEndian::read_u32(&body[0..4]),
            }),
            MessageType::ReverseProbeResponse => {
                Message::ReverseProbeResponse(ReverseProbeResponse {
                    probe_id: LittleEndian::read_u32(&body[0..4]),
                    t_us: LittleEndian::read_u64(&body[4..12]),
                })
            }
            MessageType::Shutdown => Message::Shutdown,
            MessageType::Settings => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(body);
                Message::Settings(Settings { raw })
            }
            MessageType::FirmwareVersion => Message::FirmwareVersion(FirmwareVersion {
                major: body[0],
                minor: body[1],
                patch: body[2],
            }),
            MessageType::StartAdvertising => Message::StartAdvertising,
            MessageType::ClientBattery => Message::ClientBattery(ClientBattery { percent: body[0] }),
            MessageType::ClientReady => Message::ClientReady,
        };

        Ok((msg, timestamp_ms))
    }
}

/// Upper bound on a single encoded message, for sizing static buffers.
pub const MAX_MESSAGE_LEN: usize = ENVELOPE_LEN + 48; // ActivationReport is the largest payload

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(msg: Message) {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let n = msg.encode(1234, &mut buf);
        let (decoded, ts) = Message::decode(&buf[..n]).expect("decode");
        assert_eq!(ts, 1234);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn roundtrip_all_types() {
        roundtrip(Message::TimeRequest(TimeRequest { t1_us: 42 }));
        roundtrip(Message::TimeResponse(TimeResponse {
            t1_us: 1,
            t2_us: 2,
            t3_us: 3,
            epoch_us: 4,
            period_ms: 5,
        }));
        roundtrip(Message::Beacon(Beacon::new_with_crc(1000, 500, 2000, 25, 0, 7)));
        roundtrip(Message::ModeProposal(ModeProposal {
            new_mode: 1,
            new_period_ms: 1000,
            new_active_ms: 250,
            leader_effective_us: 99,
            follower_effective_us: 199,
        }));
        roundtrip(Message::ModeAck(ModeAck { new_mode: 1 }));
        roundtrip(Message::ActivationReport(ActivationReport {
            actual_active_time_sync_us: 1,
            target_time_sync_us: 2,
            measured_error_ms: -3,
            cycle: 4,
            beacon_t1_us: 5,
            beacon_t2_us: 6,
            report_t3_us: 7,
        }));
        roundtrip(Message::ReverseProbe(ReverseProbe { probe_id: 9 }));
        roundtrip(Message::ReverseProbeResponse(ReverseProbeResponse {
            probe_id: 9,
            t_us: 10,
        }));
        roundtrip(Message::Shutdown);
        roundtrip(Message::Settings(Settings { raw: [1; 16] }));
        roundtrip(Message::FirmwareVersion(FirmwareVersion {
            major: 1,
            minor: 2,
            patch: 3,
        }));
        roundtrip(Message::StartAdvertising);
        roundtrip(Message::ClientBattery(ClientBattery { percent: 77 }));
        roundtrip(Message::ClientReady);
    }

    #[test]
    fn beacon_crc_accepts_self_produced() {
        let b = Beacon::new_with_crc(123_456, 0, 2000, 25, 0, 1);
        assert!(b.crc_valid());
    }

    #[test]
    fn beacon_crc_rejects_single_byte_mutation() {
        let b = Beacon::new_with_crc(123_456, 0, 2000, 25, 0, 1);
        let mut buf = [0u8; BEACON_WIRE_LEN];
        b.encode(&mut buf);
        for i in 0..23 {
            let mut mutated = buf;
            mutated[i] ^= 0xFF;
            let decoded = Beacon::decode(&mutated).unwrap();
            assert!(!decoded.crc_valid(), "byte {} mutation not detected", i);
        }
    }

    #[test]
    fn unknown_type_tag_rejected() {
        let buf = [250u8, 0, 0, 0, 0];
        assert_eq!(Message::decode(&buf), Err(RouterError::UnknownType(250)));
    }

    #[test]
    fn truncated_message_rejected() {
        let buf = [MessageType::TimeRequest as u8, 0, 0, 0, 0, 1, 2];
        assert!(matches!(
            Message::decode(&buf),
            Err(RouterError::LengthMismatch { .. })
        ));
    }
}
