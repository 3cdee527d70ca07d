/// Fixed integer tags for `kind` (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Announce = 1,
    Have = 2,
    Request = 3,
    Deliver = 4,
    Ack = 5,
    Cancel = 6,
    Discover = 7,
}

impl MessageKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Announce),
            2 => Some(Self::Have),
            3 => Some(Self::Request),
            4 => Some(Self::Deliver),
            5 => Some(Self::Ack),
            6 => Some(Self::Cancel),
            7 => Some(Self::Discover),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AckStatus {
    Ok = 0,
    ChecksumFail = 1,
    Expired = 2,
}

impl AckStatus {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Ok),
            1 => Some(Self::ChecksumFail),
            2 => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A run of present chunk indices `[start, start+run_len)`, used both in the
/// Announce/Have availability bitmap (RLE) and in Request's index ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: u32,
    pub run_len: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnounceBody {
    pub object_id: [u8; 32],
    pub total_chunks: u32,
    pub chunk_size: u32,
    pub band: u16,
    pub frequency_hz: u32,
    pub availability: Vec<Run>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaveBody {
    pub object_id: [u8; 32],
    pub availability: Vec<Run>,
    pub last_seen_unix: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverBody {
    pub object_id: [u8; 32],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub object_id: [u8; 32],
    pub ranges: Vec<Run>,
    pub deadline_ms: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverBody {
    pub object_id: [u8; 32],
    pub index: u32,
    pub length: u32,
    pub chunk_hash: [u8; 32],
    pub bytes: bytes::Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AckBody {
    pub object_id: [u8; 32],
    pub index: u32,
    pub status: AckStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelBody {
    pub transfer_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Announce(AnnounceBody),
    Have(HaveBody),
    Discover(DiscoverBody),
    Request(RequestBody),
    Deliver(DeliverBody),
    Ack(AckBody),
    Cancel(CancelBody),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Announce(_) => MessageKind::Announce,
            Message::Have(_) => MessageKind::Have,
            Message::Discover(_) => MessageKind::Discover,
            Message::Request(_) => MessageKind::Request,
            Message::Deliver(_) => MessageKind::Deliver,
            Message::Ack(_) => MessageKind::Ack,
            Message::Cancel(_) => MessageKind::Cancel,
        }
    }
}
