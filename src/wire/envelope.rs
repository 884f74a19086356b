use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Wire envelope message kind. Ordinals are part of the wire contract —
/// do not reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum MType {
    /// Zero value. Must never be emitted; decoding one is a protocol bug
    /// in the sender, logged and dropped by the receiver.
    Unknown = 0,
    Adv = 1,
    Data = 2,
    Arp = 3,
}

/// `{ kind, payload }` — the outermost, self-delimiting wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: MType,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}
