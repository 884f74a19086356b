use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ArpType {
    Request = 0,
    Response = 1,
}

/// `{ type, content }` — an ARP payload.
///
/// `content` is a MessagePack-encoded `String` (the requested NL
/// address) for [`ArpType::Request`], or an [`ArpReply`] tuple for
/// [`ArpType::Response`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpPayload {
    pub kind: ArpType,
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
}

/// `(l3, l2)` — the decoded content of an [`ArpType::Response`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArpReply {
    pub l3: String,
    pub l2: String,
}
