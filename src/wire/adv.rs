use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum AdvType {
    Advertisement = 0,
    /// Reserved on the wire; handlers log and drop it (spec §9).
    Retraction = 1,
}

/// `{ origin, type, content, dummy }` — an ADV payload.
///
/// `content` is itself a MessagePack-encoded [`RouteAdvertisement`] when
/// `kind` is [`AdvType::Advertisement`]; retractions carry no content
/// schema since they are unimplemented. `reserved` is a wire-format
/// placeholder field kept for layout parity with the reference codec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvPayload {
    pub origin: String,
    pub kind: AdvType,
    #[serde(with = "serde_bytes")]
    pub content: Vec<u8>,
    pub reserved: String,
}

/// The decoded content of an [`AdvType::Advertisement`] ADV payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAdvertisement {
    pub address: String,
    pub distance: u8,
}
