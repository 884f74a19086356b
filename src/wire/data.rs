use serde::{Deserialize, Serialize};

/// `{ ttl, data, src, dst }` — a DATA payload.
///
/// `data` is already ciphertext under `dst`'s public key; this codec has
/// no knowledge of the crypto primitive used to produce it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPayload {
    pub ttl: u8,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub src: String,
    pub dst: String,
}

impl DataPayload {
    pub const DEFAULT_TTL: u8 = 255;
}
