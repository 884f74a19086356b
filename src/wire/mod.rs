//! Wire protocol encode/decode.
//!
//! The codec is MessagePack via `rmp-serde`, matching the reference
//! implementation. Every payload type is a plain struct with fields in
//! wire order; `rmp-serde`'s unnamed (array) encoding turns that
//! declaration order directly into the tuple layout spec.md §6 requires,
//! so no manual tuple plumbing is needed. Enum ordinals are pinned with
//! `serde_repr` so they survive independently of declaration order.

mod adv;
mod arp;
mod data;
mod envelope;

pub use adv::{AdvPayload, AdvType, RouteAdvertisement};
pub use arp::{ArpPayload, ArpReply, ArpType};
pub use data::DataPayload;
pub use envelope::{Envelope, MType};

/// Errors produced while encoding or decoding wire frames.
///
/// Every variant is recoverable by the caller: a decode failure means the
/// frame must be dropped, never that the process should panic or abort.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame too short to contain a valid envelope")]
    Truncated,

    #[error("envelope kind {found:?} does not match expected payload kind {expected:?}")]
    WrongKind { expected: MType, found: MType },

    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// Encode a payload and wrap it in an envelope of the given kind.
pub fn encode_envelope<T: serde::Serialize>(kind: MType, payload: &T) -> Result<Vec<u8>, CodecError> {
    let payload_bytes = rmp_serde::to_vec(payload)?;
    let envelope = Envelope { kind, payload: payload_bytes };
    Ok(rmp_serde::to_vec(&envelope)?)
}

/// Decode the outer envelope only, leaving the payload bytes opaque.
///
/// Decoding is total: any malformed or truncated frame yields a
/// [`CodecError`] rather than panicking.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Truncated);
    }
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Decode `envelope.payload` as `T`, requiring that the envelope's kind
/// matches `expected`. Mismatches return an error instead of guessing.
pub fn decode_as<T: serde::de::DeserializeOwned>(
    envelope: &Envelope,
    expected: MType,
) -> Result<T, CodecError> {
    if envelope.kind != expected {
        return Err(CodecError::WrongKind { expected, found: envelope.kind });
    }
    Ok(rmp_serde::from_slice(&envelope.payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let adv = RouteAdvertisement { address: "deadbeef".into(), distance: 64 };
        let content = rmp_serde::to_vec(&adv).unwrap();
        let payload = AdvPayload { origin: "feedface".into(), kind: AdvType::Advertisement, content, reserved: String::new() };
        let bytes = encode_envelope(MType::Adv, &payload).unwrap();

        let envelope = decode_envelope(&bytes).unwrap();
        assert_eq!(envelope.kind, MType::Adv);

        let decoded: AdvPayload = decode_as(&envelope, MType::Adv).unwrap();
        assert_eq!(decoded.origin, "feedface");
        let decoded_adv: RouteAdvertisement = rmp_serde::from_slice(&decoded.content).unwrap();
        assert_eq!(decoded_adv, adv);
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let payload = DataPayload { ttl: 255, data: vec![1, 2, 3], src: "a".into(), dst: "b".into() };
        let bytes = encode_envelope(MType::Data, &payload).unwrap();
        let envelope = decode_envelope(&bytes).unwrap();
        let err = decode_as::<AdvPayload>(&envelope, MType::Adv);
        assert!(matches!(err, Err(CodecError::WrongKind { expected: MType::Adv, found: MType::Data })));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert!(matches!(decode_envelope(&[]), Err(CodecError::Truncated)));
        assert!(decode_envelope(&[0xff, 0x00, 0x01]).is_err());
    }

    #[test]
    fn unknown_kind_is_never_emitted_by_accident() {
        // MType::Unknown is the zero value; production code paths must
        // never construct an envelope with it.
        assert_eq!(MType::Unknown as u8, 0);
    }
}
