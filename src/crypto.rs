//! The asymmetric-crypto primitive identity and routing are built on.
//!
//! spec.md treats encryption as opaque: `encrypt(plaintext, peer_public_key)`
//! / `decrypt(ciphertext, own_private_key)`. [`Crypto`] is that seam, so a
//! different construction can be swapped in without touching [`crate::router`]
//! or [`crate::identity`]. [`X25519Fernet`] is the default: X25519 ECDH to a
//! shared secret, HKDF-SHA256 to split it into an encryption key and a MAC
//! key, then AES-128-CBC with an HMAC-SHA256 tag over IV‖ciphertext — the
//! same Fernet-style construction the reference crypto module uses.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type HmacSha256 = Hmac<Sha256>;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;
const ENC_KEY_LEN: usize = 16;
const MAC_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("network address is not a valid public key")]
    InvalidAddress,

    #[error("ciphertext shorter than iv + mac overhead")]
    Truncated,

    #[error("hmac verification failed")]
    BadMac,

    #[error("block cipher padding was invalid")]
    BadPadding,
}

/// The opaque asymmetric-crypto primitive spec.md §1 calls out.
///
/// Implementations must be deterministic to decrypt (obviously) but may
/// use randomness during encryption (the IV, here). Callers never see
/// or touch key material directly beyond what [`crate::identity::Identity`]
/// already exposes.
pub trait Crypto {
    fn encrypt(&self, plaintext: &[u8], peer_public: &PublicKey) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8], own_secret: &StaticSecret) -> Result<Vec<u8>, CryptoError>;
}

/// X25519 ECDH + HKDF-SHA256 + AES-128-CBC/HMAC-SHA256, Fernet-style.
///
/// Wire layout: `iv (16) || ciphertext || hmac (32)`, where the HMAC
/// covers `iv || ciphertext`. This mirrors the reference fernet module's
/// encrypt-then-MAC construction; the one deliberate difference is that
/// the shared secret is derived fresh per call from ECDH rather than
/// cached, since this crate has no session/link-establishment handshake
/// of its own for [`crate::router::Router::send_data`] to reuse.
#[derive(Debug, Default, Clone, Copy)]
pub struct X25519Fernet;

impl X25519Fernet {
    fn derive_keys(shared_secret: &[u8]) -> ([u8; ENC_KEY_LEN], [u8; MAC_KEY_LEN]) {
        let hk = Hkdf::<Sha256>::new(None, shared_secret);
        let mut okm = [0u8; ENC_KEY_LEN + MAC_KEY_LEN];
        hk.expand(b"twine-fernet-v1", &mut okm).expect("okm length is valid for sha256");

        let mut enc_key = [0u8; ENC_KEY_LEN];
        let mut mac_key = [0u8; MAC_KEY_LEN];
        enc_key.copy_from_slice(&okm[..ENC_KEY_LEN]);
        mac_key.copy_from_slice(&okm[ENC_KEY_LEN..]);
        (enc_key, mac_key)
    }
}

impl Crypto for X25519Fernet {
    fn encrypt(&self, plaintext: &[u8], peer_public: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        // An ephemeral secret per message keeps forward secrecy even
        // though there is no persistent session; the ephemeral public
        // key rides along so the recipient can redo the ECDH.
        let ephemeral = StaticSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(peer_public);
        let (enc_key, mac_key) = Self::derive_keys(shared.as_bytes());

        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes128CbcEnc::new(&enc_key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut mac = HmacSha256::new_from_slice(&mac_key).expect("hmac accepts any key length");
        mac.update(&iv);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut out = Vec::with_capacity(32 + IV_LEN + ciphertext.len() + MAC_LEN);
        out.extend_from_slice(ephemeral_public.as_bytes());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], own_secret: &StaticSecret) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < 32 + IV_LEN + MAC_LEN {
            return Err(CryptoError::Truncated);
        }

        let (ephemeral_public_bytes, rest) = ciphertext.split_at(32);
        let ephemeral_public_arr: [u8; 32] =
            ephemeral_public_bytes.try_into().expect("split_at(32) guarantees length");
        let ephemeral_public = PublicKey::from(ephemeral_public_arr);

        let (iv, rest) = rest.split_at(IV_LEN);
        let (body, tag) = rest.split_at(rest.len() - MAC_LEN);

        let shared = own_secret.diffie_hellman(&ephemeral_public);
        let (enc_key, mac_key) = Self::derive_keys(shared.as_bytes());

        let mut mac = HmacSha256::new_from_slice(&mac_key).expect("hmac accepts any key length");
        mac.update(iv);
        mac.update(body);
        mac.verify_slice(tag).map_err(|_| CryptoError::BadMac)?;

        let iv_arr: [u8; IV_LEN] = iv.try_into().expect("split_at(IV_LEN) guarantees length");
        Aes128CbcDec::new(&enc_key.into(), &iv_arr.into())
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| CryptoError::BadPadding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_plaintext() {
        let alice = StaticSecret::random_from_rng(OsRng);
        let bob = StaticSecret::random_from_rng(OsRng);
        let bob_public = PublicKey::from(&bob);

        let fernet = X25519Fernet;
        let ciphertext = fernet.encrypt(b"route advertisement payload", &bob_public).unwrap();
        let plaintext = fernet.decrypt(&ciphertext, &bob).unwrap();
        assert_eq!(plaintext, b"route advertisement payload");
    }

    #[test]
    fn tamper_is_detected_via_mac() {
        let bob = StaticSecret::random_from_rng(OsRng);
        let bob_public = PublicKey::from(&bob);

        let fernet = X25519Fernet;
        let mut ciphertext = fernet.encrypt(b"untouched", &bob_public).unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;

        assert!(matches!(fernet.decrypt(&ciphertext, &bob), Err(CryptoError::BadMac)));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let bob = StaticSecret::random_from_rng(OsRng);
        let fernet = X25519Fernet;
        assert!(matches!(fernet.decrypt(&[0u8; 4], &bob), Err(CryptoError::Truncated)));
    }
}
