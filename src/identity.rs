//! Node identity: a public key stands in for a routing address.
//!
//! Every network-layer (NL) address in this crate is the hex encoding of
//! an X25519 public key — see spec.md §3 ("Identity"). The same keypair
//! doubles as the node's encryption key, matching the reference
//! implementation's treatment of identity and crypto as one concern.

use std::fmt;

use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::{Crypto, CryptoError, X25519Fernet};

/// A peer's public key, rendered as lowercase hex. This is the crate's
/// network-layer (NL) address type throughout routing, ARP and
/// end-to-end encryption.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkAddress(String);

impl NetworkAddress {
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self(hex::encode(pk.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the hex string back into the raw public key bytes, for use
    /// by the crypto layer when encrypting to this address.
    pub fn to_public_key(&self) -> Result<PublicKey, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|_| CryptoError::InvalidAddress)?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| CryptoError::InvalidAddress)?;
        Ok(PublicKey::from(arr))
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NetworkAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NetworkAddress {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A node's keypair and the crypto primitive keyed on it.
///
/// Construction and the shape of `encrypt`/`decrypt` are grounded on
/// spec.md §1: "the asymmetric-crypto primitive (treated as an opaque
/// `encrypt(plaintext, peer_public_key) -> ciphertext` /
/// `decrypt(ciphertext, own_private_key) -> plaintext`)". The concrete
/// primitive backing it is swappable via [`Crypto`]; [`X25519Fernet`] is
/// the default.
pub struct Identity {
    secret: StaticSecret,
    public: PublicKey,
    address: NetworkAddress,
    crypto: X25519Fernet,
}

impl Identity {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_secret(secret)
    }

    pub fn from_secret(secret: StaticSecret) -> Self {
        let public = PublicKey::from(&secret);
        let address = NetworkAddress::from_public_key(&public);
        Self { secret, public, address, crypto: X25519Fernet::default() }
    }

    pub fn address(&self) -> &NetworkAddress {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Encrypt `plaintext` so that only the holder of `peer`'s private
    /// key can recover it.
    pub fn encrypt(&self, plaintext: &[u8], peer: &NetworkAddress) -> Result<Vec<u8>, CryptoError> {
        let peer_pk = peer.to_public_key()?;
        self.crypto.encrypt(plaintext, &peer_pk)
    }

    /// Decrypt `ciphertext` previously produced by [`Identity::encrypt`]
    /// addressed to this identity. No authentication is performed; a
    /// wrong key produces garbage rather than an error where the
    /// construction cannot detect it (spec.md §7).
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.crypto.decrypt(ciphertext, &self.secret)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("address", &self.address).finish_non_exhaustive()
    }
}
