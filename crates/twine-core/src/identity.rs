//! Node identity and the sealed payload primitive.
//!
//! A node's identity is an x25519 keypair. The lowercase hex encoding of the
//! 32-byte public key is the node's network-layer address: routing tables,
//! ARP resolution and payload sealing are all keyed by it.
//!
//! Payloads are sealed to a destination address with an ephemeral
//! Diffie-Hellman exchange: the sender derives a one-off shared secret
//! against the destination's public key, expands it through HKDF-SHA256 and
//! encrypts with ChaCha20-Poly1305. The sealed form is
//! `ephemeral_pub(32) || nonce(12) || ciphertext`.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::CryptoError;
use crate::types::NlAddr;

const EPHEMERAL_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Minimum length of a well-formed sealed payload.
pub const SEALED_OVERHEAD: usize = EPHEMERAL_LEN + NONCE_LEN + TAG_LEN;

/// HKDF info string binding derived keys to this protocol.
const KDF_INFO: &[u8] = b"twine sealed payload v1";

/// A node's keypair. The public half, hex encoded, is the node's address.
pub struct Identity {
    secret: StaticSecret,
    address: NlAddr,
}

impl Identity {
    /// Generate a fresh identity from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_secret_bytes(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    /// Build an identity from raw secret key bytes.
    #[must_use]
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        let address = NlAddr::new(hex::encode(public.as_bytes()));
        Self { secret, address }
    }

    /// Build an identity from a hex-encoded secret key.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey("secret key must be 32 bytes".into()))?;
        Ok(Self::from_secret_bytes(arr))
    }

    /// The node's network-layer address: its hex-encoded public key.
    pub fn address(&self) -> &NlAddr {
        &self.address
    }

    /// Hex encoding of the secret key, for persisting in configuration.
    #[must_use]
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Open a payload sealed to this identity.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < SEALED_OVERHEAD {
            return Err(CryptoError::SealedTooShort {
                min: SEALED_OVERHEAD,
                actual: sealed.len(),
            });
        }

        let mut eph_bytes = [0u8; EPHEMERAL_LEN];
        eph_bytes.copy_from_slice(&sealed[..EPHEMERAL_LEN]);
        let ephemeral = PublicKey::from(eph_bytes);

        let shared = self.secret.diffie_hellman(&ephemeral);
        let key = derive_key(shared.as_bytes());

        let nonce = &sealed[EPHEMERAL_LEN..EPHEMERAL_LEN + NONCE_LEN];
        let ciphertext = &sealed[EPHEMERAL_LEN + NONCE_LEN..];

        ChaCha20Poly1305::new(Key::from_slice(&key))
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Unsealable)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret half.
        f.debug_struct("Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Seal `plaintext` to the given destination address.
///
/// Only the holder of the matching secret key can open the result. Sealing
/// needs no local identity: the sender side is an ephemeral keypair.
pub fn seal(peer: &NlAddr, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let peer_key = parse_public(peer)?;

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&peer_key);
    let key = derive_key(shared.as_bytes());

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = ChaCha20Poly1305::new(Key::from_slice(&key))
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Unsealable)?;

    let mut sealed = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_pub.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Parse a network-layer address back into an x25519 public key.
fn parse_public(addr: &NlAddr) -> Result<PublicKey, CryptoError> {
    let bytes =
        hex::decode(addr.as_str()).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey("public key must be 32 bytes".into()))?;
    Ok(PublicKey::from(arr))
}

fn derive_key(shared: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut okm = [0u8; 32];
    hk.expand(KDF_INFO, &mut okm)
        .expect("32 bytes is a valid hkdf-sha256 output length");
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_64_hex_chars() {
        let id = Identity::generate();
        assert_eq!(id.address().as_str().len(), 64);
        assert!(
            id.address()
                .as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        );
    }

    #[test]
    fn secret_roundtrip_preserves_address() {
        let id = Identity::generate();
        let restored = Identity::from_hex(&id.secret_hex()).unwrap();
        assert_eq!(restored.address(), id.address());
    }

    #[test]
    fn seal_open_roundtrip() {
        let id = Identity::generate();
        let sealed = seal(id.address(), b"the quick brown fox").unwrap();
        assert_eq!(id.open(&sealed).unwrap(), b"the quick brown fox");
    }

    #[test]
    fn sealed_form_is_nondeterministic() {
        let id = Identity::generate();
        let a = seal(id.address(), b"msg").unwrap();
        let b = seal(id.address(), b"msg").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let alice = Identity::generate();
        let mallory = Identity::generate();
        let sealed = seal(alice.address(), b"secret").unwrap();
        assert!(matches!(
            mallory.open(&sealed),
            Err(CryptoError::Unsealable)
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let id = Identity::generate();
        let mut sealed = seal(id.address(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(id.open(&sealed), Err(CryptoError::Unsealable)));
    }

    #[test]
    fn short_sealed_payload_rejected() {
        let id = Identity::generate();
        assert!(matches!(
            id.open(&[0u8; 10]),
            Err(CryptoError::SealedTooShort { min: 60, actual: 10 })
        ));
    }

    #[test]
    fn seal_to_malformed_address_fails() {
        assert!(matches!(
            seal(&NlAddr::new("not hex"), b"x"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        assert!(matches!(
            seal(&NlAddr::new("aabb"), b"x"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let id = Identity::generate();
        let sealed = seal(id.address(), b"").unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD);
        assert_eq!(id.open(&sealed).unwrap(), b"");
    }
}
