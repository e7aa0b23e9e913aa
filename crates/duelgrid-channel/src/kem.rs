//! ML-KEM key material: server keypairs, the key ring, and the two
//! encapsulation operations.
//!
//! `initiate` runs on the client against the server's public key and
//! produces `(encapsulation, secret)`. `respond` runs on the server with
//! the matching decapsulation key and recovers the same secret. ML-KEM uses
//! implicit rejection: a tampered encapsulation still decapsulates, just to
//! an unrelated secret. The mismatch surfaces when the first sealed frame
//! fails to open.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use duelgrid_protocol::KemAlgorithm;
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, EncodedSizeUser, KemCore, MlKem512, MlKem768, MlKem1024};
use rand_core::OsRng;
use tokio::sync::Mutex;
use zeroize::Zeroize;

use crate::HandshakeError;

/// Length of the ML-KEM shared secret for every parameter set.
pub const SHARED_SECRET_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Shared secret
// ---------------------------------------------------------------------------

/// The secret both sides agree on. Wiped from memory on drop.
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    pub fn from_array(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, HandshakeError> {
        let array: [u8; SHARED_SECRET_LEN] = bytes
            .try_into()
            .map_err(|_| HandshakeError::Encapsulation)?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

// ---------------------------------------------------------------------------
// Server keypair
// ---------------------------------------------------------------------------

enum DecapsulationKey {
    MlKem512(Box<<MlKem512 as KemCore>::DecapsulationKey>),
    MlKem768(Box<<MlKem768 as KemCore>::DecapsulationKey>),
    MlKem1024(Box<<MlKem1024 as KemCore>::DecapsulationKey>),
}

/// A server keypair, identified on the wire by `key_id`.
pub struct ServerKeyPair {
    key_id: u32,
    algorithm: KemAlgorithm,
    decapsulation: DecapsulationKey,
    public_key: Vec<u8>,
    created_at: Instant,
}

impl ServerKeyPair {
    /// Generates a fresh keypair from the OS random source.
    pub fn generate(algorithm: KemAlgorithm, key_id: u32) -> Self {
        let (decapsulation, public_key) = match algorithm {
            KemAlgorithm::MlKem512 => {
                let (dk, ek) = MlKem512::generate(&mut OsRng);
                (DecapsulationKey::MlKem512(Box::new(dk)), ek.as_bytes().to_vec())
            }
            KemAlgorithm::MlKem768 => {
                let (dk, ek) = MlKem768::generate(&mut OsRng);
                (DecapsulationKey::MlKem768(Box::new(dk)), ek.as_bytes().to_vec())
            }
            KemAlgorithm::MlKem1024 => {
                let (dk, ek) = MlKem1024::generate(&mut OsRng);
                (DecapsulationKey::MlKem1024(Box::new(dk)), ek.as_bytes().to_vec())
            }
        };
        Self {
            key_id,
            algorithm,
            decapsulation,
            public_key,
            created_at: Instant::now(),
        }
    }

    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    /// Encoded encapsulation key, as sent in the server hello.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Time since the keypair was generated.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl fmt::Debug for ServerKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeyPair")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Encapsulation
// ---------------------------------------------------------------------------

/// Encapsulates a fresh secret against `public_key`.
///
/// Returns the encapsulation to send to the server and the secret to keep.
///
/// # Errors
/// `MalformedKeyMaterial` if the key has the wrong length for `algorithm`.
pub fn initiate(
    algorithm: KemAlgorithm,
    public_key: &[u8],
) -> Result<(Vec<u8>, SharedSecret), HandshakeError> {
    match algorithm {
        KemAlgorithm::MlKem512 => encapsulate_with::<MlKem512>(public_key),
        KemAlgorithm::MlKem768 => encapsulate_with::<MlKem768>(public_key),
        KemAlgorithm::MlKem1024 => encapsulate_with::<MlKem1024>(public_key),
    }
}

/// Recovers the secret the client encapsulated.
///
/// # Errors
/// `MalformedKeyMaterial` if the encapsulation has the wrong length for the
/// keypair's algorithm.
pub fn respond(
    keypair: &ServerKeyPair,
    encapsulation: &[u8],
) -> Result<SharedSecret, HandshakeError> {
    match &keypair.decapsulation {
        DecapsulationKey::MlKem512(dk) => decapsulate_with::<MlKem512>(dk, encapsulation),
        DecapsulationKey::MlKem768(dk) => decapsulate_with::<MlKem768>(dk, encapsulation),
        DecapsulationKey::MlKem1024(dk) => decapsulate_with::<MlKem1024>(dk, encapsulation),
    }
}

fn encapsulate_with<K: KemCore>(
    public_key: &[u8],
) -> Result<(Vec<u8>, SharedSecret), HandshakeError> {
    let encoded = public_key
        .try_into()
        .map_err(|_| HandshakeError::MalformedKeyMaterial("public key"))?;
    let ek = K::EncapsulationKey::from_bytes(&encoded);
    let (ciphertext, secret) = ek
        .encapsulate(&mut OsRng)
        .map_err(|_| HandshakeError::Encapsulation)?;
    Ok((ciphertext.to_vec(), SharedSecret::from_slice(&secret)?))
}

fn decapsulate_with<K: KemCore>(
    dk: &K::DecapsulationKey,
    encapsulation: &[u8],
) -> Result<SharedSecret, HandshakeError> {
    let ciphertext: Ciphertext<K> = encapsulation
        .try_into()
        .map_err(|_| HandshakeError::MalformedKeyMaterial("encapsulation"))?;
    let secret = dk
        .decapsulate(&ciphertext)
        .map_err(|_| HandshakeError::Encapsulation)?;
    SharedSecret::from_slice(&secret)
}

// ---------------------------------------------------------------------------
// Key ring
// ---------------------------------------------------------------------------

/// When the server replaces its keypair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// A new keypair for every handshake.
    #[default]
    PerHandshake,
    /// Reuse one keypair until it is `interval` old.
    Rotating { interval: Duration },
}

/// Hands out the keypair each handshake should use.
///
/// Shared by every connection task; generation happens under the lock so
/// two handshakes racing at a rotation boundary don't both generate.
pub struct KeyRing {
    algorithm: KemAlgorithm,
    policy: KeyPolicy,
    state: Mutex<RingState>,
}

struct RingState {
    current: Option<Arc<ServerKeyPair>>,
    next_key_id: u32,
}

impl KeyRing {
    pub fn new(algorithm: KemAlgorithm, policy: KeyPolicy) -> Self {
        Self {
            algorithm,
            policy,
            state: Mutex::new(RingState {
                current: None,
                next_key_id: 1,
            }),
        }
    }

    pub fn algorithm(&self) -> KemAlgorithm {
        self.algorithm
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// The keypair to offer in the next server hello.
    pub async fn current(&self) -> Arc<ServerKeyPair> {
        let mut state = self.state.lock().await;
        if let (KeyPolicy::Rotating { interval }, Some(current)) =
            (self.policy, state.current.as_ref())
        {
            if current.age() < interval {
                return Arc::clone(current);
            }
        }

        let key_id = state.next_key_id;
        state.next_key_id = state.next_key_id.wrapping_add(1);
        let keypair = Arc::new(ServerKeyPair::generate(self.algorithm, key_id));
        if matches!(self.policy, KeyPolicy::Rotating { .. }) {
            tracing::info!(key_id, algorithm = %self.algorithm, "rotated server keypair");
            state.current = Some(Arc::clone(&keypair));
        }
        keypair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_respond_agree_for_every_algorithm() {
        for algorithm in [
            KemAlgorithm::MlKem512,
            KemAlgorithm::MlKem768,
            KemAlgorithm::MlKem1024,
        ] {
            let keypair = ServerKeyPair::generate(algorithm, 1);
            assert_eq!(keypair.public_key().len(), algorithm.public_key_len());

            let (encapsulation, client_secret) =
                initiate(algorithm, keypair.public_key()).unwrap();
            assert_eq!(encapsulation.len(), algorithm.ciphertext_len());

            let server_secret = respond(&keypair, &encapsulation).unwrap();
            assert_eq!(client_secret, server_secret);
        }
    }

    #[test]
    fn test_respond_tampered_encapsulation_yields_different_secret() {
        let keypair = ServerKeyPair::generate(KemAlgorithm::MlKem768, 1);
        let (mut encapsulation, client_secret) =
            initiate(KemAlgorithm::MlKem768, keypair.public_key()).unwrap();
        encapsulation[10] ^= 0x01;

        let server_secret = respond(&keypair, &encapsulation).unwrap();
        assert_ne!(client_secret, server_secret);
    }

    #[test]
    fn test_respond_wrong_length_encapsulation_fails() {
        let keypair = ServerKeyPair::generate(KemAlgorithm::MlKem512, 1);
        let result = respond(&keypair, &[0u8; 12]);
        assert!(matches!(
            result,
            Err(HandshakeError::MalformedKeyMaterial("encapsulation"))
        ));
    }

    #[test]
    fn test_initiate_wrong_length_public_key_fails() {
        let result = initiate(KemAlgorithm::MlKem1024, &[0u8; 800]);
        assert!(matches!(
            result,
            Err(HandshakeError::MalformedKeyMaterial("public key"))
        ));
    }

    #[test]
    fn test_two_encapsulations_give_independent_secrets() {
        let keypair = ServerKeyPair::generate(KemAlgorithm::MlKem768, 1);
        let (_, a) = initiate(KemAlgorithm::MlKem768, keypair.public_key()).unwrap();
        let (_, b) = initiate(KemAlgorithm::MlKem768, keypair.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_key_ring_per_handshake_issues_fresh_keys() {
        let ring = KeyRing::new(KemAlgorithm::MlKem512, KeyPolicy::PerHandshake);
        let a = ring.current().await;
        let b = ring.current().await;
        assert_ne!(a.key_id(), b.key_id());
        assert_ne!(a.public_key(), b.public_key());
    }

    #[tokio::test]
    async fn test_key_ring_rotating_reuses_within_interval() {
        let ring = KeyRing::new(
            KemAlgorithm::MlKem512,
            KeyPolicy::Rotating {
                interval: Duration::from_secs(3600),
            },
        );
        let a = ring.current().await;
        let b = ring.current().await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_key_ring_rotating_zero_interval_rotates_every_time() {
        let ring = KeyRing::new(
            KemAlgorithm::MlKem512,
            KeyPolicy::Rotating {
                interval: Duration::ZERO,
            },
        );
        let a = ring.current().await;
        let b = ring.current().await;
        assert_ne!(a.key_id(), b.key_id());
    }
}
