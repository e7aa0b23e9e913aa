//! Handshake drivers and the key schedule.
//!
//! ```text
//! server                                   client
//!   | ---- ServerHello(alg, key_id, pk) ---> |
//!   |                                        |  initiate(pk) → (ct, ss)
//!   | <--- ClientHello(alg, key_id, ct) ---- |
//!   |  respond(dk, ct) → ss                  |
//!   |                                        |
//!   |  keys = HKDF(transcript, ss)           |  keys = HKDF(transcript, ss)
//!   | <======== sealed frames ==============> |
//! ```
//!
//! The transcript hash binds both hellos into the keys, so a modified hello
//! yields keys the other side doesn't have.

use std::sync::Arc;

use duelgrid_protocol::{ClientHello, ServerHello};
use duelgrid_transport::Connection;
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::channel::{SecureReceiver, SecureSender};
use crate::cipher::{ChannelCipher, KEY_LEN, SessionKey};
use crate::kem::{self, ServerKeyPair, SharedSecret};
use crate::HandshakeError;

const CLIENT_TO_SERVER_LABEL: &[u8] = b"duelgrid/v1 client->server";
const SERVER_TO_CLIENT_LABEL: &[u8] = b"duelgrid/v1 server->client";

/// The two direction keys derived from one handshake.
#[derive(Debug)]
pub struct SessionKeys {
    pub client_to_server: SessionKey,
    pub server_to_client: SessionKey,
}

/// SHA-256 over both hellos as they were sent.
pub fn transcript_hash(server_hello: &[u8], client_hello: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(server_hello);
    hasher.update(client_hello);
    hasher.finalize().into()
}

/// Expands the shared secret into independent per-direction keys.
pub fn derive_session_keys(
    secret: &SharedSecret,
    transcript: &[u8; 32],
) -> Result<SessionKeys, HandshakeError> {
    let hk = Hkdf::<Sha256>::new(Some(transcript.as_slice()), secret.as_bytes());
    let expand = |label: &[u8]| -> Result<SessionKey, HandshakeError> {
        let mut okm = [0u8; KEY_LEN];
        hk.expand(label, &mut okm)
            .map_err(|_| HandshakeError::KeyDerivation)?;
        Ok(SessionKey::new(okm))
    };
    Ok(SessionKeys {
        client_to_server: expand(CLIENT_TO_SERVER_LABEL)?,
        server_to_client: expand(SERVER_TO_CLIENT_LABEL)?,
    })
}

/// Runs the responding side of the handshake over `conn`.
///
/// The returned receiver has a retry budget of zero; callers raise it once
/// the first frame has confirmed the keys.
pub async fn server_handshake<C: Connection>(
    conn: Arc<C>,
    keypair: &ServerKeyPair,
) -> Result<(SecureSender<C>, SecureReceiver<C>), HandshakeError> {
    let server_hello = ServerHello {
        algorithm: keypair.algorithm(),
        key_id: keypair.key_id(),
        public_key: keypair.public_key().to_vec(),
    }
    .encode()?;
    conn.send(&server_hello).await?;

    let client_bytes = conn.recv().await?.ok_or(HandshakeError::Closed)?;
    let client_hello = ClientHello::decode(&client_bytes)?;
    if client_hello.algorithm != keypair.algorithm() {
        return Err(HandshakeError::AlgorithmMismatch {
            offered: keypair.algorithm(),
            got: client_hello.algorithm,
        });
    }
    if client_hello.key_id != keypair.key_id() {
        return Err(HandshakeError::UnknownKey(client_hello.key_id));
    }

    let secret = kem::respond(keypair, &client_hello.encapsulation)?;
    let keys = derive_session_keys(&secret, &transcript_hash(&server_hello, &client_bytes))?;
    tracing::debug!(
        conn = %conn.id(),
        key_id = keypair.key_id(),
        algorithm = %keypair.algorithm(),
        "server handshake complete"
    );

    Ok((
        SecureSender::new(Arc::clone(&conn), ChannelCipher::new(&keys.server_to_client)),
        SecureReceiver::new(conn, ChannelCipher::new(&keys.client_to_server)),
    ))
}

/// Runs the initiating side of the handshake over `conn`, accepting the
/// algorithm the server offers.
pub async fn client_handshake<C: Connection>(
    conn: Arc<C>,
) -> Result<(SecureSender<C>, SecureReceiver<C>), HandshakeError> {
    let server_bytes = conn.recv().await?.ok_or(HandshakeError::Closed)?;
    let server_hello = ServerHello::decode(&server_bytes)?;

    let (encapsulation, secret) = kem::initiate(server_hello.algorithm, &server_hello.public_key)?;
    let client_hello = ClientHello {
        algorithm: server_hello.algorithm,
        key_id: server_hello.key_id,
        encapsulation,
    }
    .encode()?;
    conn.send(&client_hello).await?;

    let keys = derive_session_keys(&secret, &transcript_hash(&server_bytes, &client_hello))?;
    tracing::debug!(
        conn = %conn.id(),
        key_id = server_hello.key_id,
        algorithm = %server_hello.algorithm,
        "client handshake complete"
    );

    Ok((
        SecureSender::new(Arc::clone(&conn), ChannelCipher::new(&keys.client_to_server)),
        SecureReceiver::new(conn, ChannelCipher::new(&keys.server_to_client)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_session_keys_directions_differ() {
        let secret = SharedSecret::from_array([3u8; 32]);
        let keys = derive_session_keys(&secret, &[0u8; 32]).unwrap();
        assert_ne!(
            keys.client_to_server.as_bytes(),
            keys.server_to_client.as_bytes()
        );
    }

    #[test]
    fn test_derive_session_keys_depends_on_transcript() {
        let secret = SharedSecret::from_array([3u8; 32]);
        let a = derive_session_keys(&secret, &[0u8; 32]).unwrap();
        let b = derive_session_keys(&secret, &[1u8; 32]).unwrap();
        assert_ne!(a.client_to_server.as_bytes(), b.client_to_server.as_bytes());
    }

    #[test]
    fn test_transcript_hash_order_matters() {
        assert_ne!(transcript_hash(b"a", b"b"), transcript_hash(b"b", b"a"));
    }
}
