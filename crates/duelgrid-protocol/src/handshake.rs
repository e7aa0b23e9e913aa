//! Plaintext handshake messages.
//!
//! Before any key exists the two sides exchange one message each, in a
//! fixed binary layout:
//!
//! ```text
//! +------+---------+------+-----------+-----------+----------+---------+
//! | "DG" | version | kind | algorithm | key_id    | len      | bytes   |
//! | 2 B  | u8 = 1  | u8   | u8        | u32 BE    | u16 BE   | len B   |
//! +------+---------+------+-----------+-----------+----------+---------+
//! ```
//!
//! `kind` is 1 for the server's hello (bytes = encapsulation public key)
//! and 2 for the client's reply (bytes = encapsulation ciphertext).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ProtocolError;

/// Current handshake layout version.
pub const HANDSHAKE_VERSION: u8 = 1;

const MAGIC: [u8; 2] = *b"DG";
const KIND_SERVER: u8 = 1;
const KIND_CLIENT: u8 = 2;
const HEADER_LEN: usize = 2 + 1 + 1 + 1 + 4 + 2;

/// Key-encapsulation algorithms the handshake can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KemAlgorithm {
    MlKem512,
    #[default]
    MlKem768,
    MlKem1024,
}

impl KemAlgorithm {
    /// The identifier byte used on the wire.
    pub fn wire_id(self) -> u8 {
        match self {
            KemAlgorithm::MlKem512 => 1,
            KemAlgorithm::MlKem768 => 2,
            KemAlgorithm::MlKem1024 => 3,
        }
    }

    /// Looks up an algorithm by its wire identifier.
    pub fn from_wire_id(id: u8) -> Result<Self, ProtocolError> {
        match id {
            1 => Ok(KemAlgorithm::MlKem512),
            2 => Ok(KemAlgorithm::MlKem768),
            3 => Ok(KemAlgorithm::MlKem1024),
            other => Err(ProtocolError::UnsupportedAlgorithm(other)),
        }
    }

    /// Encoded size of the public (encapsulation) key.
    pub fn public_key_len(self) -> usize {
        match self {
            KemAlgorithm::MlKem512 => 800,
            KemAlgorithm::MlKem768 => 1184,
            KemAlgorithm::MlKem1024 => 1568,
        }
    }

    /// Encoded size of the ciphertext the client sends back.
    pub fn ciphertext_len(self) -> usize {
        match self {
            KemAlgorithm::MlKem512 => 768,
            KemAlgorithm::MlKem768 => 1088,
            KemAlgorithm::MlKem1024 => 1568,
        }
    }
}

impl fmt::Display for KemAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KemAlgorithm::MlKem512 => f.write_str("ML-KEM-512"),
            KemAlgorithm::MlKem768 => f.write_str("ML-KEM-768"),
            KemAlgorithm::MlKem1024 => f.write_str("ML-KEM-1024"),
        }
    }
}

/// First handshake message: the server's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub algorithm: KemAlgorithm,
    /// Identifies the keypair, so a rotating key ring can tell which one
    /// the client encapsulated against.
    pub key_id: u32,
    pub public_key: Vec<u8>,
}

impl ServerHello {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_hello(KIND_SERVER, self.algorithm, self.key_id, &self.public_key)
    }

    /// Parses a server hello, checking the key length for its algorithm.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (algorithm, key_id, body) = decode_hello(KIND_SERVER, data)?;
        if body.len() != algorithm.public_key_len() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{algorithm} public key must be {} bytes, got {}",
                algorithm.public_key_len(),
                body.len()
            )));
        }
        Ok(Self {
            algorithm,
            key_id,
            public_key: body.to_vec(),
        })
    }
}

/// Second handshake message: the client's encapsulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub algorithm: KemAlgorithm,
    /// Echo of the server hello's `key_id`.
    pub key_id: u32,
    pub encapsulation: Vec<u8>,
}

impl ClientHello {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_hello(KIND_CLIENT, self.algorithm, self.key_id, &self.encapsulation)
    }

    /// Parses a client hello, checking the ciphertext length for its
    /// algorithm.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (algorithm, key_id, body) = decode_hello(KIND_CLIENT, data)?;
        if body.len() != algorithm.ciphertext_len() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{algorithm} encapsulation must be {} bytes, got {}",
                algorithm.ciphertext_len(),
                body.len()
            )));
        }
        Ok(Self {
            algorithm,
            key_id,
            encapsulation: body.to_vec(),
        })
    }
}

fn encode_hello(
    kind: u8,
    algorithm: KemAlgorithm,
    key_id: u32,
    body: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(body.len()).map_err(|_| {
        ProtocolError::InvalidMessage(format!("hello body too long: {} bytes", body.len()))
    })?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(HANDSHAKE_VERSION);
    out.push(kind);
    out.push(algorithm.wire_id());
    out.extend_from_slice(&key_id.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

fn decode_hello(
    expected_kind: u8,
    data: &[u8],
) -> Result<(KemAlgorithm, u32, &[u8]), ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            got: data.len(),
        });
    }
    if data[0..2] != MAGIC {
        return Err(ProtocolError::InvalidMessage("bad handshake magic".into()));
    }
    if data[2] != HANDSHAKE_VERSION {
        return Err(ProtocolError::UnsupportedVersion(data[2]));
    }
    if data[3] != expected_kind {
        return Err(ProtocolError::InvalidMessage(format!(
            "expected hello kind {expected_kind}, got {}",
            data[3]
        )));
    }
    let algorithm = KemAlgorithm::from_wire_id(data[4])?;
    let key_id = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
    let len = usize::from(u16::from_be_bytes([data[9], data[10]]));

    let body = &data[HEADER_LEN..];
    if body.len() < len {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN + len,
            got: data.len(),
        });
    }
    if body.len() > len {
        return Err(ProtocolError::InvalidMessage(format!(
            "{} trailing bytes after hello",
            body.len() - len
        )));
    }
    Ok((algorithm, key_id, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_hello() -> ServerHello {
        ServerHello {
            algorithm: KemAlgorithm::MlKem512,
            key_id: 0x0102_0304,
            public_key: vec![0xaa; 800],
        }
    }

    #[test]
    fn test_server_hello_header_layout() {
        let bytes = server_hello().encode().unwrap();
        assert_eq!(&bytes[0..2], b"DG");
        assert_eq!(bytes[2], HANDSHAKE_VERSION);
        assert_eq!(bytes[3], 1);
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..9], &[1, 2, 3, 4]);
        assert_eq!(u16::from_be_bytes([bytes[9], bytes[10]]), 800);
        assert_eq!(bytes.len(), HEADER_LEN + 800);
        assert_eq!(ServerHello::decode(&bytes).unwrap(), server_hello());
    }

    #[test]
    fn test_client_hello_decode_as_server_hello_fails() {
        let hello = ClientHello {
            algorithm: KemAlgorithm::MlKem768,
            key_id: 9,
            encapsulation: vec![1; 1088],
        };
        let bytes = hello.encode().unwrap();
        assert_eq!(ClientHello::decode(&bytes).unwrap(), hello);
        assert!(matches!(
            ServerHello::decode(&bytes),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_decode_unknown_algorithm_returns_unsupported() {
        let mut bytes = server_hello().encode().unwrap();
        bytes[4] = 0x7f;
        assert!(matches!(
            ServerHello::decode(&bytes),
            Err(ProtocolError::UnsupportedAlgorithm(0x7f))
        ));
    }

    #[test]
    fn test_decode_wrong_version_returns_unsupported() {
        let mut bytes = server_hello().encode().unwrap();
        bytes[2] = 9;
        assert!(matches!(
            ServerHello::decode(&bytes),
            Err(ProtocolError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_decode_bad_magic_fails() {
        let mut bytes = server_hello().encode().unwrap();
        bytes[0] = b'X';
        assert!(ServerHello::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_short_header_returns_truncated() {
        assert!(matches!(
            ClientHello::decode(b"DG\x01"),
            Err(ProtocolError::Truncated { needed: 11, got: 3 })
        ));
    }

    #[test]
    fn test_decode_missing_body_bytes_returns_truncated() {
        let bytes = server_hello().encode().unwrap();
        let cut = &bytes[..bytes.len() - 10];
        assert!(matches!(
            ServerHello::decode(cut),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_trailing_bytes_fails() {
        let mut bytes = server_hello().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            ServerHello::decode(&bytes),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_decode_wrong_key_length_for_algorithm_fails() {
        let hello = ServerHello {
            algorithm: KemAlgorithm::MlKem1024,
            key_id: 1,
            public_key: vec![0; 800],
        };
        let bytes = hello.encode().unwrap();
        assert!(ServerHello::decode(&bytes).is_err());
    }

    #[test]
    fn test_wire_ids_are_stable() {
        for alg in [
            KemAlgorithm::MlKem512,
            KemAlgorithm::MlKem768,
            KemAlgorithm::MlKem1024,
        ] {
            assert_eq!(KemAlgorithm::from_wire_id(alg.wire_id()).unwrap(), alg);
        }
        assert_eq!(KemAlgorithm::default(), KemAlgorithm::MlKem768);
    }
}
