// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Symmetric message security.
//!
//! Keys are derived from the nonces exchanged in OpenSecureChannel with
//! P_SHA256. Each side signs with its own keys and verifies with the
//! peer's:
//!
//! ```text
//! client keys = P_SHA256(secret = server nonce, seed = client nonce)
//! server keys = P_SHA256(secret = client nonce, seed = server nonce)
//! ```
//!
//! Symmetric chunk layout:
//!
//! ```text
//! None:            header | channel id | token id | seq | req id | body
//! Sign:            ... same ...                                   | HMAC
//! SignAndEncrypt:  header | channel id | token id | nonce | AES-GCM(seq | req id | body) | HMAC
//! ```
//!
//! The HMAC-SHA256 signature covers every byte before it. The AES-256-GCM
//! ciphertext carries its 16 byte tag and authenticates the 16 byte prefix
//! as associated data.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::message::{write_header, ChunkType, Frame, MessageType, HEADER_SIZE};
use crate::codec::{BinaryDecoder, BinaryEncoder};
use crate::error::{SecurityError, UaError, UaResult};
use crate::types::SecurityMode;

type HmacSha256 = Hmac<Sha256>;

/// Length of the exchanged nonces.
pub const NONCE_LENGTH: usize = 32;
/// Length of the HMAC-SHA256 signature.
pub const SIGNATURE_LENGTH: usize = 32;
/// Length of the AES-GCM nonce.
pub const GCM_NONCE_LENGTH: usize = 12;
/// Length of the AES-GCM tag.
pub const GCM_TAG_LENGTH: usize = 16;
/// Length of the symmetric prefix: header, channel id and token id.
pub const SYMMETRIC_PREFIX: usize = HEADER_SIZE + 8;

const SIGNING_KEY_LENGTH: usize = 32;
const ENCRYPTING_KEY_LENGTH: usize = 32;

/// Which end of the channel this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityRole {
    /// The connecting side.
    Client,
    /// The accepting side.
    Server,
}

/// Generates a random nonce.
pub fn generate_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// P_SHA256 pseudo random function.
pub fn p_sha256(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(length);
    let mut a = hmac_sha256(secret, &[seed]);
    while output.len() < length {
        output.extend_from_slice(&hmac_sha256(secret, &[&a, seed]));
        a = hmac_sha256(secret, &[&a]);
    }
    output.truncate(length);
    output
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}

// =============================================================================
// Keys
// =============================================================================

/// Signing and encryption keys of one direction.
#[derive(Clone, PartialEq, Eq)]
struct DerivedKeys {
    signing_key: Vec<u8>,
    encrypting_key: Vec<u8>,
}

impl DerivedKeys {
    fn derive(secret: &[u8], seed: &[u8]) -> Self {
        let material = p_sha256(secret, seed, SIGNING_KEY_LENGTH + ENCRYPTING_KEY_LENGTH);
        let (signing, encrypting) = material.split_at(SIGNING_KEY_LENGTH);
        Self {
            signing_key: signing.to_vec(),
            encrypting_key: encrypting.to_vec(),
        }
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
            .map_err(|_| SecurityError::EncryptionFailed)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), SecurityError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
            .map_err(|_| SecurityError::SignatureInvalid)?;
        mac.update(data);
        mac.verify_slice(signature)
            .map_err(|_| SecurityError::SignatureInvalid)
    }

    fn cipher(&self) -> Result<Aes256Gcm, SecurityError> {
        Aes256Gcm::new_from_slice(&self.encrypting_key).map_err(|_| SecurityError::EncryptionFailed)
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKeys(***)")
    }
}

// =============================================================================
// SymmetricChunk
// =============================================================================

/// A verified and decrypted `MSG` or `CLO` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricChunk {
    /// Message type.
    pub message_type: MessageType,
    /// Chunk flag.
    pub chunk_type: ChunkType,
    /// Secure channel id.
    pub secure_channel_id: u32,
    /// Security token id.
    pub token_id: u32,
    /// Sequence number.
    pub sequence_number: u32,
    /// Request id.
    pub request_id: u32,
    /// Body of this chunk.
    pub body: Bytes,
}

// =============================================================================
// ChannelSecurity
// =============================================================================

/// Message security of an open channel.
#[derive(Debug, Clone)]
pub struct ChannelSecurity {
    mode: SecurityMode,
    keys: Option<(DerivedKeys, DerivedKeys)>,
}

impl ChannelSecurity {
    /// No signing and no encryption.
    pub fn none() -> Self {
        Self {
            mode: SecurityMode::None,
            keys: None,
        }
    }

    /// Derives the keys of one channel end.
    pub fn derive(
        mode: SecurityMode,
        role: SecurityRole,
        client_nonce: &[u8],
        server_nonce: &[u8],
    ) -> Result<Self, SecurityError> {
        if mode == SecurityMode::None {
            return Ok(Self::none());
        }
        for (name, nonce) in [("client", client_nonce), ("server", server_nonce)] {
            if nonce.len() < NONCE_LENGTH {
                return Err(SecurityError::InvalidNonce {
                    message: format!(
                        "{} nonce has {} bytes, {} required",
                        name,
                        nonce.len(),
                        NONCE_LENGTH
                    ),
                });
            }
        }

        let client = DerivedKeys::derive(server_nonce, client_nonce);
        let server = DerivedKeys::derive(client_nonce, server_nonce);
        // (sending, receiving)
        let keys = match role {
            SecurityRole::Client => (client, server),
            SecurityRole::Server => (server, client),
        };
        Ok(Self {
            mode,
            keys: Some(keys),
        })
    }

    /// Security mode.
    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    /// Bytes a chunk adds around its body.
    pub fn overhead(&self) -> usize {
        let mut overhead = SYMMETRIC_PREFIX + 8;
        if self.mode.is_signed() {
            overhead += SIGNATURE_LENGTH;
        }
        if self.mode.is_encrypted() {
            overhead += GCM_NONCE_LENGTH + GCM_TAG_LENGTH;
        }
        overhead
    }

    /// Builds a complete symmetric chunk.
    #[allow(clippy::too_many_arguments)]
    pub fn seal(
        &self,
        message_type: MessageType,
        chunk_type: ChunkType,
        secure_channel_id: u32,
        token_id: u32,
        sequence_number: u32,
        request_id: u32,
        body: &[u8],
    ) -> Result<Bytes, SecurityError> {
        let size = self.overhead() + body.len();
        let mut encoder = BinaryEncoder::with_capacity(size);
        write_header(&mut encoder, message_type, chunk_type, size as u32);
        encoder.write_u32(secure_channel_id);
        encoder.write_u32(token_id);

        let keys = match (&self.keys, self.mode) {
            (_, SecurityMode::None) | (None, _) => {
                encoder.write_u32(sequence_number);
                encoder.write_u32(request_id);
                encoder.write_raw(body);
                return Ok(encoder.into_bytes());
            }
            (Some((sending, _)), _) => sending,
        };

        if self.mode.is_encrypted() {
            let mut plain = Vec::with_capacity(8 + body.len());
            plain.extend_from_slice(&sequence_number.to_le_bytes());
            plain.extend_from_slice(&request_id.to_le_bytes());
            plain.extend_from_slice(body);

            let mut nonce = [0u8; GCM_NONCE_LENGTH];
            rand::thread_rng().fill_bytes(&mut nonce);
            let aad = encoder.as_slice().to_vec();
            let ciphertext = keys
                .cipher()?
                .encrypt(Nonce::from_slice(&nonce), Payload { msg: &plain, aad: &aad })
                .map_err(|_| SecurityError::EncryptionFailed)?;
            encoder.write_raw(&nonce);
            encoder.write_raw(&ciphertext);
        } else {
            encoder.write_u32(sequence_number);
            encoder.write_u32(request_id);
            encoder.write_raw(body);
        }

        let signature = keys.sign(encoder.as_slice())?;
        encoder.write_raw(&signature);
        Ok(encoder.into_bytes())
    }

    /// Verifies, decrypts and parses a `MSG` or `CLO` frame.
    pub fn open(&self, frame: &Frame) -> UaResult<SymmetricChunk> {
        let bytes = &frame.bytes;
        if bytes.len() < SYMMETRIC_PREFIX {
            return Err(UaError::malformed("symmetric chunk shorter than its header"));
        }
        let mut prefix = BinaryDecoder::new(&bytes[HEADER_SIZE..SYMMETRIC_PREFIX]);
        let secure_channel_id = prefix.read_u32()?;
        let token_id = prefix.read_u32()?;

        let plain: Bytes = match (&self.keys, self.mode) {
            (_, SecurityMode::None) | (None, _) => bytes.slice(SYMMETRIC_PREFIX..),
            (Some((_, receiving)), mode) => {
                if bytes.len() < self.overhead() {
                    return Err(UaError::security(SecurityError::SignatureInvalid));
                }
                let signed_len = bytes.len() - SIGNATURE_LENGTH;
                receiving.verify(&bytes[..signed_len], &bytes[signed_len..])?;

                if mode.is_encrypted() {
                    let nonce_end = SYMMETRIC_PREFIX + GCM_NONCE_LENGTH;
                    let plain = receiving
                        .cipher()?
                        .decrypt(
                            Nonce::from_slice(&bytes[SYMMETRIC_PREFIX..nonce_end]),
                            Payload {
                                msg: &bytes[nonce_end..signed_len],
                                aad: &bytes[..SYMMETRIC_PREFIX],
                            },
                        )
                        .map_err(|_| SecurityError::DecryptionFailed)?;
                    Bytes::from(plain)
                } else {
                    bytes.slice(SYMMETRIC_PREFIX..signed_len)
                }
            }
        };

        let mut decoder = BinaryDecoder::new(&plain);
        let sequence_number = decoder.read_u32()?;
        let request_id = decoder.read_u32()?;
        Ok(SymmetricChunk {
            message_type: frame.message_type,
            chunk_type: frame.chunk_type,
            secure_channel_id,
            token_id,
            sequence_number,
            request_id,
            body: plain.slice(8..),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: Bytes) -> Frame {
        Frame {
            message_type: MessageType::from_tag(&bytes[..3]).unwrap(),
            chunk_type: ChunkType::from_byte(bytes[3]).unwrap(),
            bytes,
        }
    }

    fn pair(mode: SecurityMode) -> (ChannelSecurity, ChannelSecurity) {
        let client_nonce = generate_nonce();
        let server_nonce = generate_nonce();
        (
            ChannelSecurity::derive(mode, SecurityRole::Client, &client_nonce, &server_nonce).unwrap(),
            ChannelSecurity::derive(mode, SecurityRole::Server, &client_nonce, &server_nonce).unwrap(),
        )
    }

    #[test]
    fn test_p_sha256_length_and_determinism() {
        let a = p_sha256(b"secret", b"seed", 80);
        let b = p_sha256(b"secret", b"seed", 80);
        assert_eq!(a.len(), 80);
        assert_eq!(a, b);
        assert_ne!(a, p_sha256(b"secret", b"other", 80));
        assert_eq!(&p_sha256(b"secret", b"seed", 32)[..], &a[..32]);
    }

    #[test]
    fn test_none_round_trip() {
        let security = ChannelSecurity::none();
        let bytes = security
            .seal(MessageType::Message, ChunkType::Final, 5, 1, 10, 3, b"body")
            .unwrap();
        assert_eq!(bytes.len(), security.overhead() + 4);
        let chunk = security.open(&frame(bytes)).unwrap();
        assert_eq!(chunk.secure_channel_id, 5);
        assert_eq!(chunk.sequence_number, 10);
        assert_eq!(chunk.request_id, 3);
        assert_eq!(&chunk.body[..], b"body");
    }

    #[test]
    fn test_sign_and_encrypt_round_trip() {
        for mode in [SecurityMode::Sign, SecurityMode::SignAndEncrypt] {
            let (client, server) = pair(mode);
            let bytes = client
                .seal(MessageType::Message, ChunkType::Final, 5, 1, 10, 3, b"hello world")
                .unwrap();
            assert_eq!(bytes.len(), client.overhead() + 11);
            if mode.is_encrypted() {
                assert!(!bytes.windows(11).any(|w| w == b"hello world"));
            }
            let chunk = server.open(&frame(bytes)).unwrap();
            assert_eq!(&chunk.body[..], b"hello world");
            assert_eq!(chunk.request_id, 3);
        }
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let (client, server) = pair(SecurityMode::Sign);
        let bytes = client
            .seal(MessageType::Message, ChunkType::Final, 5, 1, 10, 3, b"payload")
            .unwrap();
        let mut tampered = bytes.to_vec();
        tampered[SYMMETRIC_PREFIX + 9] ^= 0xFF;
        let err = server.open(&frame(Bytes::from(tampered))).unwrap_err();
        assert!(matches!(err, UaError::Security(SecurityError::SignatureInvalid)));
    }

    #[test]
    fn test_own_keys_do_not_verify() {
        let (client, _) = pair(SecurityMode::Sign);
        let bytes = client
            .seal(MessageType::Message, ChunkType::Final, 5, 1, 10, 3, b"payload")
            .unwrap();
        assert!(client.open(&frame(bytes)).is_err());
    }

    #[test]
    fn test_short_nonce_rejected() {
        let err = ChannelSecurity::derive(SecurityMode::Sign, SecurityRole::Client, &[1; 8], &[2; 32])
            .unwrap_err();
        assert!(matches!(err, SecurityError::InvalidNonce { .. }));
    }
}
