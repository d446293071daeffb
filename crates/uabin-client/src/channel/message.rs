// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA TCP message framing.
//!
//! Every message starts with an 8 byte header:
//!
//! ```text
//! +------+-------+------------+
//! | type | chunk |    size    |
//! | 3 B  |  1 B  | u32 LE     |
//! +------+-------+------------+
//! ```
//!
//! `size` counts the whole message including the header. `HEL`, `ACK` and
//! `ERR` carry their body directly. `OPN`, `MSG` and `CLO` carry a secure
//! channel id followed by a security header and a sequence header.

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use crate::error::{CodecResult, ProtocolError, UaError, UaResult};
use crate::types::{ByteString, StatusCode, UaString};

/// Size of the message header.
pub const HEADER_SIZE: usize = 8;

/// Size of a sequence header.
pub const SEQUENCE_HEADER_SIZE: usize = 8;

/// Protocol version sent in Hello.
pub const PROTOCOL_VERSION: u32 = 0;

// =============================================================================
// MessageType / ChunkType
// =============================================================================

/// Message type of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Hello.
    Hello,
    /// Acknowledge.
    Acknowledge,
    /// Error.
    Error,
    /// OpenSecureChannel.
    Open,
    /// Service message.
    Message,
    /// CloseSecureChannel.
    Close,
}

impl MessageType {
    /// Returns the three wire bytes.
    pub const fn tag(&self) -> &'static [u8; 3] {
        match self {
            Self::Hello => b"HEL",
            Self::Acknowledge => b"ACK",
            Self::Error => b"ERR",
            Self::Open => b"OPN",
            Self::Message => b"MSG",
            Self::Close => b"CLO",
        }
    }

    /// Parses the three wire bytes.
    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"HEL" => Some(Self::Hello),
            b"ACK" => Some(Self::Acknowledge),
            b"ERR" => Some(Self::Error),
            b"OPN" => Some(Self::Open),
            b"MSG" => Some(Self::Message),
            b"CLO" => Some(Self::Close),
            _ => None,
        }
    }

    /// Returns `true` for types carrying a secure channel id.
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Open | Self::Message | Self::Close)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.tag()))
    }
}

/// Chunk flag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// Final chunk.
    Final,
    /// Intermediate chunk.
    Intermediate,
    /// Abort of the message.
    Abort,
}

impl ChunkType {
    /// Returns the wire byte.
    pub const fn byte(&self) -> u8 {
        match self {
            Self::Final => b'F',
            Self::Intermediate => b'C',
            Self::Abort => b'A',
        }
    }

    /// Parses the wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'F' => Some(Self::Final),
            b'C' => Some(Self::Intermediate),
            b'A' => Some(Self::Abort),
            _ => None,
        }
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One complete frame as read from the wire, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type.
    pub message_type: MessageType,
    /// Chunk flag.
    pub chunk_type: ChunkType,
    /// Whole frame bytes.
    pub bytes: Bytes,
}

impl Frame {
    /// Bytes after the message header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    /// Secure channel id of OPN, MSG and CLO frames.
    pub fn secure_channel_id(&self) -> UaResult<u32> {
        if !self.message_type.is_secure() {
            return Err(UaError::malformed(format!(
                "{} frame has no secure channel id",
                self.message_type
            )));
        }
        Ok(BinaryDecoder::new(self.payload()).read_u32()?)
    }
}

/// Wraps a body into a frame with a patched size field.
pub fn encode_frame(message_type: MessageType, chunk_type: ChunkType, body: &[u8]) -> Bytes {
    let mut encoder = BinaryEncoder::with_capacity(HEADER_SIZE + body.len());
    write_header(&mut encoder, message_type, chunk_type, (HEADER_SIZE + body.len()) as u32);
    encoder.write_raw(body);
    encoder.into_bytes()
}

/// Writes a message header.
pub fn write_header(
    encoder: &mut BinaryEncoder,
    message_type: MessageType,
    chunk_type: ChunkType,
    size: u32,
) {
    encoder.write_raw(message_type.tag());
    encoder.write_u8(chunk_type.byte());
    encoder.write_u32(size);
}

/// Reads one frame.
///
/// Returns `Ok(None)` on end of stream at a frame boundary. `max_size`
/// bounds the frame size; 0 disables the check.
pub async fn read_frame<R>(reader: &mut R, max_size: u32) -> UaResult<Option<Frame>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let message_type = MessageType::from_tag(&header[..3]).ok_or_else(|| {
        UaError::protocol(ProtocolError::UnexpectedMessage {
            expected: "OPC UA message".into(),
            actual: String::from_utf8_lossy(&header[..3]).into_owned(),
        })
    })?;
    let chunk_type = ChunkType::from_byte(header[3])
        .ok_or_else(|| UaError::malformed(format!("invalid chunk type 0x{:02X}", header[3])))?;
    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if size < HEADER_SIZE {
        return Err(UaError::malformed(format!("message size {} below header size", size)));
    }
    if max_size != 0 && size > max_size as usize {
        return Err(UaError::protocol(ProtocolError::MessageTooLarge {
            size,
            max: max_size as usize,
        }));
    }

    let mut bytes = vec![0u8; size];
    bytes[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut bytes[HEADER_SIZE..]).await?;

    Ok(Some(Frame {
        message_type,
        chunk_type,
        bytes: Bytes::from(bytes),
    }))
}

/// Writes and flushes one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> UaResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

// =============================================================================
// Hello / Acknowledge / Error
// =============================================================================

/// Body of a `HEL` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    /// Protocol version.
    pub protocol_version: u32,
    /// Largest chunk the client receives.
    pub receive_buffer_size: u32,
    /// Largest chunk the client sends.
    pub send_buffer_size: u32,
    /// Largest message the client receives; 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the client receives; 0 for no limit.
    pub max_chunk_count: u32,
    /// Endpoint the client connects to.
    pub endpoint_url: UaString,
}

impl BinaryEncodable for HelloMessage {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_u32(self.protocol_version);
        encoder.write_u32(self.receive_buffer_size);
        encoder.write_u32(self.send_buffer_size);
        encoder.write_u32(self.max_message_size);
        encoder.write_u32(self.max_chunk_count);
        encoder.write_string(&self.endpoint_url);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            protocol_version: decoder.read_u32()?,
            receive_buffer_size: decoder.read_u32()?,
            send_buffer_size: decoder.read_u32()?,
            max_message_size: decoder.read_u32()?,
            max_chunk_count: decoder.read_u32()?,
            endpoint_url: decoder.read_string()?,
        })
    }
}

/// Body of an `ACK` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknowledgeMessage {
    /// Protocol version.
    pub protocol_version: u32,
    /// Largest chunk the server receives.
    pub receive_buffer_size: u32,
    /// Largest chunk the server sends.
    pub send_buffer_size: u32,
    /// Largest message the server receives; 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per message the server receives; 0 for no limit.
    pub max_chunk_count: u32,
}

impl BinaryEncodable for AcknowledgeMessage {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_u32(self.protocol_version);
        encoder.write_u32(self.receive_buffer_size);
        encoder.write_u32(self.send_buffer_size);
        encoder.write_u32(self.max_message_size);
        encoder.write_u32(self.max_chunk_count);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            protocol_version: decoder.read_u32()?,
            receive_buffer_size: decoder.read_u32()?,
            send_buffer_size: decoder.read_u32()?,
            max_message_size: decoder.read_u32()?,
            max_chunk_count: decoder.read_u32()?,
        })
    }
}

/// Body of an `ERR` message and of an abort chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Error status.
    pub error: StatusCode,
    /// Reason text.
    pub reason: UaString,
}

impl ErrorMessage {
    /// Creates an error message.
    pub fn new(error: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            error,
            reason: UaString::from(reason.into()),
        }
    }
}

impl BinaryEncodable for ErrorMessage {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        self.error.encode(encoder);
        encoder.write_string(&self.reason);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            error: StatusCode::decode(decoder)?,
            reason: decoder.read_string()?,
        })
    }
}

// =============================================================================
// OpenSecureChannel chunk
// =============================================================================

/// An `OPN` chunk with its asymmetric security header.
///
/// Certificates stay null: only the policy URI is carried, the body is
/// sent in the clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenChunk {
    /// Secure channel id; 0 before the server assigned one.
    pub secure_channel_id: u32,
    /// Security policy URI.
    pub security_policy_uri: UaString,
    /// Sender certificate.
    pub sender_certificate: ByteString,
    /// Receiver certificate thumbprint.
    pub receiver_thumbprint: ByteString,
    /// Sequence number.
    pub sequence_number: u32,
    /// Request id.
    pub request_id: u32,
    /// Service body.
    pub body: Bytes,
}

impl OpenChunk {
    /// Creates an unsecured OPN chunk.
    pub fn new(
        secure_channel_id: u32,
        security_policy_uri: &str,
        sequence_number: u32,
        request_id: u32,
        body: Bytes,
    ) -> Self {
        Self {
            secure_channel_id,
            security_policy_uri: UaString::from(security_policy_uri),
            sender_certificate: ByteString::null(),
            receiver_thumbprint: ByteString::null(),
            sequence_number,
            request_id,
            body,
        }
    }

    /// Encodes the chunk as a final `OPN` frame.
    pub fn encode(&self) -> Bytes {
        let mut encoder = BinaryEncoder::with_capacity(64 + self.body.len());
        write_header(&mut encoder, MessageType::Open, ChunkType::Final, 0);
        encoder.write_u32(self.secure_channel_id);
        encoder.write_string(&self.security_policy_uri);
        encoder.write_byte_string(&self.sender_certificate);
        encoder.write_byte_string(&self.receiver_thumbprint);
        encoder.write_u32(self.sequence_number);
        encoder.write_u32(self.request_id);
        encoder.write_raw(&self.body);
        let size = encoder.len() as u32;
        encoder.patch_u32(4, size);
        encoder.into_bytes()
    }

    /// Parses an `OPN` frame.
    pub fn decode(frame: &Frame) -> UaResult<Self> {
        if frame.message_type != MessageType::Open {
            return Err(UaError::protocol(ProtocolError::UnexpectedMessage {
                expected: MessageType::Open.to_string(),
                actual: frame.message_type.to_string(),
            }));
        }
        if frame.chunk_type != ChunkType::Final {
            return Err(UaError::malformed("chunked OpenSecureChannel message"));
        }
        let mut decoder = BinaryDecoder::new(frame.payload());
        let secure_channel_id = decoder.read_u32()?;
        let security_policy_uri = decoder.read_string()?;
        let sender_certificate = decoder.read_byte_string()?;
        let receiver_thumbprint = decoder.read_byte_string()?;
        let sequence_number = decoder.read_u32()?;
        let request_id = decoder.read_u32()?;
        Ok(Self {
            secure_channel_id,
            security_policy_uri,
            sender_certificate,
            receiver_thumbprint,
            sequence_number,
            request_id,
            body: frame.bytes.slice(frame.bytes.len() - decoder.remaining()..),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let hello = HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: 65535,
            send_buffer_size: 65535,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: UaString::from("opc.tcp://localhost:48010"),
        };
        let frame = encode_frame(MessageType::Hello, ChunkType::Final, &hello.to_bytes());
        assert_eq!(&frame[..4], b"HELF");
        assert_eq!(u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]) as usize, frame.len());

        let mut reader = &frame[..];
        let read = read_frame(&mut reader, 0).await.unwrap().unwrap();
        assert_eq!(read.message_type, MessageType::Hello);
        assert_eq!(HelloMessage::from_bytes(read.payload()).unwrap(), hello);
        assert!(read_frame(&mut reader, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_unknown_type() {
        let mut reader = &b"XYZF\x08\x00\x00\x00"[..];
        let err = read_frame(&mut reader, 0).await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Protocol(ProtocolError::UnexpectedMessage { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let frame = encode_frame(MessageType::Message, ChunkType::Final, &[0u8; 100]);
        let mut reader = &frame[..];
        let err = read_frame(&mut reader, 64).await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Protocol(ProtocolError::MessageTooLarge { size: 108, max: 64 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let frame = encode_frame(MessageType::Message, ChunkType::Final, &[1, 2, 3, 4]);
        let mut reader = &frame[..frame.len() - 1];
        assert!(matches!(
            read_frame(&mut reader, 0).await,
            Err(UaError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_open_chunk() {
        let chunk = OpenChunk::new(
            7,
            "http://opcfoundation.org/UA/SecurityPolicy#None",
            1,
            1,
            Bytes::from_static(&[9, 8, 7]),
        );
        let bytes = chunk.encode();
        let mut reader = &bytes[..];
        let frame = read_frame(&mut reader, 0).await.unwrap().unwrap();
        assert_eq!(frame.secure_channel_id().unwrap(), 7);
        assert_eq!(OpenChunk::decode(&frame).unwrap(), chunk);
    }

    #[test]
    fn test_error_message() {
        let message = ErrorMessage::new(StatusCode::BAD_TCP_MESSAGE_TOO_LARGE, "too big");
        let decoded = ErrorMessage::from_bytes(&message.to_bytes()).unwrap();
        assert_eq!(decoded.reason.as_str(), "too big");
        assert_eq!(decoded.error, StatusCode::BAD_TCP_MESSAGE_TOO_LARGE);
    }
}
