//! Message frame codec.
//!
//! Layout of a frame without extended payload (64 bytes):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 2    | header top `C1 C0`                      |
//! | 2      | 2    | protocol version `11 00`                |
//! | 4      | 2    | flags                                   |
//! | 6      | 2    | error number                            |
//! | 8      | 4    | message type                            |
//! | 12     | 4    | regarding                               |
//! | 16     | 6    | reserved                                |
//! | 22     | 1    | checksum type                           |
//! | 23     | 1    | immediate data length                   |
//! | 24     | 16   | immediate data                          |
//! | 40     | 4    | bytes remaining                         |
//! | 44     | 16   | checksum                                |
//! | 60     | 4    | footer `C5 C4 C3 C2`                    |
//!
//! An extended payload is inserted at offset 44 and zero-padded until the
//! checksum starts at offset 44 of the last 64-byte block.

use crate::constants::*;
use crate::error::{DeviceErrorCode, StsError};
use bytes::{BufMut, Bytes, BytesMut};
use modular_bitfield::prelude::*;
use num_enum::FromPrimitive;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub response: bool,
    pub ack: bool,
    pub ack_requested: bool,
    pub nack: bool,
    pub exception: bool,
    #[skip]
    unused: B11,
}

impl Flags {
    pub fn union(self, other: Flags) -> Flags {
        let a = u16::from_le_bytes(self.into_bytes());
        let b = u16::from_le_bytes(other.into_bytes());
        Flags::from_bytes((a | b).to_le_bytes())
    }

    pub fn bits(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }
}

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct FrameHeader {
    header_top: [u8; 2],
    protocol_version: [u8; 2],
    flags: [u8; 2],
    error_number: U16,
    message_type: U32,
    regarding: U32,
    reserved: [u8; 6],
    checksum_type: u8,
    immediate_length: u8,
    immediate: [u8; IMMEDIATE_DATA_SIZE],
    bytes_remaining: U32,
}

/// Total length on the wire of a frame declaring `bytes_remaining`.
pub fn frame_len(bytes_remaining: u32) -> usize {
    let payload = (bytes_remaining as usize).saturating_sub(TRAILER_SIZE);
    BLOCK_SIZE + payload.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// A frame to be encoded. Built fresh for every exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub flags: Flags,
    pub error_number: u16,
    pub message_type: u32,
    pub regarding: u32,
    pub immediate: Bytes,
    pub payload: Option<Bytes>,
}

impl Frame {
    pub fn new(message_type: u32) -> Self {
        Self {
            flags: Flags::new(),
            error_number: 0,
            message_type,
            regarding: 0,
            immediate: Bytes::new(),
            payload: None,
        }
    }

    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_error_number(mut self, error_number: u16) -> Self {
        self.error_number = error_number;
        self
    }

    pub fn with_regarding(mut self, regarding: u32) -> Self {
        self.regarding = regarding;
        self
    }

    pub fn with_immediate(mut self, data: impl Into<Bytes>) -> Self {
        self.immediate = data.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn bytes_remaining(&self) -> u32 {
        let payload = self.payload.as_ref().map_or(0, Bytes::len);
        NO_PAYLOAD_BYTES_REMAINING + payload as u32
    }

    pub fn encoded_len(&self) -> usize {
        frame_len(self.bytes_remaining())
    }

    pub fn encode(&self) -> Result<Bytes, StsError> {
        if self.immediate.len() > IMMEDIATE_DATA_SIZE {
            return Err(StsError::malformed(format!(
                "immediate data is {} bytes, at most {} fit",
                self.immediate.len(),
                IMMEDIATE_DATA_SIZE
            )));
        }
        let mut immediate = [0u8; IMMEDIATE_DATA_SIZE];
        immediate[..self.immediate.len()].copy_from_slice(&self.immediate);

        let header = FrameHeader {
            header_top: HEADER_TOP,
            protocol_version: PROTOCOL_VERSION,
            flags: self.flags.into_bytes(),
            error_number: U16::new(self.error_number),
            message_type: U32::new(self.message_type),
            regarding: U32::new(self.regarding),
            reserved: [0; 6],
            checksum_type: CHECKSUM_TYPE_NONE,
            immediate_length: self.immediate.len() as u8,
            immediate,
            bytes_remaining: U32::new(self.bytes_remaining()),
        };

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(header.as_bytes());
        if let Some(payload) = &self.payload {
            buf.put_slice(payload);
            while buf.len() % BLOCK_SIZE != HEADER_SIZE {
                buf.put_u8(0);
            }
        }
        buf.put_bytes(0, CHECKSUM_SIZE);
        buf.put_slice(&FOOTER);
        debug_assert_eq!(buf.len() % BLOCK_SIZE, 0);
        Ok(buf.freeze())
    }
}

/// Encodes a request frame. `flags_extra` is OR-ed into the (empty) base flags.
pub fn encode(
    command_code: u32,
    flags_extra: Flags,
    immediate_data: &[u8],
    extended_payload: Option<&[u8]>,
) -> Result<Bytes, StsError> {
    let mut frame = Frame::new(command_code)
        .with_flags(Flags::new().union(flags_extra))
        .with_immediate(Bytes::copy_from_slice(immediate_data));
    if let Some(payload) = extended_payload {
        frame = frame.with_payload(Bytes::copy_from_slice(payload));
    }
    frame.encode()
}

/// A decoded frame, or the leading block of a multi-block frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFrame {
    pub flags: Flags,
    pub error_number: u16,
    pub message_type: u32,
    pub regarding: u32,
    pub immediate_length: u8,
    pub immediate: [u8; IMMEDIATE_DATA_SIZE],
    pub bytes_remaining: u32,
    /// Extended payload bytes present in the decoded buffer. For a leading
    /// block this is only the part that fits before the block end.
    pub payload: Bytes,
}

impl ParsedFrame {
    pub fn is_response(&self) -> bool {
        self.flags.response()
    }

    pub fn is_ack(&self) -> bool {
        self.flags.ack()
    }

    pub fn is_nack(&self) -> bool {
        self.flags.nack()
    }

    pub fn is_exception(&self) -> bool {
        self.flags.exception()
    }

    pub fn error_code(&self) -> DeviceErrorCode {
        DeviceErrorCode::from_primitive(self.error_number)
    }

    pub fn immediate_data(&self) -> &[u8] {
        &self.immediate[..self.immediate_length as usize]
    }

    pub fn has_payload(&self) -> bool {
        self.bytes_remaining > NO_PAYLOAD_BYTES_REMAINING
    }

    /// Declared length of the extended payload.
    pub fn payload_len(&self) -> usize {
        (self.bytes_remaining - NO_PAYLOAD_BYTES_REMAINING) as usize
    }

    /// Total number of 64-byte blocks making up the frame.
    pub fn block_count(&self) -> usize {
        frame_len(self.bytes_remaining) / BLOCK_SIZE
    }

    /// Immediate data for frames without payload, otherwise the payload bytes held.
    pub fn data(&self) -> &[u8] {
        if self.has_payload() {
            &self.payload
        } else {
            self.immediate_data()
        }
    }
}

/// Decodes a complete frame or the first 64-byte block of a longer one.
pub fn decode_response(bytes: &[u8]) -> Result<ParsedFrame, StsError> {
    if bytes.len() < BLOCK_SIZE || bytes.len() % BLOCK_SIZE != 0 {
        return Err(StsError::malformed(format!(
            "length {} is not a positive multiple of {}",
            bytes.len(),
            BLOCK_SIZE
        )));
    }
    let (header, _) = FrameHeader::read_from_prefix(bytes)
        .map_err(|_| StsError::malformed("header too short".to_string()))?;

    if header.header_top != HEADER_TOP {
        return Err(StsError::malformed(format!(
            "bad header magic {}",
            hex::encode(header.header_top)
        )));
    }
    if header.protocol_version != PROTOCOL_VERSION {
        return Err(StsError::malformed(format!(
            "unsupported protocol version {}",
            hex::encode(header.protocol_version)
        )));
    }
    if header.immediate_length as usize > IMMEDIATE_DATA_SIZE {
        return Err(StsError::malformed(format!(
            "immediate data length {} exceeds {}",
            header.immediate_length, IMMEDIATE_DATA_SIZE
        )));
    }
    let bytes_remaining = header.bytes_remaining.get();
    if bytes_remaining < NO_PAYLOAD_BYTES_REMAINING {
        return Err(StsError::malformed(format!(
            "bytes remaining {} below the {} byte trailer",
            bytes_remaining, NO_PAYLOAD_BYTES_REMAINING
        )));
    }
    if bytes_remaining as usize > NO_PAYLOAD_BYTES_REMAINING as usize + MAX_PAYLOAD_SIZE {
        return Err(StsError::malformed(format!(
            "bytes remaining {} exceeds the {} byte payload limit",
            bytes_remaining, MAX_PAYLOAD_SIZE
        )));
    }

    let expected = frame_len(bytes_remaining);
    if bytes.len() > expected {
        return Err(StsError::malformed(format!(
            "{} bytes received but frame declares {}",
            bytes.len(),
            expected
        )));
    }

    let payload_len = (bytes_remaining - NO_PAYLOAD_BYTES_REMAINING) as usize;
    let payload = if bytes.len() == expected {
        if bytes[expected - FOOTER_SIZE..] != FOOTER {
            return Err(StsError::malformed(format!(
                "bad footer magic {}",
                hex::encode(&bytes[expected - FOOTER_SIZE..])
            )));
        }
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + payload_len])
    } else {
        Bytes::copy_from_slice(&bytes[HEADER_SIZE..])
    };

    Ok(ParsedFrame {
        flags: Flags::from_bytes(header.flags),
        error_number: header.error_number.get(),
        message_type: header.message_type.get(),
        regarding: header.regarding.get(),
        immediate_length: header.immediate_length,
        immediate: header.immediate,
        bytes_remaining,
        payload,
    })
}
