// Protocol constants for the Ocean Optics STS

/// USB vendor ID of Ocean Optics
pub const VID: u16 = 0x2457;

/// USB product ID of the STS
pub const PID: u16 = 0x4000;

/// Line 1 bulk OUT endpoint
pub const LINE1_ENDPOINT_OUT: u8 = 0x01;

/// Line 1 bulk IN endpoint
pub const LINE1_ENDPOINT_IN: u8 = 0x81;

/// Line 2 bulk OUT endpoint
pub const LINE2_ENDPOINT_OUT: u8 = 0x02;

/// Line 2 bulk IN endpoint
pub const LINE2_ENDPOINT_IN: u8 = 0x82;

/// Maximum IN packet size on both lines
pub const MAX_PACKET_SIZE: usize = 64;

/// Every transfer is a whole number of blocks of this size
pub const BLOCK_SIZE: usize = 64;

/// Header magic, first two bytes of every frame
pub const HEADER_TOP: [u8; 2] = [0xC1, 0xC0];

/// Protocol version, bytes 2..4 of every frame
pub const PROTOCOL_VERSION: [u8; 2] = [0x11, 0x00];

/// Footer magic, last four bytes of every frame
pub const FOOTER: [u8; 4] = [0xC5, 0xC4, 0xC3, 0xC2];

/// Size of the fixed header prefix (through the bytes-remaining field)
pub const HEADER_SIZE: usize = 44;

/// Size of the checksum block
pub const CHECKSUM_SIZE: usize = 16;

/// Size of the footer
pub const FOOTER_SIZE: usize = 4;

/// Checksum block plus footer
pub const TRAILER_SIZE: usize = CHECKSUM_SIZE + FOOTER_SIZE;

/// Capacity of the immediate data field
pub const IMMEDIATE_DATA_SIZE: usize = 16;

/// Byte offset of the flags field
pub const FLAGS_OFFSET: usize = 4;

/// Byte offset of the error number field
pub const ERROR_NUMBER_OFFSET: usize = 6;

/// Byte offset of the message type field
pub const MESSAGE_TYPE_OFFSET: usize = 8;

/// Byte offset of the immediate data length field
pub const IMMEDIATE_LENGTH_OFFSET: usize = 23;

/// Byte offset of the immediate data field
pub const IMMEDIATE_DATA_OFFSET: usize = 24;

/// Byte offset of the bytes-remaining field
pub const BYTES_REMAINING_OFFSET: usize = 40;

/// Bytes-remaining value of a frame without extended payload
pub const NO_PAYLOAD_BYTES_REMAINING: u32 = TRAILER_SIZE as u32;

/// Checksum type 0: no checksum
pub const CHECKSUM_TYPE_NONE: u8 = 0;

/// Largest extended payload a frame may carry (1024 floats)
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Detector pixels reported in a full spectrum
pub const PIXEL_COUNT: usize = 1024;
