//! Request/response exchanges over one of the two lines.
//!
//! The protocol carries no request identifiers, so each line is guarded by
//! its own lock which is held from the first written block until the last
//! block of the reply has been read. Exchanges on different lines do not
//! contend.

use crate::command::{Command, Direction};
use crate::config::DeviceConfig;
use crate::constants::{BLOCK_SIZE, MAX_PACKET_SIZE};
use crate::error::StsError;
use crate::frame::{Flags, Frame, ParsedFrame, decode_response};
use crate::transport::{Line, UsbTransport};
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct Session<T> {
    transport: T,
    config: DeviceConfig,
    lines: [Mutex<()>; 2],
}

impl<T: UsbTransport> Session<T> {
    pub fn new(transport: T, config: DeviceConfig) -> Self {
        Self {
            transport,
            config,
            lines: [Mutex::new(()), Mutex::new(())],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Sends a request and waits for its ACK.
    pub async fn send(
        &self,
        command: Command,
        line: Line,
        immediate_data: &[u8],
        extended_payload: Option<&[u8]>,
    ) -> Result<(), StsError> {
        let mut frame = Frame::new(command.code()).with_immediate(Bytes::copy_from_slice(immediate_data));
        if let Some(payload) = extended_payload {
            frame = frame.with_payload(Bytes::copy_from_slice(payload));
        }
        self.send_frame(command, line, frame).await
    }

    /// Sends a prepared request frame and waits for its ACK.
    ///
    /// The ACK_REQUESTED flag is added to whatever flags the frame carries.
    /// The reset command is written without waiting for a reply.
    pub async fn send_frame(&self, command: Command, line: Line, frame: Frame) -> Result<(), StsError> {
        let descriptor = command.descriptor();
        if frame.payload.is_some() && !descriptor.expects_payload {
            return Err(StsError::invalid(command, "command takes no extended payload"));
        }
        let frame = Frame {
            flags: frame.flags.union(Flags::new().with_ack_requested(true)),
            ..frame
        };
        let bytes = frame.encode()?;

        let _guard = self.lines[line.index()].lock().await;
        self.write_blocks(line, &bytes).await?;

        if command == Command::Reset {
            debug!("{} sent on {}, not waiting for a reply", command, line);
            return Ok(());
        }

        self.await_reply(command, line, descriptor.direction).await?;
        Ok(())
    }

    /// Sends a query and returns the data of the reply.
    ///
    /// Replies without extended payload yield their immediate data; otherwise
    /// the remaining blocks are read and exactly the declared payload is returned.
    pub async fn query(&self, command: Command, line: Line, immediate_data: &[u8]) -> Result<Bytes, StsError> {
        let bytes = Frame::new(command.code())
            .with_immediate(Bytes::copy_from_slice(immediate_data))
            .encode()?;

        let _guard = self.lines[line.index()].lock().await;
        self.write_blocks(line, &bytes).await?;

        let direction = command.descriptor().direction;
        let (frame, first_block) = self.await_reply(command, line, direction).await?;
        if !frame.has_payload() {
            return Ok(Bytes::copy_from_slice(frame.immediate_data()));
        }

        let blocks = frame.block_count();
        debug!(
            "{} reply declares {} payload bytes over {} blocks",
            command,
            frame.payload_len(),
            blocks
        );
        let mut buf = BytesMut::with_capacity(blocks * BLOCK_SIZE);
        buf.extend_from_slice(&first_block);
        for _ in 1..blocks {
            let block = self.read_block(line).await?;
            if block.len() != BLOCK_SIZE {
                return Err(StsError::ShortRead {
                    endpoint: line.endpoint_in(),
                    expected: BLOCK_SIZE,
                    actual: block.len(),
                });
            }
            buf.extend_from_slice(&block);
        }

        let full = decode_response(&buf).map_err(|e| e.in_reply_to(command))?;
        Ok(full.payload)
    }

    async fn write_blocks(&self, line: Line, bytes: &[u8]) -> Result<(), StsError> {
        let endpoint = line.endpoint_out();
        let delay = self.config.block_delay();
        for block in bytes.chunks(BLOCK_SIZE) {
            debug!(endpoint, bytes = hex::encode(block), "USB Write");
            self.transport.write(endpoint, block.to_vec()).await?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn read_block(&self, line: Line) -> Result<Vec<u8>, StsError> {
        let endpoint = line.endpoint_in();
        let data = self
            .transport
            .read(endpoint, MAX_PACKET_SIZE, self.config.read_timeout())
            .await?;
        debug!(endpoint, bytes = hex::encode(&data), "USB Read");
        Ok(data)
    }

    /// Reads until a frame acceptable for `direction` arrives.
    ///
    /// One unacceptable or undecodable frame, including a reply to some
    /// other command, is tolerated and followed by a second read. Frames
    /// reporting code 255 are read past without using up that retry, up to
    /// `max_deferred_reads` times, whatever their flags.
    /// A NACK or exception naming this very command fails at once, since no
    /// further reply will follow it.
    async fn await_reply(
        &self,
        command: Command,
        line: Line,
        direction: Direction,
    ) -> Result<(ParsedFrame, Vec<u8>), StsError> {
        let mut retried = false;
        let mut deferred = 0;

        loop {
            let attempt = match self.read_block(line).await {
                Ok(block) => decode_response(&block).map(|frame| (frame, block)),
                Err(e @ StsError::TransportTimeout { .. }) => Err(e),
                Err(e) => return Err(e),
            };

            match attempt {
                Ok((frame, _)) if frame.error_code().is_deferred() => {
                    if deferred >= self.config.max_deferred_reads {
                        return Err(StsError::Device {
                            command,
                            code: frame.error_code(),
                        });
                    }
                    deferred += 1;
                    warn!("{} deferred by device on {} ({} so far), reading again", command, line, deferred);
                }
                Ok((frame, block)) if accepts(&frame, command, direction) => return Ok((frame, block)),
                Ok((frame, _)) if rejects(&frame, command) => {
                    return Err(StsError::Device {
                        command,
                        code: frame.error_code(),
                    });
                }
                Ok((frame, _)) if !retried => {
                    retried = true;
                    warn!(
                        "{} got unexpected frame on {} (type {:#010x}, flags {:#06x}, error {}), reading again",
                        command,
                        line,
                        frame.message_type,
                        frame.flags.bits(),
                        frame.error_number
                    );
                }
                Ok((frame, _)) => {
                    return Err(StsError::Device {
                        command,
                        code: frame.error_code(),
                    });
                }
                Err(e) if !retried => {
                    retried = true;
                    warn!("{} read failed on {}: {}, reading again", command, line, e);
                }
                Err(e) => return Err(e.in_reply_to(command)),
            }
        }
    }
}

/// A reply to `command` itself: an ACK for requests, a plain RESPONSE for queries.
fn accepts(frame: &ParsedFrame, command: Command, direction: Direction) -> bool {
    if frame.message_type != command.code() || frame.is_nack() || frame.is_exception() {
        return false;
    }
    match direction {
        Direction::Request => frame.is_ack(),
        Direction::Query => frame.is_response() && !frame.is_ack(),
    }
}

/// The device refused this command, as opposed to a stale frame in flight.
fn rejects(frame: &ParsedFrame, command: Command) -> bool {
    (frame.is_nack() || frame.is_exception()) && frame.message_type == command.code() && frame.error_number != 0
}
