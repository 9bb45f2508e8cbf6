//! Reads request frames from a client stream.
//!
//! Each frame starts with a type byte. Command frames continue with the
//! opcode (high byte first), a one-byte parameter length and the parameter
//! block. Close frames carry nothing further.

use std::fmt;
use std::io::{self, Read};

use thiserror::Error;

use crate::command::Opcode;

/// Frame type byte introducing a vendor command.
pub(crate) const COMMAND_FRAME: u8 = 0x01;
/// Frame type byte requesting the connection be closed.
pub(crate) const CLOSE_FRAME: u8 = 0x02;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CommandFrame {
    pub(crate) opcode: Opcode,
    pub(crate) parameters: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame {
    Command(CommandFrame),
    Close,
    /// Type byte outside the protocol.
    Unknown(u8),
    /// The peer closed its end before a type byte arrived.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameField {
    Type,
    OpcodeHigh,
    OpcodeLow,
    ParameterLength,
    Parameters,
}

impl fmt::Display for FrameField {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Type => "frame type",
            Self::OpcodeHigh => "opcode high byte",
            Self::OpcodeLow => "opcode low byte",
            Self::ParameterLength => "parameter length",
            Self::Parameters => "parameter block",
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("connection ended while reading the {field}")]
    ShortRead { field: FrameField },
    #[error("failed to read the {field}: {source}")]
    Io {
        field: FrameField,
        #[source]
        source: io::Error,
    },
    /// The frame was consumed but its parameters could not be stored.
    #[error("failed to allocate a {len}-byte parameter buffer")]
    Allocation { len: usize },
}

impl FrameError {
    /// Whether the connection must be closed after this error.
    pub(crate) fn is_fatal(&self) -> bool {
        !matches!(self, Self::Allocation { .. })
    }
}

/// Reads one frame, blocking until it is complete.
pub(crate) fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, FrameError> {
    let Some(kind) = read_type_byte(reader)? else {
        return Ok(Frame::EndOfStream);
    };
    match kind {
        COMMAND_FRAME => read_command(reader).map(Frame::Command),
        CLOSE_FRAME => Ok(Frame::Close),
        other => Ok(Frame::Unknown(other)),
    }
}

fn read_type_byte<R: Read>(reader: &mut R) -> Result<Option<u8>, FrameError> {
    let mut buffer = [0_u8; 1];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(None),
            Ok(_) => {
                let [kind] = buffer;
                return Ok(Some(kind));
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => {
                return Err(FrameError::Io {
                    field: FrameField::Type,
                    source,
                });
            }
        }
    }
}

fn read_command<R: Read>(reader: &mut R) -> Result<CommandFrame, FrameError> {
    let high = read_byte(reader, FrameField::OpcodeHigh)?;
    let low = read_byte(reader, FrameField::OpcodeLow)?;
    let len = usize::from(read_byte(reader, FrameField::ParameterLength)?);

    let mut parameters = Vec::new();
    if parameters.try_reserve_exact(len).is_err() {
        // Keep the stream aligned on the next frame boundary.
        discard(reader, len)?;
        return Err(FrameError::Allocation { len });
    }
    parameters.resize(len, 0);
    read_field(reader, &mut parameters, FrameField::Parameters)?;

    Ok(CommandFrame {
        opcode: Opcode::from_wire(high, low),
        parameters,
    })
}

fn read_byte<R: Read>(reader: &mut R, field: FrameField) -> Result<u8, FrameError> {
    let mut buffer = [0_u8; 1];
    read_field(reader, &mut buffer, field)?;
    let [byte] = buffer;
    Ok(byte)
}

fn read_field<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
    field: FrameField,
) -> Result<(), FrameError> {
    reader.read_exact(buffer).map_err(|source| {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::ShortRead { field }
        } else {
            FrameError::Io { field, source }
        }
    })
}

fn discard<R: Read>(reader: &mut R, len: usize) -> Result<(), FrameError> {
    let mut remaining = len;
    let mut scratch = [0_u8; 32];
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        let window = scratch.get_mut(..chunk).unwrap_or_default();
        read_field(reader, window, FrameField::Parameters)?;
        remaining -= chunk;
    }
    Ok(())
}
