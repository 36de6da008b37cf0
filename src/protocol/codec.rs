//! Protocol codec for encoding/decoding reservoir commands
//!
//! Packs commands into their fixed little-endian payload layout and parses
//! payloads back into commands.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Command, Opcode};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty payload")]
    Empty,

    #[error("Unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    #[error("Invalid payload length for {opcode}: {actual} bytes (expected {expected})")]
    InvalidLength {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },

    #[error("Field {field} out of range: {value} (max: {max})")]
    FieldOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

impl Command {
    /// Encode the command payload into a buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.payload_len());
        buf.put_u8(self.opcode() as u8);

        match *self {
            Command::AllocReservoir {
                reservoir,
                size,
                connectivity,
            } => {
                buf.put_u8(reservoir);
                buf.put_u8(size);
                buf.put_u16_le(connectivity);
            }
            Command::SetInputWeight {
                reservoir,
                input,
                neuron,
                weight,
            } => {
                buf.put_u8(reservoir);
                buf.put_u8(input);
                buf.put_u8(neuron);
                buf.put_f32_le(weight);
            }
            Command::AppendInternalWeight {
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                weight,
            } => {
                buf.put_u8(reservoir);
                buf.put_u16_le(pair);
                buf.put_u8(out_neuron);
                buf.put_u8(in_neuron);
                buf.put_f32_le(weight);
            }
            Command::SetOutputWeight {
                reservoir,
                output,
                neuron,
                weight,
            } => {
                buf.put_u8(reservoir);
                buf.put_u8(output);
                buf.put_u8(neuron);
                buf.put_f32_le(weight);
            }
            Command::ComputeChecksum => {}
        }
    }

    /// Encode the command into a standalone payload
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a payload produced by [`Command::encode`]
    ///
    /// The payload length must match the opcode's fixed length exactly.
    pub fn decode(payload: &[u8]) -> CodecResult<Self> {
        let (&first, _) = payload.split_first().ok_or(CodecError::Empty)?;
        let opcode = Opcode::from_u8(first).ok_or(CodecError::UnknownOpcode(first))?;

        if payload.len() != opcode.payload_len() {
            return Err(CodecError::InvalidLength {
                opcode,
                expected: opcode.payload_len(),
                actual: payload.len(),
            });
        }

        let mut buf = &payload[1..];
        let command = match opcode {
            Opcode::AllocReservoir => Command::AllocReservoir {
                reservoir: buf.get_u8(),
                size: buf.get_u8(),
                connectivity: buf.get_u16_le(),
            },
            Opcode::SetInputWeight => Command::SetInputWeight {
                reservoir: buf.get_u8(),
                input: buf.get_u8(),
                neuron: buf.get_u8(),
                weight: buf.get_f32_le(),
            },
            Opcode::AppendInternalWeight => Command::AppendInternalWeight {
                reservoir: buf.get_u8(),
                pair: buf.get_u16_le(),
                out_neuron: buf.get_u8(),
                in_neuron: buf.get_u8(),
                weight: buf.get_f32_le(),
            },
            Opcode::SetOutputWeight => Command::SetOutputWeight {
                reservoir: buf.get_u8(),
                output: buf.get_u8(),
                neuron: buf.get_u8(),
                weight: buf.get_f32_le(),
            },
            Opcode::ComputeChecksum => Command::ComputeChecksum,
        };

        Ok(command)
    }

    /// Build an allocate command from wide integers, rejecting values that
    /// don't fit their field
    pub fn checked_alloc(reservoir: u32, size: u32, connectivity: u32) -> CodecResult<Self> {
        Ok(Command::AllocReservoir {
            reservoir: narrow_u8("reservoir", reservoir)?,
            size: narrow_u8("size", size)?,
            connectivity: narrow_u16("connectivity", connectivity)?,
        })
    }

    pub fn checked_input_weight(
        reservoir: u32,
        input: u32,
        neuron: u32,
        weight: f32,
    ) -> CodecResult<Self> {
        Ok(Command::SetInputWeight {
            reservoir: narrow_u8("reservoir", reservoir)?,
            input: narrow_u8("input", input)?,
            neuron: narrow_u8("neuron", neuron)?,
            weight,
        })
    }

    pub fn checked_internal_weight(
        reservoir: u32,
        pair: u32,
        out_neuron: u32,
        in_neuron: u32,
        weight: f32,
    ) -> CodecResult<Self> {
        Ok(Command::AppendInternalWeight {
            reservoir: narrow_u8("reservoir", reservoir)?,
            pair: narrow_u16("pair", pair)?,
            out_neuron: narrow_u8("out_neuron", out_neuron)?,
            in_neuron: narrow_u8("in_neuron", in_neuron)?,
            weight,
        })
    }

    pub fn checked_output_weight(
        reservoir: u32,
        output: u32,
        neuron: u32,
        weight: f32,
    ) -> CodecResult<Self> {
        Ok(Command::SetOutputWeight {
            reservoir: narrow_u8("reservoir", reservoir)?,
            output: narrow_u8("output", output)?,
            neuron: narrow_u8("neuron", neuron)?,
            weight,
        })
    }
}

fn narrow_u8(field: &'static str, value: u32) -> CodecResult<u8> {
    u8::try_from(value).map_err(|_| CodecError::FieldOutOfRange {
        field,
        value,
        max: u8::MAX as u32,
    })
}

fn narrow_u16(field: &'static str, value: u32) -> CodecResult<u16> {
    u16::try_from(value).map_err(|_| CodecError::FieldOutOfRange {
        field,
        value,
        max: u16::MAX as u32,
    })
}
