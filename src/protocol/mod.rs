//! Protocol module - Defines the wire protocol for reservoir configuration
//!
//! Every command is a single link payload in a fixed little-endian layout:
//! - 1 byte opcode
//! - Opcode-specific fields (u8 indices, u16 counts, f32 weights)
//!
//! Payload lengths are constant per opcode and never depend on field values.

mod codec;
mod command;

pub use codec::*;
pub use command::*;

/// Link port reserved for reservoir configuration traffic
pub const RESERVOIR_PORT: u8 = 0x09;

/// Largest payload a single link frame can carry
pub const MAX_PAYLOAD_SIZE: usize = 30;
