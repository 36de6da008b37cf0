//! Reservoir command definitions
//!
//! Defines the five commands understood by the on-device reservoir loader
//! and their opcode table.

use std::fmt;

/// Command opcodes, the first byte of every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    AllocReservoir = 0,
    SetInputWeight = 1,
    AppendInternalWeight = 2,
    SetOutputWeight = 3,
    ComputeChecksum = 4,
}

impl Opcode {
    /// All opcodes in wire order
    pub const ALL: [Opcode; 5] = [
        Opcode::AllocReservoir,
        Opcode::SetInputWeight,
        Opcode::AppendInternalWeight,
        Opcode::SetOutputWeight,
        Opcode::ComputeChecksum,
    ];

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Opcode::AllocReservoir),
            1 => Some(Opcode::SetInputWeight),
            2 => Some(Opcode::AppendInternalWeight),
            3 => Some(Opcode::SetOutputWeight),
            4 => Some(Opcode::ComputeChecksum),
            _ => None,
        }
    }

    /// Total payload length for this opcode, including the opcode byte
    pub const fn payload_len(self) -> usize {
        match self {
            Opcode::AllocReservoir => 5,
            Opcode::SetInputWeight => 8,
            Opcode::AppendInternalWeight => 10,
            Opcode::SetOutputWeight => 8,
            Opcode::ComputeChecksum => 1,
        }
    }

    /// Operation name, as used in logs and the CLI
    pub fn name(self) -> &'static str {
        match self {
            Opcode::AllocReservoir => "allocate_reservoir",
            Opcode::SetInputWeight => "set_input_weight",
            Opcode::AppendInternalWeight => "append_internal_weight",
            Opcode::SetOutputWeight => "set_output_weight",
            Opcode::ComputeChecksum => "compute_checksum",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All reservoir configuration commands
///
/// Field widths match the device decoder exactly: reservoir, neuron, input
/// and output indices are one byte, `size` is one byte, `connectivity` and
/// the internal `pair` index are two bytes, weights are `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Allocate a reservoir of `size` neurons with room for `connectivity`
    /// internal weights
    AllocReservoir {
        reservoir: u8,
        size: u8,
        connectivity: u16,
    },

    /// Set the weight from input `input` to neuron `neuron`
    SetInputWeight {
        reservoir: u8,
        input: u8,
        neuron: u8,
        weight: f32,
    },

    /// Store internal connection number `pair`, from `in_neuron` to `out_neuron`
    AppendInternalWeight {
        reservoir: u8,
        pair: u16,
        out_neuron: u8,
        in_neuron: u8,
        weight: f32,
    },

    /// Set the weight from neuron `neuron` to output `output`
    SetOutputWeight {
        reservoir: u8,
        output: u8,
        neuron: u8,
        weight: f32,
    },

    /// Ask the device to checksum everything loaded so far
    ComputeChecksum,
}

impl Command {
    /// Get the opcode for this command
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::AllocReservoir { .. } => Opcode::AllocReservoir,
            Command::SetInputWeight { .. } => Opcode::SetInputWeight,
            Command::AppendInternalWeight { .. } => Opcode::AppendInternalWeight,
            Command::SetOutputWeight { .. } => Opcode::SetOutputWeight,
            Command::ComputeChecksum => Opcode::ComputeChecksum,
        }
    }

    /// Encoded payload length
    pub fn payload_len(&self) -> usize {
        self.opcode().payload_len()
    }

    /// Reservoir index this command targets, if any
    pub fn reservoir(&self) -> Option<u8> {
        match *self {
            Command::AllocReservoir { reservoir, .. }
            | Command::SetInputWeight { reservoir, .. }
            | Command::AppendInternalWeight { reservoir, .. }
            | Command::SetOutputWeight { reservoir, .. } => Some(reservoir),
            Command::ComputeChecksum => None,
        }
    }

    /// Check if this command carries a weight
    pub fn is_weight(&self) -> bool {
        matches!(
            self,
            Command::SetInputWeight { .. }
                | Command::AppendInternalWeight { .. }
                | Command::SetOutputWeight { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::AllocReservoir {
                reservoir,
                size,
                connectivity,
            } => write!(
                f,
                "{}(res={}, size={}, connectivity={})",
                self.opcode(),
                reservoir,
                size,
                connectivity
            ),
            Command::SetInputWeight {
                reservoir,
                input,
                neuron,
                weight,
            } => write!(
                f,
                "{}(res={}, input={}, neuron={}, weight={})",
                self.opcode(),
                reservoir,
                input,
                neuron,
                weight
            ),
            Command::AppendInternalWeight {
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                weight,
            } => write!(
                f,
                "{}(res={}, pair={}, out={}, in={}, weight={})",
                self.opcode(),
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                weight
            ),
            Command::SetOutputWeight {
                reservoir,
                output,
                neuron,
                weight,
            } => write!(
                f,
                "{}(res={}, output={}, neuron={}, weight={})",
                self.opcode(),
                reservoir,
                output,
                neuron,
                weight
            ),
            Command::ComputeChecksum => write!(f, "{}()", self.opcode()),
        }
    }
}
