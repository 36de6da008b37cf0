//! Upload sequencing
//!
//! The device expects reservoirs to be allocated before their weights are
//! set, and the checksum to come last. The sequencer tracks that progress
//! and refuses commands the device would reject, before anything is sent.

use std::collections::HashMap;
use std::fmt;

use super::{LoaderError, LoaderResult, ReservoirLoader};
use crate::protocol::Command;
use crate::transport::PacketSink;

/// Progress of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// Nothing allocated yet
    Unallocated,
    /// At least one reservoir allocated, no weights yet
    Allocated,
    /// Weights are being loaded
    Configured,
    /// Checksum requested, upload complete
    Checksummed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadState::Unallocated => "unallocated",
            UploadState::Allocated => "allocated",
            UploadState::Configured => "configured",
            UploadState::Checksummed => "checksummed",
        };
        f.write_str(name)
    }
}

/// Shape of an allocated reservoir
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Allocation {
    size: u8,
    connectivity: u16,
}

/// Enforces allocate, then weights, then checksum ordering on top of a loader
#[derive(Debug)]
pub struct UploadSequencer<S> {
    loader: ReservoirLoader<S>,
    state: UploadState,
    allocations: HashMap<u8, Allocation>,
    commands_sent: usize,
}

impl<S: PacketSink> UploadSequencer<S> {
    pub fn new(loader: ReservoirLoader<S>) -> Self {
        Self {
            loader,
            state: UploadState::Unallocated,
            allocations: HashMap::new(),
            commands_sent: 0,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Commands successfully handed to the sink since the last reset
    pub fn commands_sent(&self) -> usize {
        self.commands_sent
    }

    pub fn loader(&self) -> &ReservoirLoader<S> {
        &self.loader
    }

    pub fn into_loader(self) -> ReservoirLoader<S> {
        self.loader
    }

    /// Forget all progress and start a new upload
    pub fn reset(&mut self) {
        self.state = UploadState::Unallocated;
        self.allocations.clear();
        self.commands_sent = 0;
    }

    /// Validate a command against the upload so far, then dispatch it
    ///
    /// Nothing is sent when validation fails. State only advances once the
    /// sink has accepted the packet.
    pub fn dispatch(&mut self, command: &Command) -> LoaderResult<()> {
        let next = self.check(command)?;

        self.loader.send(command)?;
        self.commands_sent += 1;

        if let Command::AllocReservoir {
            reservoir,
            size,
            connectivity,
        } = *command
        {
            self.allocations.insert(reservoir, Allocation { size, connectivity });
        }

        if next != self.state {
            tracing::debug!("Upload state {} -> {}", self.state, next);
            self.state = next;
        }

        Ok(())
    }

    fn check(&self, command: &Command) -> LoaderResult<UploadState> {
        let out_of_order = || LoaderError::OutOfOrder {
            state: self.state,
            op: command.opcode(),
        };

        match *command {
            Command::AllocReservoir { reservoir, .. } => match self.state {
                UploadState::Checksummed => Err(out_of_order()),
                _ if self.allocations.contains_key(&reservoir) => {
                    Err(LoaderError::AlreadyAllocated(reservoir))
                }
                // Allocating another reservoir keeps weights already sent
                UploadState::Configured => Ok(UploadState::Configured),
                _ => Ok(UploadState::Allocated),
            },
            Command::SetInputWeight {
                reservoir, neuron, ..
            }
            | Command::SetOutputWeight {
                reservoir, neuron, ..
            } => {
                if !self.weights_allowed() {
                    return Err(out_of_order());
                }
                self.check_neuron(reservoir, neuron)?;
                Ok(UploadState::Configured)
            }
            Command::AppendInternalWeight {
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                ..
            } => {
                if !self.weights_allowed() {
                    return Err(out_of_order());
                }
                let alloc = self.check_neuron(reservoir, out_neuron)?;
                self.check_neuron(reservoir, in_neuron)?;
                if pair >= alloc.connectivity {
                    return Err(LoaderError::PairOutOfRange {
                        reservoir,
                        pair,
                        connectivity: alloc.connectivity,
                    });
                }
                Ok(UploadState::Configured)
            }
            Command::ComputeChecksum => match self.state {
                UploadState::Allocated | UploadState::Configured => Ok(UploadState::Checksummed),
                _ => Err(out_of_order()),
            },
        }
    }

    fn weights_allowed(&self) -> bool {
        matches!(
            self.state,
            UploadState::Allocated | UploadState::Configured
        )
    }

    fn check_neuron(&self, reservoir: u8, neuron: u8) -> LoaderResult<Allocation> {
        let alloc = *self
            .allocations
            .get(&reservoir)
            .ok_or(LoaderError::UnknownReservoir(reservoir))?;

        if neuron >= alloc.size {
            return Err(LoaderError::NeuronOutOfRange {
                reservoir,
                neuron,
                size: alloc.size,
            });
        }

        Ok(alloc)
    }

    pub fn alloc_reservoir(&mut self, reservoir: u8, size: u8, connectivity: u16) -> LoaderResult<()> {
        self.dispatch(&Command::AllocReservoir {
            reservoir,
            size,
            connectivity,
        })
    }

    pub fn set_input_weight(
        &mut self,
        reservoir: u8,
        input: u8,
        neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.dispatch(&Command::SetInputWeight {
            reservoir,
            input,
            neuron,
            weight,
        })
    }

    pub fn append_internal_weight(
        &mut self,
        reservoir: u8,
        pair: u16,
        out_neuron: u8,
        in_neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.dispatch(&Command::AppendInternalWeight {
            reservoir,
            pair,
            out_neuron,
            in_neuron,
            weight,
        })
    }

    pub fn set_output_weight(
        &mut self,
        reservoir: u8,
        output: u8,
        neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.dispatch(&Command::SetOutputWeight {
            reservoir,
            output,
            neuron,
            weight,
        })
    }

    pub fn compute_checksum(&mut self) -> LoaderResult<()> {
        self.dispatch(&Command::ComputeChecksum)
    }
}
