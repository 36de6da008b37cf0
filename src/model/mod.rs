//! Reservoir model descriptions
//!
//! A model file lists reservoirs with their dense input and output weight
//! rows and their sparse internal connections. It expands into the command
//! sequence that uploads the whole network.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::loader::{LoaderError, UploadSequencer};
use crate::protocol::{CodecError, Command};
use crate::transport::PacketSink;

/// Model errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Model file not found: {0}")]
    NotFound(PathBuf),

    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("Upload error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Model has no reservoirs")]
    Empty,

    #[error("Reservoir {0} defined more than once")]
    DuplicateReservoir(u32),

    #[error("Reservoir {reservoir}: {reason}")]
    Shape { reservoir: u32, reason: String },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// A set of reservoirs to upload together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservoirModel {
    #[serde(default, rename = "reservoir")]
    pub reservoirs: Vec<ReservoirDef>,
}

/// One reservoir network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirDef {
    /// Reservoir slot on the device
    pub index: u32,
    /// Number of neurons
    pub size: u32,
    /// Internal weight capacity, defaults to the number of internal connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity: Option<u32>,
    /// `inputs[i][n]` is the weight from input `i` to neuron `n`
    #[serde(default)]
    pub inputs: Vec<Vec<f32>>,
    /// `outputs[o][n]` is the weight from neuron `n` to output `o`
    #[serde(default)]
    pub outputs: Vec<Vec<f32>>,
    /// Sparse internal connections, uploaded in order
    #[serde(default)]
    pub internal: Vec<InternalWeight>,
}

/// A single internal connection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InternalWeight {
    #[serde(rename = "out")]
    pub out_neuron: u32,
    #[serde(rename = "in")]
    pub in_neuron: u32,
    pub weight: f32,
}

impl ReservoirDef {
    pub fn connectivity(&self) -> u32 {
        self.connectivity.unwrap_or(self.internal.len() as u32)
    }

    fn shape_error(&self, reason: String) -> ModelError {
        ModelError::Shape {
            reservoir: self.index,
            reason,
        }
    }

    fn validate(&self) -> ModelResult<()> {
        for (i, row) in self.inputs.iter().enumerate() {
            if row.len() != self.size as usize {
                return Err(self.shape_error(format!(
                    "input row {} has {} weights, expected {}",
                    i,
                    row.len(),
                    self.size
                )));
            }
        }

        for (o, row) in self.outputs.iter().enumerate() {
            if row.len() != self.size as usize {
                return Err(self.shape_error(format!(
                    "output row {} has {} weights, expected {}",
                    o,
                    row.len(),
                    self.size
                )));
            }
        }

        for (pair, w) in self.internal.iter().enumerate() {
            if w.out_neuron >= self.size || w.in_neuron >= self.size {
                return Err(self.shape_error(format!(
                    "internal connection {} ({} -> {}) outside {} neurons",
                    pair, w.in_neuron, w.out_neuron, self.size
                )));
            }
        }

        if (self.internal.len() as u64) > u64::from(self.connectivity()) {
            return Err(self.shape_error(format!(
                "{} internal connections exceed connectivity {}",
                self.internal.len(),
                self.connectivity()
            )));
        }

        Ok(())
    }

    /// Commands for this reservoir: allocate, inputs, internal, outputs
    pub fn commands(&self) -> ModelResult<Vec<Command>> {
        self.validate()?;

        let count = 1
            + self.inputs.len() * self.size as usize
            + self.internal.len()
            + self.outputs.len() * self.size as usize;
        let mut commands = Vec::with_capacity(count);

        commands.push(Command::checked_alloc(
            self.index,
            self.size,
            self.connectivity(),
        )?);

        for (input, row) in self.inputs.iter().enumerate() {
            for (neuron, &weight) in row.iter().enumerate() {
                commands.push(Command::checked_input_weight(
                    self.index,
                    input as u32,
                    neuron as u32,
                    weight,
                )?);
            }
        }

        for (pair, w) in self.internal.iter().enumerate() {
            commands.push(Command::checked_internal_weight(
                self.index,
                pair as u32,
                w.out_neuron,
                w.in_neuron,
                w.weight,
            )?);
        }

        for (output, row) in self.outputs.iter().enumerate() {
            for (neuron, &weight) in row.iter().enumerate() {
                commands.push(Command::checked_output_weight(
                    self.index,
                    output as u32,
                    neuron as u32,
                    weight,
                )?);
            }
        }

        Ok(commands)
    }
}

impl ReservoirModel {
    /// Load a model from a TOML file
    pub fn load(path: &Path) -> ModelResult<Self> {
        if !path.exists() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ModelResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save the model to a TOML file
    pub fn save(&self, path: &Path) -> ModelResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Full upload sequence: every reservoir in order, then one checksum
    pub fn commands(&self) -> ModelResult<Vec<Command>> {
        if self.reservoirs.is_empty() {
            return Err(ModelError::Empty);
        }

        let mut seen = HashSet::new();
        let mut commands = Vec::new();

        for reservoir in &self.reservoirs {
            if !seen.insert(reservoir.index) {
                return Err(ModelError::DuplicateReservoir(reservoir.index));
            }
            commands.extend(reservoir.commands()?);
        }

        commands.push(Command::ComputeChecksum);
        Ok(commands)
    }

    /// Upload through a sequencer, returning the number of commands sent
    ///
    /// Stops at the first rejected command.
    pub fn upload<S: PacketSink>(&self, sequencer: &mut UploadSequencer<S>) -> ModelResult<usize> {
        let commands = self.commands()?;

        tracing::info!(
            "Uploading {} reservoir(s) as {} commands",
            self.reservoirs.len(),
            commands.len()
        );

        for command in &commands {
            sequencer.dispatch(command)?;
        }

        Ok(commands.len())
    }
}

/// Generate a small sample model file
pub fn generate_sample_model() -> ModelResult<String> {
    let model = ReservoirModel {
        reservoirs: vec![ReservoirDef {
            index: 0,
            size: 4,
            connectivity: Some(4),
            inputs: vec![vec![0.5, -0.25, 0.125, 1.0]],
            outputs: vec![vec![1.0, 0.0, -1.0, 0.5]],
            internal: vec![
                InternalWeight {
                    out_neuron: 1,
                    in_neuron: 0,
                    weight: 0.9,
                },
                InternalWeight {
                    out_neuron: 2,
                    in_neuron: 1,
                    weight: -0.4,
                },
                InternalWeight {
                    out_neuron: 3,
                    in_neuron: 2,
                    weight: 0.7,
                },
                InternalWeight {
                    out_neuron: 0,
                    in_neuron: 3,
                    weight: 0.2,
                },
            ],
        }],
    };

    Ok(toml::to_string_pretty(&model)?)
}
