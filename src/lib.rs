//! Reslink - Reservoir network configuration link
//!
//! Encodes reservoir configuration commands into their fixed binary layout
//! and hands them, one packet per command, to a link-layer packet sink.

pub mod config;
pub mod loader;
pub mod model;
pub mod protocol;
pub mod transport;

pub use loader::{LoaderError, LoaderResult, ReservoirLoader, UploadSequencer, UploadState};
pub use protocol::{Command, Opcode, RESERVOIR_PORT};
pub use transport::{Packet, PacketSink, Port, SinkError};
