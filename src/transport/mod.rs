//! Transport module - Hands framed packets to the link layer
//!
//! Provides:
//! - The packet container (port, channel, payload)
//! - The `PacketSink` capability the loader dispatches through
//! - Channel and UDP sinks

mod channel;
mod packet;
mod udp;

pub use channel::*;
pub use packet::*;
pub use udp::*;

use std::sync::Arc;
use thiserror::Error;

/// Errors a sink can report when accepting a packet
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink is full, packet not accepted")]
    Backpressure,

    #[error("Sink closed")]
    Closed,

    #[error("Payload too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Anything that can accept a packet for delivery
///
/// Implementations must not block. Fire-and-forget sinks return `Ok(())`
/// once the packet is handed off; delivery is never confirmed here.
pub trait PacketSink: Send + Sync {
    /// Hand a packet to the link layer
    fn send_packet(&self, packet: Packet) -> SinkResult<()>;
}

impl<S: PacketSink + ?Sized> PacketSink for &S {
    fn send_packet(&self, packet: Packet) -> SinkResult<()> {
        (**self).send_packet(packet)
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Arc<S> {
    fn send_packet(&self, packet: Packet) -> SinkResult<()> {
        (**self).send_packet(packet)
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn send_packet(&self, packet: Packet) -> SinkResult<()> {
        (**self).send_packet(packet)
    }
}
