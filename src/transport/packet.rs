//! Link packet container and header framing
//!
//! A link frame is one header byte followed by the payload:
//! - bits 7..4: port
//! - bits 3..2: link bits, always set
//! - bits 1..0: channel

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use super::{SinkError, SinkResult};
use crate::protocol::{Command, MAX_PAYLOAD_SIZE, RESERVOIR_PORT};

const LINK_BITS: u8 = 0b11 << 2;

/// 4-bit link port a packet is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port(u8);

impl Port {
    /// Reservoir configuration traffic
    pub const RESERVOIR: Port = Port(RESERVOIR_PORT);

    /// Create a port, returns None if it doesn't fit in 4 bits
    pub fn new(port: u8) -> Option<Self> {
        (port <= 0x0F).then_some(Port(port))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// A routed packet: destination port, channel and raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    port: Port,
    channel: u8,
    payload: Bytes,
}

impl Packet {
    /// Create a packet on channel 0
    pub fn new(port: Port, payload: impl Into<Bytes>) -> Self {
        Self {
            port,
            channel: 0,
            payload: payload.into(),
        }
    }

    /// Create a reservoir packet carrying an encoded command
    pub fn reservoir(command: &Command) -> Self {
        Self::new(Port::RESERVOIR, command.to_payload())
    }

    /// Set the link channel (masked to 2 bits)
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel & 0x03;
        self
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Header byte packing port and channel
    pub fn header(&self) -> u8 {
        ((self.port.0 & 0x0F) << 4) | LINK_BITS | (self.channel & 0x03)
    }

    /// Frame the packet for the wire: header byte followed by the payload
    pub fn to_frame(&self) -> SinkResult<Bytes> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(SinkError::PayloadTooLarge(
                self.payload.len(),
                MAX_PAYLOAD_SIZE,
            ));
        }

        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.header());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// Parse a wire frame back into a packet
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let (&header, payload) = frame.split_first()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return None;
        }

        Some(Self {
            port: Port(header >> 4),
            channel: header & 0x03,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range() {
        assert_eq!(Port::new(0x0F).map(Port::value), Some(0x0F));
        assert!(Port::new(0x10).is_none());
        assert_eq!(Port::RESERVOIR.value(), RESERVOIR_PORT);
    }

    #[test]
    fn test_header_byte() {
        let packet = Packet::new(Port::RESERVOIR, vec![0x04]);
        assert_eq!(packet.header(), 0x9C);

        let packet = packet.with_channel(0x07);
        assert_eq!(packet.channel(), 0x03);
        assert_eq!(packet.header(), 0x9F);
    }

    #[test]
    fn test_reservoir_packet() {
        let packet = Packet::reservoir(&Command::ComputeChecksum);
        assert_eq!(packet.port(), Port::RESERVOIR);
        assert_eq!(packet.channel(), 0);
        assert_eq!(&packet.payload()[..], &[0x04]);
    }

    #[test]
    fn test_frame_roundtrip() {
        let packet = Packet::reservoir(&Command::AllocReservoir {
            reservoir: 2,
            size: 10,
            connectivity: 300,
        });
        let frame = packet.to_frame().unwrap();
        assert_eq!(&frame[..], &[0x9C, 0x00, 0x02, 0x0A, 0x2C, 0x01]);

        let parsed = Packet::from_frame(&frame).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let packet = Packet::new(Port::RESERVOIR, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            packet.to_frame(),
            Err(SinkError::PayloadTooLarge(31, 30))
        ));
        assert!(Packet::from_frame(&[0x9C; 32]).is_none());
        assert!(Packet::from_frame(&[]).is_none());
    }
}
