//! In-process sink backed by a bounded channel
//!
//! Lets an async transport task own the link while callers dispatch
//! synchronously.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{Packet, PacketSink, SinkError, SinkResult};

/// Sink that forwards packets into a bounded mpsc channel
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: mpsc::Sender<Packet>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Packet>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Check if the receiving side is still alive
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PacketSink for ChannelSink {
    fn send_packet(&self, packet: Packet) -> SinkResult<()> {
        self.sender.try_send(packet).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Backpressure,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::transport::Port;

    #[tokio::test]
    async fn test_packets_arrive_in_order() {
        let (sink, mut rx) = ChannelSink::channel(8);

        sink.send_packet(Packet::reservoir(&Command::ComputeChecksum))
            .unwrap();
        sink.send_packet(Packet::new(Port::RESERVOIR, vec![0x00, 1, 2, 3, 0]))
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(&first.payload()[..], &[0x04]);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload().len(), 5);
    }

    #[test]
    fn test_full_channel_reports_backpressure() {
        let (sink, _rx) = ChannelSink::channel(1);

        sink.send_packet(Packet::reservoir(&Command::ComputeChecksum))
            .unwrap();
        let err = sink
            .send_packet(Packet::reservoir(&Command::ComputeChecksum))
            .unwrap_err();
        assert!(matches!(err, SinkError::Backpressure));
    }

    #[test]
    fn test_dropped_receiver_reports_closed() {
        let (sink, rx) = ChannelSink::channel(4);
        drop(rx);

        assert!(sink.is_closed());
        let err = sink
            .send_packet(Packet::reservoir(&Command::ComputeChecksum))
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }
}
