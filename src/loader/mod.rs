//! Loader module - Encodes reservoir commands and dispatches them
//!
//! `ReservoirLoader` is stateless: every call encodes one command into one
//! packet and hands it to the configured sink. `UploadSequencer` sits on top
//! and enforces the order the device expects.

mod sequencer;

pub use sequencer::*;

use thiserror::Error;

use crate::protocol::{CodecError, Command, Opcode};
use crate::transport::{Packet, PacketSink, SinkError};

/// Loader errors
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("No packet sink configured")]
    NoSink,

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("{op} not allowed while {state}")]
    OutOfOrder { state: UploadState, op: Opcode },

    #[error("Reservoir {0} has not been allocated")]
    UnknownReservoir(u8),

    #[error("Neuron {neuron} out of range for reservoir {reservoir} (size: {size})")]
    NeuronOutOfRange { reservoir: u8, neuron: u8, size: u8 },

    #[error("Pair {pair} out of range for reservoir {reservoir} (connectivity: {connectivity})")]
    PairOutOfRange {
        reservoir: u8,
        pair: u16,
        connectivity: u16,
    },

    #[error("Reservoir {0} is already allocated")]
    AlreadyAllocated(u8),
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Encodes reservoir commands and hands each one to a packet sink
///
/// The loader does not own the link. `S` is usually a reference or an
/// `Arc` to a sink owned by the transport layer.
#[derive(Debug)]
pub struct ReservoirLoader<S> {
    sink: Option<S>,
}

impl<S> Default for ReservoirLoader<S> {
    fn default() -> Self {
        Self { sink: None }
    }
}

impl<S: PacketSink> ReservoirLoader<S> {
    /// Create a loader dispatching to `sink`
    pub fn new(sink: S) -> Self {
        Self { sink: Some(sink) }
    }

    /// Create a loader with no sink; every operation fails until one is attached
    pub fn detached() -> Self {
        Self::default()
    }

    /// Attach a sink, returning the previous one
    pub fn attach(&mut self, sink: S) -> Option<S> {
        self.sink.replace(sink)
    }

    /// Detach the current sink
    pub fn detach(&mut self) -> Option<S> {
        self.sink.take()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Encode a command and dispatch it as exactly one packet
    pub fn send(&self, command: &Command) -> LoaderResult<()> {
        let sink = self.sink.as_ref().ok_or(LoaderError::NoSink)?;

        tracing::trace!("Dispatching {}", command);
        sink.send_packet(Packet::reservoir(command))?;
        Ok(())
    }

    pub fn alloc_reservoir(&self, reservoir: u8, size: u8, connectivity: u16) -> LoaderResult<()> {
        self.send(&Command::AllocReservoir {
            reservoir,
            size,
            connectivity,
        })
    }

    pub fn set_input_weight(
        &self,
        reservoir: u8,
        input: u8,
        neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.send(&Command::SetInputWeight {
            reservoir,
            input,
            neuron,
            weight,
        })
    }

    pub fn append_internal_weight(
        &self,
        reservoir: u8,
        pair: u16,
        out_neuron: u8,
        in_neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.send(&Command::AppendInternalWeight {
            reservoir,
            pair,
            out_neuron,
            in_neuron,
            weight,
        })
    }

    pub fn set_output_weight(
        &self,
        reservoir: u8,
        output: u8,
        neuron: u8,
        weight: f32,
    ) -> LoaderResult<()> {
        self.send(&Command::SetOutputWeight {
            reservoir,
            output,
            neuron,
            weight,
        })
    }

    pub fn compute_checksum(&self) -> LoaderResult<()> {
        self.send(&Command::ComputeChecksum)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::{Port, SinkResult};
    use std::sync::{Arc, Mutex};
    use tokio_test::{assert_err, assert_ok};

    /// Sink that keeps every packet it is handed
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) packets: Mutex<Vec<Packet>>,
    }

    impl RecordingSink {
        pub(crate) fn payloads(&self) -> Vec<Vec<u8>> {
            self.packets
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.payload().to_vec())
                .collect()
        }

        pub(crate) fn len(&self) -> usize {
            self.packets.lock().unwrap().len()
        }
    }

    impl PacketSink for RecordingSink {
        fn send_packet(&self, packet: Packet) -> SinkResult<()> {
            self.packets.lock().unwrap().push(packet);
            Ok(())
        }
    }

    struct FailingSink;

    impl PacketSink for FailingSink {
        fn send_packet(&self, _packet: Packet) -> SinkResult<()> {
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "link down",
            )))
        }
    }

    #[test]
    fn test_alloc_scenario() {
        let sink = RecordingSink::default();
        let loader = ReservoirLoader::new(&sink);

        assert_ok!(loader.alloc_reservoir(2, 10, 300));
        assert_eq!(sink.payloads(), vec![vec![0x00, 0x02, 0x0A, 0x2C, 0x01]]);
    }

    #[test]
    fn test_every_operation_sends_one_reservoir_packet() {
        let sink = Arc::new(RecordingSink::default());
        let loader = ReservoirLoader::new(sink.clone());

        loader.alloc_reservoir(0, 4, 8).unwrap();
        assert_eq!(sink.len(), 1);
        loader.set_input_weight(0, 0, 1, 0.25).unwrap();
        assert_eq!(sink.len(), 2);
        loader.append_internal_weight(0, 0, 1, 2, 0.75).unwrap();
        assert_eq!(sink.len(), 3);
        loader.set_output_weight(0, 0, 3, -0.5).unwrap();
        assert_eq!(sink.len(), 4);
        loader.compute_checksum().unwrap();
        assert_eq!(sink.len(), 5);

        let packets = sink.packets.lock().unwrap();
        let lengths: Vec<usize> = packets.iter().map(|p| p.payload().len()).collect();
        assert_eq!(lengths, vec![5, 8, 10, 8, 1]);
        for (opcode, packet) in packets.iter().enumerate() {
            assert_eq!(packet.port(), Port::RESERVOIR);
            assert_eq!(packet.payload()[0], opcode as u8);
        }
    }

    #[test]
    fn test_scenario_payloads() {
        let sink = RecordingSink::default();
        let loader = ReservoirLoader::new(&sink);

        loader.set_output_weight(1, 0, 5, 0.5).unwrap();
        loader.append_internal_weight(0, 1000, 3, 7, -1.0).unwrap();
        loader.compute_checksum().unwrap();

        assert_eq!(
            sink.payloads(),
            vec![
                vec![0x03, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x3F],
                vec![0x02, 0x00, 0xE8, 0x03, 0x03, 0x07, 0x00, 0x00, 0x80, 0xBF],
                vec![0x04],
            ]
        );
    }

    #[test]
    fn test_non_finite_weights_packed_as_is() {
        let sink = RecordingSink::default();
        let loader = ReservoirLoader::new(&sink);

        loader.set_input_weight(0, 0, 0, f32::NAN).unwrap();
        loader.set_input_weight(0, 0, 0, f32::INFINITY).unwrap();

        let payloads = sink.payloads();
        let nan: [u8; 4] = payloads[0][4..].try_into().unwrap();
        assert_eq!(f32::from_le_bytes(nan).to_bits(), f32::NAN.to_bits());
        assert_eq!(&payloads[1][4..], &f32::INFINITY.to_le_bytes());
    }

    #[test]
    fn test_no_sink_is_an_error() {
        let loader: ReservoirLoader<&RecordingSink> = ReservoirLoader::detached();

        assert!(!loader.has_sink());
        assert!(matches!(
            loader.compute_checksum(),
            Err(LoaderError::NoSink)
        ));
        assert!(matches!(
            loader.alloc_reservoir(0, 1, 1),
            Err(LoaderError::NoSink)
        ));
    }

    #[test]
    fn test_attach_and_detach() {
        let sink = RecordingSink::default();
        let mut loader = ReservoirLoader::detached();

        assert!(loader.attach(&sink).is_none());
        assert_ok!(loader.compute_checksum());
        assert!(loader.detach().is_some());
        assert_err!(loader.compute_checksum());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_sink_errors_propagate() {
        let loader = ReservoirLoader::new(FailingSink);

        match loader.compute_checksum() {
            Err(LoaderError::Sink(SinkError::Io(e))) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_loader_shared_across_threads() {
        let sink = Arc::new(RecordingSink::default());
        let loader = Arc::new(ReservoirLoader::new(sink.clone()));

        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let loader = loader.clone();
                std::thread::spawn(move || {
                    for n in 0..10u8 {
                        loader.set_input_weight(i, 0, n, f32::from(n)).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.len(), 40);
    }
}
