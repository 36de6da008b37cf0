//! UDP sink for radio bridges and device simulators
//!
//! Each packet is sent as one datagram holding the link frame.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Packet, PacketSink, SinkResult};

/// Datagram counters
#[derive(Debug, Default)]
pub struct SinkStats {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SinkStats {
    /// Packets handed to the socket
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Frame bytes handed to the socket, headers included
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    fn record(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }
}

/// Sink writing link frames to a connected UDP socket
///
/// The socket is kept in blocking mode so `send_packet` never reports
/// `WouldBlock`. A datagram send only waits for kernel buffer space.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
    stats: SinkStats,
}

impl UdpSink {
    /// Bind a local socket and connect it to the link endpoint
    pub async fn connect(bind: SocketAddr, target: SocketAddr) -> std::io::Result<Self> {
        let socket = tokio::net::UdpSocket::bind(bind).await?;
        socket.connect(target).await?;

        let socket = socket.into_std()?;
        socket.set_nonblocking(false)?;

        tracing::debug!("UDP sink {} -> {}", socket.local_addr()?, target);

        Ok(Self {
            socket,
            target,
            stats: SinkStats::default(),
        })
    }

    /// Connect to a link endpoint by hostname
    pub async fn connect_host(bind: SocketAddr, host: &str, port: u16) -> std::io::Result<Self> {
        let target = resolve_host(host, port).await?;
        Self::connect(bind, target).await
    }

    /// Connect to a `host`, `host:port` or socket address target
    pub async fn connect_target(
        bind: SocketAddr,
        target: &str,
        default_port: u16,
    ) -> std::io::Result<Self> {
        let target = resolve_target(target, default_port).await?;
        Self::connect(bind, target).await
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }
}

impl PacketSink for UdpSink {
    fn send_packet(&self, packet: Packet) -> SinkResult<()> {
        let frame = packet.to_frame()?;
        let sent = self.socket.send(&frame)?;
        self.stats.record(sent);

        tracing::trace!(
            "Sent {} byte frame to {} (port {}, channel {})",
            sent,
            self.target,
            packet.port(),
            packet.channel()
        );

        Ok(())
    }
}

/// Split a `host` or `host:port` target, falling back to `default_port`
pub fn split_host_port(target: &str, default_port: u16) -> std::io::Result<(&str, u16)> {
    let invalid = || {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid link target: {}", target),
        )
    };

    match target.rsplit_once(':') {
        // Bare IPv6 addresses are handled by the caller
        Some((host, port)) if !host.contains(':') => {
            if host.is_empty() {
                return Err(invalid());
            }
            let port = port.parse().map_err(|_| invalid())?;
            Ok((host, port))
        }
        Some(_) => Err(invalid()),
        None if target.is_empty() => Err(invalid()),
        None => Ok((target, default_port)),
    }
}

/// Resolve a link target given as a socket address, an IP, `host` or `host:port`
pub async fn resolve_target(target: &str, default_port: u16) -> std::io::Result<SocketAddr> {
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    let (host, port) = split_host_port(target, default_port)?;
    resolve_host(host, port).await
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;
    use crate::transport::SinkError;
    use tokio::net::UdpSocket;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_udp_sink_sends_frame() {
        let device = UdpSocket::bind(loopback()).await.unwrap();
        let sink = UdpSink::connect(loopback(), device.local_addr().unwrap())
            .await
            .unwrap();

        let packet = Packet::reservoir(&Command::SetOutputWeight {
            reservoir: 1,
            output: 0,
            neuron: 5,
            weight: 0.5,
        });
        sink.send_packet(packet).unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, sink.local_addr().unwrap());
        assert_eq!(
            &buf[..n],
            &[0x9C, 0x03, 0x01, 0x00, 0x05, 0x00, 0x00, 0x00, 0x3F]
        );

        assert_eq!(sink.stats().packets_sent(), 1);
        assert_eq!(sink.stats().bytes_sent(), 9);
    }

    #[tokio::test]
    async fn test_udp_sink_rejects_oversized() {
        let device = UdpSocket::bind(loopback()).await.unwrap();
        let sink = UdpSink::connect(loopback(), device.local_addr().unwrap())
            .await
            .unwrap();

        let packet = Packet::new(crate::transport::Port::RESERVOIR, vec![0u8; 40]);
        let err = sink.send_packet(packet).unwrap_err();
        assert!(matches!(err, SinkError::PayloadTooLarge(40, _)));
        assert_eq!(sink.stats().packets_sent(), 0);
    }

    async fn send_right_after_connect(rounds: usize) {
        let device = UdpSocket::bind(loopback()).await.unwrap();
        let target = device.local_addr().unwrap();

        for _ in 0..rounds {
            let sink = UdpSink::connect(loopback(), target).await.unwrap();
            assert!(sink.send_packet(Packet::reservoir(&Command::ComputeChecksum)).is_ok());

            let mut buf = [0u8; 64];
            let (n, _) = device.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &[0x9C, 0x04]);
            assert_eq!(sink.stats().packets_sent(), 1);
        }
    }

    #[tokio::test]
    async fn test_send_immediately_after_connect() {
        send_right_after_connect(50).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_send_immediately_after_connect_multi_thread() {
        send_right_after_connect(200).await;
    }

    #[tokio::test]
    async fn test_connect_target_literal() {
        let device = UdpSocket::bind(loopback()).await.unwrap();
        let target = device.local_addr().unwrap().to_string();

        let sink = UdpSink::connect_target(loopback(), &target, 1).await.unwrap();
        assert_eq!(sink.target(), device.local_addr().unwrap());
        sink.send_packet(Packet::reservoir(&Command::ComputeChecksum))
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, _) = device.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x9C, 0x04]);
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("localhost:2000", 19950).unwrap(),
            ("localhost", 2000)
        );
        assert_eq!(
            split_host_port("radio-bridge.local:2000", 19950).unwrap(),
            ("radio-bridge.local", 2000)
        );
        assert_eq!(
            split_host_port("radio-bridge.local", 19950).unwrap(),
            ("radio-bridge.local", 19950)
        );
        assert!(split_host_port("localhost:notaport", 19950).is_err());
        assert!(split_host_port("localhost:70000", 19950).is_err());
        assert!(split_host_port(":2000", 19950).is_err());
        assert!(split_host_port("", 19950).is_err());
    }

    #[tokio::test]
    async fn test_resolve_target_forms() {
        assert_eq!(
            resolve_target("127.0.0.1:2000", 19950).await.unwrap(),
            "127.0.0.1:2000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("127.0.0.1", 19950).await.unwrap(),
            "127.0.0.1:19950".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("[::1]:2000", 19950).await.unwrap(),
            "[::1]:2000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolve_target("::1", 19950).await.unwrap(),
            "[::1]:19950".parse::<SocketAddr>().unwrap()
        );
        assert!(resolve_target("localhost:bad", 19950).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let addr = resolve_host("127.0.0.1", 2000).await.unwrap();
        assert_eq!(addr, "127.0.0.1:2000".parse::<SocketAddr>().unwrap());
    }
}
