use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{DnsError, Result};
use crate::message::DnsMessage;

/// Where query messages go. The resolver only sees this trait, so tests
/// can swap the network for scripted responses.
#[async_trait]
pub trait DnsDataSource: Send + Sync {
    /// Send one query to one server and return its decoded response.
    async fn query(&self, message: &DnsMessage, server: SocketAddr) -> Result<DnsMessage>;

    /// The EDNS payload size this source can receive over UDP.
    fn udp_payload_size(&self) -> u16 {
        1232
    }
}

/// The real network: UDP first, falling back to TCP when the response comes
/// back truncated.
pub struct UdpTcpDataSource {
    timeout: Duration,
    udp_payload_size: u16,
}

impl UdpTcpDataSource {
    pub fn new(timeout: Duration, udp_payload_size: u16) -> Self {
        UdpTcpDataSource {
            timeout,
            udp_payload_size,
        }
    }

    async fn query_udp(&self, wire: &[u8], server: SocketAddr) -> Result<DnsMessage> {
        let bind_addr = if server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(wire).await?;

        let mut buf = vec![0u8; self.udp_payload_size.max(512) as usize];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| DnsError::Timeout(server))??;
        trace!(%server, len, "received UDP response");
        DnsMessage::decode(&buf[..len])
    }

    async fn query_tcp(&self, wire: &[u8], server: SocketAddr) -> Result<DnsMessage> {
        let mut stream = timeout(self.timeout, TcpStream::connect(server))
            .await
            .map_err(|_| DnsError::Timeout(server))??;

        // DNS over TCP prefixes each message with its 16-bit length.
        let mut framed = Vec::with_capacity(wire.len() + 2);
        framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
        framed.extend_from_slice(wire);
        stream.write_all(&framed).await?;

        let response = timeout(self.timeout, async {
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let len = u16::from_be_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        })
        .await
        .map_err(|_| DnsError::Timeout(server))??;

        trace!(%server, len = response.len(), "received TCP response");
        DnsMessage::decode(&response)
    }
}

#[async_trait]
impl DnsDataSource for UdpTcpDataSource {
    async fn query(&self, message: &DnsMessage, server: SocketAddr) -> Result<DnsMessage> {
        let wire = message.encode();

        let mut response = self.query_udp(&wire, server).await?;
        if response.id != message.id {
            debug!(%server, "response id mismatch, discarding");
            return Err(DnsError::Io("response id mismatch".into()));
        }
        if response.truncated {
            debug!(%server, "truncated UDP response, retrying over TCP");
            response = self.query_tcp(&wire, server).await?;
            if response.id != message.id {
                return Err(DnsError::Io("response id mismatch".into()));
            }
        }
        response.received_at = Some(Instant::now());
        Ok(response)
    }

    fn udp_payload_size(&self) -> u16 {
        self.udp_payload_size
    }
}
