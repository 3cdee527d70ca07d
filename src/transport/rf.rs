//! Simulated RF lane transport. Real OFDM waveform generation is a
//! collaborator's concern (spec.md §1); this uses QUIC as a real, lossy,
//! backoff-capable async transport standing in for the radio-modem link,
//! the same substitution the reference engine made for its own network
//! layer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use quinn::{Connection, Endpoint, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::error::{Result, TransportError};
use super::traits::{Frame, LaneQuality, Outcome, RfLane};

pub struct QuicRfLane {
    endpoint: Endpoint,
    connections: DashMap<u32, Connection>,
    lane_quality: DashMap<u32, LaneQuality>,
}

impl QuicRfLane {
    pub async fn new(bind_addr: SocketAddr) -> Result<Self> {
        let (endpoint, _cert_der) = Self::make_server_endpoint(bind_addr)?;
        Ok(Self {
            endpoint,
            connections: DashMap::new(),
            lane_quality: DashMap::new(),
        })
    }

    fn make_server_endpoint(bind_addr: SocketAddr) -> Result<(Endpoint, Vec<u8>)> {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| TransportError::CertificateError(e.to_string()))?;
        let cert_der = cert.cert.der().to_vec();
        let priv_key = rustls::pki_types::PrivateKeyDer::try_from(cert.key_pair.serialize_der())
            .map_err(|e| TransportError::CertificateError(e.to_string()))?;

        let mut server_config = ServerConfig::with_single_cert(
            vec![rustls::pki_types::CertificateDer::from(cert_der.clone())],
            priv_key,
        )
        .map_err(|e| TransportError::CertificateError(e.to_string()))?;

        if let Some(transport_config) = Arc::get_mut(&mut server_config.transport) {
            transport_config
                .max_concurrent_uni_streams(64_u32.into())
                .max_idle_timeout(Some(Duration::from_secs(60).try_into().unwrap()));
        }

        let endpoint = Endpoint::server(server_config, bind_addr)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok((endpoint, cert_der))
    }

    /// Binds a data lane to a connection carrying its simulated signal.
    pub fn bind_lane(&self, subcarrier_id: u32, connection: Connection) {
        self.connections.insert(subcarrier_id, connection);
    }

    pub fn observe_quality(&self, subcarrier_id: u32, quality: LaneQuality) {
        self.lane_quality.insert(subcarrier_id, quality);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint.local_addr().map_err(TransportError::Io)
    }
}

#[async_trait]
impl RfLane for QuicRfLane {
    async fn send(&self, subcarrier_id: u32, bytes: Bytes, deadline: Duration) -> Result<Outcome> {
        let connection = self
            .connections
            .get(&subcarrier_id)
            .ok_or(TransportError::LaneUnreachable(subcarrier_id))?
            .clone();

        let attempt = async {
            let mut stream = connection
                .open_uni()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            stream
                .write_all(&bytes)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            stream.finish().map_err(|e| TransportError::SendFailed(e.to_string()))?;
            Ok::<(), TransportError>(())
        };

        match tokio::time::timeout(deadline, attempt).await {
            Ok(Ok(())) => Ok(Outcome::Delivered),
            Ok(Err(_)) => Ok(Outcome::Failed),
            Err(_) => Ok(Outcome::TimedOut),
        }
    }

    async fn recv(&self) -> Result<Frame> {
        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| TransportError::ConnectionFailed("endpoint closed".into()))?;
        let connection = incoming.await.map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let mut stream = connection
            .accept_uni()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        let mut buf = BytesMut::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(Some(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(None) => break,
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            }
        }
        Ok(Frame { bytes: buf.freeze() })
    }

    fn quality(&self, subcarrier_id: u32) -> Result<LaneQuality> {
        self.lane_quality
            .get(&subcarrier_id)
            .map(|q| *q)
            .ok_or(TransportError::LaneUnreachable(subcarrier_id))
    }
}
