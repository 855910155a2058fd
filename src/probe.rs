//! Plumbing shared by every protocol probe: socket setup with the right
//! address family, per-operation deadlines, latency capture, and the
//! mapping from transport errors to a [`ConnStatus`].

use crate::status::{ConnStatus, ProbeFailure};
use crate::wire::WireError;
use snafu::{Backtrace, GenerateImplicitData, ResultExt, Snafu};
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Snafu)]
pub enum ProbeError {
    /// No TCP/UDP association could be established.
    #[snafu(display("connection failed: {source}"))]
    ConnFail {
        source: io::Error,
        latency_ms: Option<u32>,
        backtrace: Backtrace,
    },
    /// Connected or sent, but nothing came back in time.
    #[snafu(display("no reply within {}ms", limit.as_millis()))]
    Timeout {
        limit: Duration,
        latency_ms: Option<u32>,
        backtrace: Backtrace,
    },
    /// A reply arrived but was not the protocol being spoken.
    #[snafu(display("unrecognized reply: {detail}"))]
    Unrecognized {
        detail: String,
        latency_ms: Option<u32>,
        backtrace: Backtrace,
    },
}

impl ProbeError {
    pub fn status(&self) -> ConnStatus {
        match self {
            ProbeError::ConnFail { .. } => ConnStatus::ConnFail,
            ProbeError::Timeout { .. } => ConnStatus::Timeout,
            ProbeError::Unrecognized { .. } => ConnStatus::Unknown,
        }
    }

    /// The wall-clock measured before the failure: connect time for TCP,
    /// send-to-reply for UDP. Absent when no association was made.
    pub fn latency_ms(&self) -> Option<u32> {
        match self {
            ProbeError::ConnFail { latency_ms, .. }
            | ProbeError::Timeout { latency_ms, .. }
            | ProbeError::Unrecognized { latency_ms, .. } => *latency_ms,
        }
    }

    /// The failure as the orchestrator reports it.
    pub fn failure(&self) -> ProbeFailure {
        ProbeFailure {
            status: self.status(),
            latency_ms: self.latency_ms(),
        }
    }

    /// Stamps the latency measured before this error arose. Probes call
    /// this on every failure path reached after a connect completed or a
    /// reply arrived.
    pub(crate) fn with_latency(mut self, latency: u32) -> Self {
        match &mut self {
            ProbeError::ConnFail { latency_ms, .. }
            | ProbeError::Timeout { latency_ms, .. }
            | ProbeError::Unrecognized { latency_ms, .. } => *latency_ms = Some(latency),
        }
        self
    }

    /// A peer that resets or truncates the exchange spoke *something*, just
    /// not our protocol; every other transport error means unreachable.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => ProbeError::Unrecognized {
                detail: err.to_string(),
                latency_ms: None,
                backtrace: Backtrace::generate(),
            },
            _ => ProbeError::ConnFail {
                source: err,
                latency_ms: None,
                backtrace: Backtrace::generate(),
            },
        }
    }

    pub(crate) fn from_wire(err: WireError) -> Self {
        match err {
            WireError::Io { source, .. } => ProbeError::from_io(source),
            other => ProbeError::Unrecognized {
                detail: other.to_string(),
                latency_ms: None,
                backtrace: Backtrace::generate(),
            },
        }
    }
}

pub(crate) fn unrecognized(detail: impl Into<String>) -> ProbeError {
    ProbeError::Unrecognized {
        detail: detail.into(),
        latency_ms: None,
        backtrace: Backtrace::generate(),
    }
}

/// Parses a resolved IP literal into a dialable address.
pub(crate) fn socket_addr(ip: &str, port: u16) -> Result<SocketAddr, ProbeError> {
    let ip = ip
        .parse::<IpAddr>()
        .map_err(|err| {
            ProbeError::from_io(io::Error::new(io::ErrorKind::InvalidInput, err))
        })?;
    Ok(SocketAddr::new(ip, port))
}

/// Connects over TCP within `limit`, returning the stream and the connect
/// wall-clock in milliseconds.
pub(crate) async fn connect_tcp(
    addr: SocketAddr,
    limit: Duration,
) -> Result<(TcpStream, u32), ProbeError> {
    let started = Instant::now();
    let stream = match time::timeout(limit, TcpStream::connect(addr)).await {
        Ok(connected) => connected.context(ConnFailSnafu { latency_ms: None })?,
        Err(_) => {
            return TimeoutSnafu {
                limit,
                latency_ms: None,
            }
            .fail()
        }
    };
    Ok((stream, started.elapsed().as_millis() as u32))
}

/// Binds a UDP socket of `addr`'s family and associates it with the peer.
pub(crate) async fn connect_udp(addr: SocketAddr, _limit: Duration) -> Result<UdpSocket, ProbeError> {
    let bind_addr = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .context(ConnFailSnafu { latency_ms: None })?;
    socket
        .connect(addr)
        .await
        .context(ConnFailSnafu { latency_ms: None })?;
    Ok(socket)
}

/// Sends one datagram and waits for the first reply, returning the payload
/// and the send-to-reply wall-clock in milliseconds.
pub(crate) async fn udp_exchange(
    socket: &UdpSocket,
    payload: &[u8],
    limit: Duration,
) -> Result<(Vec<u8>, u32), ProbeError> {
    let started = Instant::now();
    socket.send(payload).await.map_err(ProbeError::from_io)?;

    let mut buf = vec![0u8; 4096];
    let len = match time::timeout(limit, socket.recv(&mut buf)).await {
        Ok(received) => received.map_err(ProbeError::from_io)?,
        Err(_) => {
            return TimeoutSnafu {
                limit,
                latency_ms: None,
            }
            .fail()
        }
    };
    buf.truncate(len);
    Ok((buf, started.elapsed().as_millis() as u32))
}

/// Applies a deadline to one read/write step of a TCP exchange.
pub(crate) async fn timed<T, F>(limit: Duration, op: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, WireError>>,
{
    match time::timeout(limit, op).await {
        Ok(result) => result.map_err(ProbeError::from_wire),
        Err(_) => TimeoutSnafu {
            limit,
            latency_ms: None,
        }
        .fail(),
    }
}

/// Deadline wrapper for raw io futures (writes, flushes).
pub(crate) async fn timed_io<T, F>(limit: Duration, op: F) -> Result<T, ProbeError>
where
    F: Future<Output = io::Result<T>>,
{
    match time::timeout(limit, op).await {
        Ok(result) => result.map_err(ProbeError::from_io),
        Err(_) => TimeoutSnafu {
            limit,
            latency_ms: None,
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_classify_by_kind() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(ProbeError::from_io(reset).status(), ConnStatus::Unknown);

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(ProbeError::from_io(refused).status(), ConnStatus::ConnFail);
    }

    #[test]
    fn failures_keep_the_measured_latency() {
        let err = unrecognized("garbage reply");
        assert_eq!(err.latency_ms(), None);

        let stamped = err.with_latency(12);
        assert_eq!(stamped.latency_ms(), Some(12));

        let failure = stamped.failure();
        assert_eq!(failure.status, ConnStatus::Unknown);
        assert_eq!(failure.latency_ms, Some(12));
    }

    #[tokio::test]
    async fn connect_tcp_reports_closed_ports_as_connfail() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_tcp(addr, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.status(), ConnStatus::ConnFail);
    }

    #[tokio::test]
    async fn udp_exchange_times_out_without_a_peer() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let socket = connect_udp(addr, Duration::from_millis(100)).await.unwrap();
        let err = udp_exchange(&socket, &[0x00], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err.status(),
            ConnStatus::Timeout | ConnStatus::ConnFail
        ));
    }
}
