//! The pre-1.7 status protocols: Beta (one request byte), Legacy (two),
//! and Extended Legacy (the 1.6 plugin-message ping). All three share the
//! same reply framing: a `0xFF` kick packet carrying a UTF-16BE payload
//! prefixed with its length in characters.

use crate::motd;
use crate::probe::{connect_tcp, timed, timed_io, unrecognized, ProbeError};
use crate::status::{SlpProtocol, StatusRecord};
use crate::wire;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::instrument;

/// Minecraft Beta 1.8 to Release 1.3. The reply carries only the MOTD and
/// player counts, `§`-delimited.
#[instrument(skip(timeout))]
pub async fn probe_beta(addr: SocketAddr, timeout: Duration) -> Result<StatusRecord, ProbeError> {
    let (payload, latency) = exchange(addr, &[0xFE], timeout).await?;
    parse_beta(&payload, addr, latency).map_err(|err| err.with_latency(latency))
}

/// Minecraft 1.4 and 1.5, the first protocol reporting a server version.
#[instrument(skip(timeout))]
pub async fn probe_legacy(addr: SocketAddr, timeout: Duration) -> Result<StatusRecord, ProbeError> {
    let (payload, latency) = exchange(addr, &[0xFE, 0x01], timeout).await?;
    parse_delimited(&payload, addr, latency, SlpProtocol::Legacy)
        .map_err(|err| err.with_latency(latency))
}

/// Minecraft 1.6. Modern servers still answer this probe.
#[instrument(skip(timeout, refer))]
pub async fn probe_extended_legacy(
    addr: SocketAddr,
    refer: &str,
    timeout: Duration,
) -> Result<StatusRecord, ProbeError> {
    let request = extended_request(refer, addr.port());
    let (payload, latency) = exchange(addr, &request, timeout).await?;
    parse_delimited(&payload, addr, latency, SlpProtocol::ExtendedLegacy)
        .map_err(|err| err.with_latency(latency))
}

/// The 1.6 ping: a plugin-message framed `MC|PingHost` carrying protocol
/// version 0x49 (1.6.2), the dialed hostname, and the port.
fn extended_request(refer: &str, port: u16) -> Vec<u8> {
    let refer_units = refer.encode_utf16().count() as i16;

    let mut request = vec![0xFE, 0x01, 0xFA, 0x00, 0x0B];
    request.extend_from_slice(&wire::encode_utf16be("MC|PingHost"));
    request.extend_from_slice(&(7 + 2 * refer_units).to_be_bytes());
    request.push(0x49);
    request.extend_from_slice(&refer_units.to_be_bytes());
    request.extend_from_slice(&wire::encode_utf16be(refer));
    request.extend_from_slice(&i32::from(port).to_be_bytes());
    request
}

/// Connects, sends `request`, and reads the kick-packet reply down to its
/// decoded UTF-16 payload. Returns the payload and the connect latency;
/// failures past the connect carry that latency too.
async fn exchange(
    addr: SocketAddr,
    request: &[u8],
    timeout: Duration,
) -> Result<(String, u32), ProbeError> {
    let (mut stream, latency) = connect_tcp(addr, timeout).await?;
    timed_io(timeout, stream.write_all(request))
        .await
        .map_err(|err| err.with_latency(latency))?;

    let payload = read_kick_payload(&mut stream, timeout)
        .await
        .map_err(|err| err.with_latency(latency))?;
    Ok((payload, latency))
}

async fn read_kick_payload(
    stream: &mut TcpStream,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let header = timed(timeout, wire::read_exact_bytes(stream, 3)).await?;
    if header[0] != 0xFF {
        return Err(unrecognized(format!(
            "expected kick packet 0xFF, got 0x{:02X}",
            header[0]
        )));
    }

    // length is in UTF-16 characters, not bytes
    let content_len = i16::from_be_bytes([header[1], header[2]]);
    if content_len < 3 {
        return Err(unrecognized(format!("implausible payload length {content_len}")));
    }

    let raw = timed(
        timeout,
        wire::read_exact_bytes(stream, content_len as usize * 2),
    )
    .await?;
    wire::decode_utf16be(&raw).map_err(ProbeError::from_wire)
}

/// Legacy and Extended Legacy replies: six NUL-delimited fields.
fn parse_delimited(
    payload: &str,
    addr: SocketAddr,
    latency: u32,
    protocol: SlpProtocol,
) -> Result<StatusRecord, ProbeError> {
    let fields: Vec<&str> = payload.split('\0').collect();
    if fields.len() != 6 {
        return Err(unrecognized(format!(
            "expected 6 fields, got {}",
            fields.len()
        )));
    }

    let parse_count = |field: &str, what: &str| {
        field
            .parse::<i32>()
            .map_err(|_| unrecognized(format!("non-numeric {what} `{field}`")))
    };

    let mut record = StatusRecord::online(&addr.ip().to_string(), addr.port(), protocol);
    record.protocol_version = Some(if fields[1].is_empty() {
        0
    } else {
        parse_count(fields[1], "protocol version")?
    });
    record.version = Some(fields[2].to_string());
    record.motd = Some(fields[3].to_string());
    record.stripped_motd = Some(motd::strip_codes(fields[3]));
    record.current_players = Some(parse_count(fields[4], "player count")?);
    record.max_players = Some(parse_count(fields[5], "player cap")?);
    record.latency_ms = Some(latency);
    Ok(record)
}

/// Beta replies: `§`-delimited, at least three parts. The MOTD may itself
/// contain `§`, so everything before the last two parts is rejoined.
fn parse_beta(
    payload: &str,
    addr: SocketAddr,
    latency: u32,
) -> Result<StatusRecord, ProbeError> {
    let parts: Vec<&str> = payload.split('§').collect();
    if parts.len() < 3 {
        return Err(unrecognized(format!(
            "expected 3 parts, got {}",
            parts.len()
        )));
    }

    let max_players = parts[parts.len() - 1]
        .parse::<i32>()
        .map_err(|_| unrecognized("non-numeric player cap"))?;
    let current_players = parts[parts.len() - 2]
        .parse::<i32>()
        .map_err(|_| unrecognized("non-numeric player count"))?;
    let motd_text = parts[..parts.len() - 2].join("§");

    let mut record = StatusRecord::online(&addr.ip().to_string(), addr.port(), SlpProtocol::Beta);
    record.motd = Some(motd_text.clone());
    record.stripped_motd = Some(motd::strip_codes(&motd_text));
    record.current_players = Some(current_players);
    record.max_players = Some(max_players);
    // this protocol predates version reporting
    record.version = Some(">=1.8b/1.3".to_string());
    record.latency_ms = Some(latency);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnStatus;

    fn test_addr() -> SocketAddr {
        "203.0.113.5:25565".parse().unwrap()
    }

    #[test]
    fn parses_legacy_reply_fields() {
        let payload = "§1\x0047\x001.4.7\x00A MOTD\x005\x0020";
        let record = parse_delimited(payload, test_addr(), 12, SlpProtocol::Legacy).unwrap();
        assert_eq!(record.protocol_version, Some(47));
        assert_eq!(record.version.as_deref(), Some("1.4.7"));
        assert_eq!(record.motd.as_deref(), Some("A MOTD"));
        assert_eq!(record.current_players, Some(5));
        assert_eq!(record.max_players, Some(20));
        assert_eq!(record.slp_protocol, Some(SlpProtocol::Legacy));
        assert!(record.online);
        assert_eq!(record.latency_ms, Some(12));
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse_delimited("only\x00two", test_addr(), 0, SlpProtocol::Legacy).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }

    #[test]
    fn empty_protocol_field_reads_as_zero() {
        let payload = "§1\x00\x001.4.7\x00motd\x001\x002";
        let record = parse_delimited(payload, test_addr(), 0, SlpProtocol::Legacy).unwrap();
        assert_eq!(record.protocol_version, Some(0));
    }

    #[test]
    fn parses_beta_reply_and_rejoins_motd() {
        let record = parse_beta("A §cMOTD§14§20", test_addr(), 3).unwrap();
        assert_eq!(record.motd.as_deref(), Some("A §cMOTD"));
        assert_eq!(record.stripped_motd.as_deref(), Some("A MOTD"));
        assert_eq!(record.current_players, Some(14));
        assert_eq!(record.max_players, Some(20));
        assert_eq!(record.version.as_deref(), Some(">=1.8b/1.3"));
        assert_eq!(record.slp_protocol, Some(SlpProtocol::Beta));
    }

    #[test]
    fn beta_rejects_error_messages() {
        let err = parse_beta("Protocol error", test_addr(), 0).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }

    #[test]
    fn extended_request_layout_is_exact() {
        let request = extended_request("mc", 25565);
        let mut expected = vec![0xFE, 0x01, 0xFA, 0x00, 0x0B];
        expected.extend_from_slice(&wire::encode_utf16be("MC|PingHost"));
        expected.extend_from_slice(&(7i16 + 4).to_be_bytes()); // 7 + 2*len
        expected.push(0x49);
        expected.extend_from_slice(&2i16.to_be_bytes());
        expected.extend_from_slice(&[0x00, b'm', 0x00, b'c']);
        expected.extend_from_slice(&25565i32.to_be_bytes());
        assert_eq!(request, expected);
    }
}
