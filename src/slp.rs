//! The modern (1.7+) server-list-ping: a handshake and an empty status
//! request over TCP, answered with a length-prefixed JSON document.

use crate::motd::Motd;
use crate::probe::{connect_tcp, timed, timed_io, unrecognized, ProbeError};
use crate::status::{SlpProtocol, StatusRecord};
use crate::wire;
use serde::Deserialize;
use serde_json::Value;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{instrument, trace};

/// The protocol-version VarInt sent in the handshake: `DD C7 01`, which
/// decodes to 25565. Sending the default port number as the version is a
/// widely-used interoperability placeholder for "just tell me your status".
const HANDSHAKE_PROTOCOL: u32 = 25565;

/// Wire shape of the JSON status reply. Servers omit fields freely.
#[derive(Debug, Deserialize)]
struct JsonStatus {
    version: Option<JsonVersion>,
    players: Option<JsonPlayers>,
    description: Option<Value>,
    favicon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonVersion {
    name: Option<String>,
    protocol: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct JsonPlayers {
    max: Option<i32>,
    online: Option<i32>,
    sample: Option<Vec<JsonPlayer>>,
}

#[derive(Debug, Deserialize)]
struct JsonPlayer {
    name: Option<String>,
}

#[instrument(skip(timeout, refer))]
pub async fn probe_json(
    addr: SocketAddr,
    refer: &str,
    timeout: Duration,
) -> Result<StatusRecord, ProbeError> {
    let (mut stream, latency) = connect_tcp(addr, timeout).await?;

    // everything past the connect has a latency to report on failure
    let payload = status_exchange(&mut stream, refer, addr.port(), timeout)
        .await
        .map_err(|err| err.with_latency(latency))?;
    parse_json_payload(payload.as_bytes(), addr, latency)
        .map_err(|err| err.with_latency(latency))
}

/// Sends the handshake and the empty status request, then reads the
/// framed JSON reply off the wire.
async fn status_exchange(
    stream: &mut TcpStream,
    refer: &str,
    port: u16,
    timeout: Duration,
) -> Result<String, ProbeError> {
    let handshake = handshake_packet(refer, port).map_err(ProbeError::from_wire)?;
    timed_io(timeout, stream.write_all(&handshake)).await?;
    // an empty status request: length 1, packet id 0x00
    timed_io(timeout, stream.write_all(&[0x01, 0x00])).await?;

    let packet_len = timed(timeout, wire::read_varint_stream(stream)).await?;
    if packet_len < 3 {
        return Err(unrecognized(format!("implausible packet length {packet_len}")));
    }
    let body = timed(timeout, wire::read_exact_bytes(stream, packet_len as usize)).await?;
    trace!("received {} byte status packet", body.len());

    let mut cursor = Cursor::new(body.as_slice());
    let packet_id = wire::read_varint(&mut cursor).map_err(ProbeError::from_wire)?;
    if packet_id != 0 {
        return Err(unrecognized(format!("expected packet id 0, got {packet_id}")));
    }
    wire::decode_varint_string(&mut cursor).map_err(ProbeError::from_wire)
}

/// Handshake packet: id 0x00, protocol placeholder, the hostname the
/// server was reached by, the dialed port, and next-state 1 (status). The
/// whole packet is VarInt-length prefixed.
fn handshake_packet(refer: &str, port: u16) -> Result<Vec<u8>, wire::WireError> {
    let mut body = vec![0x00];
    wire::write_varint(&mut body, HANDSHAKE_PROTOCOL);
    body.extend_from_slice(&wire::encode_varint_string(refer)?);
    body.extend_from_slice(&port.to_be_bytes());
    wire::write_varint(&mut body, 1);

    let mut packet = Vec::with_capacity(body.len() + 5);
    wire::write_varint(&mut packet, body.len() as u32);
    packet.extend_from_slice(&body);
    Ok(packet)
}

fn parse_json_payload(
    payload: &[u8],
    addr: SocketAddr,
    latency: u32,
) -> Result<StatusRecord, ProbeError> {
    let status: JsonStatus = serde_json::from_slice(payload)
        .map_err(|err| unrecognized(format!("status payload is not JSON: {err}")))?;

    let mut record = StatusRecord::online(&addr.ip().to_string(), addr.port(), SlpProtocol::Json);
    record.latency_ms = Some(latency);

    if let Some(version) = status.version {
        record.version = version.name;
        record.protocol_version = Some(version.protocol.unwrap_or(-1));
    } else {
        record.protocol_version = Some(-1);
    }

    // the description is either a bare string (kept verbatim) or a chat
    // component tree (re-serialized into `motd`, decoded for the strip)
    let description = status.description.unwrap_or(Value::String(String::new()));
    record.motd = Some(match &description {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
    record.stripped_motd = Some(Motd::from_value(&description).strip());

    if let Some(players) = status.players {
        record.max_players = Some(players.max.unwrap_or(-1));
        record.current_players = Some(players.online.unwrap_or(-1));
        if let Some(sample) = players.sample {
            record.player_list =
                Some(sample.into_iter().filter_map(|player| player.name).collect());
        }
    } else {
        record.max_players = Some(-1);
        record.current_players = Some(-1);
    }

    if let Some(favicon) = status.favicon {
        record.favicon = favicon
            .split_once("base64,")
            .and_then(|(_, data)| base64::decode(data).ok());
        record.favicon_b64 = Some(favicon);
    }

    Ok(record)
}
