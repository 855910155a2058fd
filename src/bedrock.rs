//! The Bedrock/Pocket/Education edition probe: a RakNet Unconnected Ping
//! answered by an Unconnected Pong whose ID string is a semicolon-joined
//! status line.

use crate::motd;
use crate::probe::{connect_udp, udp_exchange, unrecognized, ProbeError};
use crate::status::{Edition, SlpProtocol, StatusRecord};
use bytes::Buf;
use chrono::Utc;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::instrument;

/// RakNet's offline-message magic, present in every unconnected packet.
const RAKNET_MAGIC: [u8; 16] = [
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56,
    0x78,
];

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1C;
/// Fixed client GUID; the server echoes status regardless.
const CLIENT_GUID: i64 = 0x02;

#[instrument(skip(timeout))]
pub async fn probe_bedrock(
    addr: SocketAddr,
    timeout: Duration,
) -> Result<StatusRecord, ProbeError> {
    let socket = connect_udp(addr, timeout).await?;

    let mut ping = Vec::with_capacity(33);
    ping.push(UNCONNECTED_PING);
    ping.extend_from_slice(&Utc::now().timestamp_millis().to_le_bytes());
    ping.extend_from_slice(&RAKNET_MAGIC);
    ping.extend_from_slice(&CLIENT_GUID.to_le_bytes());

    let (reply, latency) = udp_exchange(&socket, &ping, timeout).await?;
    let id_string = parse_pong(&reply).map_err(|err| err.with_latency(latency))?;
    parse_id_string(&id_string, addr, latency).map_err(|err| err.with_latency(latency))
}

/// Unconnected Pong: packet id, server time, server GUID, magic, then the
/// ID string with a length prefix that is read to end in practice.
fn parse_pong(reply: &[u8]) -> Result<String, ProbeError> {
    if reply.len() < 35 {
        return Err(unrecognized(format!("pong too short ({} bytes)", reply.len())));
    }
    let mut buf = reply;

    let packet_id = buf.get_u8();
    if packet_id != UNCONNECTED_PONG {
        return Err(unrecognized(format!(
            "expected pong 0x1C, got 0x{packet_id:02X}"
        )));
    }
    let _server_time = buf.get_i64_le();
    let _server_guid = buf.get_i64_le();

    let mut magic = [0u8; 16];
    buf.copy_to_slice(&mut magic);
    if magic != RAKNET_MAGIC {
        return Err(unrecognized("offline-message magic mismatch"));
    }

    let _id_len = buf.get_i16();
    String::from_utf8(buf.chunk().to_vec())
        .map_err(|_| unrecognized("ID string is not UTF-8"))
}

/// The ID string fields, in order: edition, MOTD line 1, protocol version,
/// version, player count, player cap, server UID, MOTD line 2, gamemode,
/// numeric gamemode, IPv4 port, IPv6 port. Older servers truncate the
/// tail.
fn parse_id_string(
    id_string: &str,
    addr: SocketAddr,
    latency: u32,
) -> Result<StatusRecord, ProbeError> {
    let mut fields = id_string.split(';');
    let mut next_required = |what: &str| {
        fields
            .next()
            .ok_or_else(|| unrecognized(format!("ID string is missing {what}")))
            .map(str::to_string)
    };

    let edition = next_required("the edition")?;
    let motd_line_1 = next_required("the MOTD")?;
    let protocol_version = next_required("the protocol version")?
        .parse::<i32>()
        .map_err(|_| unrecognized("non-numeric protocol version"))?;
    let version = next_required("the version")?;
    let current_players = next_required("the player count")?
        .parse::<i32>()
        .map_err(|_| unrecognized("non-numeric player count"))?;
    let max_players = next_required("the player cap")?
        .parse::<i32>()
        .map_err(|_| unrecognized("non-numeric player cap"))?;

    let mut record = StatusRecord::online(
        &addr.ip().to_string(),
        addr.port(),
        SlpProtocol::BedrockRaknet,
    );
    record.latency_ms = Some(latency);
    record.edition = Some(Edition::from(edition));
    record.stripped_motd = Some(motd::strip_codes(&motd_line_1));
    record.motd = Some(motd_line_1);
    record.protocol_version = Some(protocol_version);
    record.version = Some(version);
    record.current_players = Some(current_players);
    record.max_players = Some(max_players);

    let _server_uid = fields.next();
    // the second MOTD line doubles as the world name; old servers omit it
    record.map = fields.next().map(str::to_string);
    record.gamemode = fields.next().map(str::to_string);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnStatus;

    fn test_addr() -> SocketAddr {
        "203.0.113.5:19132".parse().unwrap()
    }

    #[test]
    fn parses_full_id_string() {
        let record = parse_id_string(
            "MCPE;A Server;390;1.17.2;2;10;1234;;Survival;1;19132;19133",
            test_addr(),
            6,
        )
        .unwrap();
        assert_eq!(record.edition, Some(Edition::Mcpe));
        assert_eq!(record.motd.as_deref(), Some("A Server"));
        assert_eq!(record.protocol_version, Some(390));
        assert_eq!(record.version.as_deref(), Some("1.17.2"));
        assert_eq!(record.current_players, Some(2));
        assert_eq!(record.max_players, Some(10));
        assert_eq!(record.map.as_deref(), Some(""));
        assert_eq!(record.gamemode.as_deref(), Some("Survival"));
        assert_eq!(record.slp_protocol, Some(SlpProtocol::BedrockRaknet));
        assert_eq!(record.latency_ms, Some(6));
    }

    #[test]
    fn tolerates_truncated_id_string() {
        let record =
            parse_id_string("MCEE;Old School;134;1.0;0;20", test_addr(), 0).unwrap();
        assert_eq!(record.edition, Some(Edition::Mcee));
        assert!(record.map.is_none());
        assert!(record.gamemode.is_none());
    }

    #[test]
    fn rejects_short_id_string() {
        let err = parse_id_string("MCPE;motd", test_addr(), 0).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }

    #[test]
    fn pong_roundtrip() {
        let mut reply = vec![UNCONNECTED_PONG];
        reply.extend_from_slice(&12345i64.to_le_bytes());
        reply.extend_from_slice(&777i64.to_le_bytes());
        reply.extend_from_slice(&RAKNET_MAGIC);
        let id = b"MCPE;Hi;390;1.17.2;0;10";
        reply.extend_from_slice(&(id.len() as i16).to_be_bytes());
        reply.extend_from_slice(id);
        assert_eq!(parse_pong(&reply).unwrap(), "MCPE;Hi;390;1.17.2;0;10");
    }

    #[test]
    fn pong_rejects_wrong_packet_id() {
        let mut reply = vec![0x1D];
        reply.extend_from_slice(&[0u8; 40]);
        let err = parse_pong(&reply).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }

    #[test]
    fn pong_rejects_bad_magic() {
        let mut reply = vec![UNCONNECTED_PONG];
        reply.extend_from_slice(&[0u8; 16]); // time + guid
        reply.extend_from_slice(&[0xAAu8; 16]); // not the magic
        reply.extend_from_slice(&0i16.to_be_bytes());
        let err = parse_pong(&reply).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }
}
