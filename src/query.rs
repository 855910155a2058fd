//! The GameSpy4 / UT3 "Query" protocol: a UDP challenge handshake followed
//! by a full-stat request. Servers only answer when `enable-query=true` is
//! set, but the reply is the richest of the Java protocols (plugins, map,
//! full player list).

use crate::motd;
use crate::probe::{connect_udp, udp_exchange, unrecognized, ProbeError};
use crate::status::{SlpProtocol, StatusRecord};
use crate::wire;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{instrument, trace};

const QUERY_MAGIC: [u8; 2] = [0xFE, 0xFD];
const PACKET_TYPE_HANDSHAKE: u8 = 0x09;
const PACKET_TYPE_STAT: u8 = 0x00;
/// Marker between the key/value section and the player list.
const PLAYER_SECTION: &[u8] = b"\x00\x00\x01player_\x00\x00";

#[instrument(skip(timeout))]
pub async fn probe_query(addr: SocketAddr, timeout: Duration) -> Result<StatusRecord, ProbeError> {
    let socket = connect_udp(addr, timeout).await?;

    let session_id = (rand::random::<u32>() & 0x0F0F_0F0F) as i32;

    let mut handshake = Vec::with_capacity(7);
    handshake.extend_from_slice(&QUERY_MAGIC);
    handshake.push(PACKET_TYPE_HANDSHAKE);
    handshake.extend_from_slice(&session_id.to_be_bytes());

    let (challenge_reply, latency) = udp_exchange(&socket, &handshake, timeout).await?;
    let challenge = parse_challenge(&challenge_reply).map_err(|err| err.with_latency(latency))?;
    trace!("challenge token {challenge}");

    let mut request = Vec::with_capacity(15);
    request.extend_from_slice(&QUERY_MAGIC);
    request.push(PACKET_TYPE_STAT);
    request.extend_from_slice(&session_id.to_be_bytes());
    request.extend_from_slice(&challenge.to_be_bytes());
    // four bytes of padding distinguish a full stat from a basic stat
    request.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let (payload, _) = udp_exchange(&socket, &request, timeout)
        .await
        .map_err(|err| err.with_latency(latency))?;
    parse_fullstat(&payload, addr, latency).map_err(|err| err.with_latency(latency))
}

/// The challenge token: ASCII decimal digits at offset 5 of the handshake
/// reply, NUL padded.
fn parse_challenge(reply: &[u8]) -> Result<i32, ProbeError> {
    let token = reply
        .get(5..)
        .ok_or_else(|| unrecognized("handshake reply too short"))?;
    std::str::from_utf8(token)
        .ok()
        .map(|s| s.trim_end_matches('\0'))
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| unrecognized("challenge token is not a number"))
}

fn parse_fullstat(
    payload: &[u8],
    addr: SocketAddr,
    latency: u32,
) -> Result<StatusRecord, ProbeError> {
    let body = payload
        .get(11..)
        .ok_or_else(|| unrecognized("stat reply too short"))?;

    let split_at = body
        .windows(PLAYER_SECTION.len())
        .position(|window| window == PLAYER_SECTION)
        .ok_or_else(|| unrecognized("stat reply has no player section"))?;
    let raw_stats = &body[..split_at];
    let raw_players = &body[split_at + PLAYER_SECTION.len()..];

    // key/value pairs, NUL separated, after two bytes of padding
    let items: Vec<&[u8]> = raw_stats.split(|&byte| byte == 0).skip(2).collect();
    let mut stats: HashMap<String, &[u8]> = HashMap::new();
    for pair in items.chunks_exact(2) {
        let key = std::str::from_utf8(pair[0])
            .map_err(|_| unrecognized("stat key is not UTF-8"))?;
        stats.insert(key.to_string(), pair[1]);
    }

    let mut record = StatusRecord::online(&addr.ip().to_string(), addr.port(), SlpProtocol::Query);
    record.latency_ms = Some(latency);

    // the MOTD is called "hostname" here; basic-stat replies say "MOTD"
    if let Some(raw) = stats.get("hostname").or_else(|| stats.get("MOTD")) {
        let text = wire::decode_latin1(raw);
        record.stripped_motd = Some(motd::strip_codes(&text));
        record.motd = Some(text);
    }

    if let Some(raw) = stats.get("version") {
        record.version = Some(decode_utf8(raw)?);
    }

    if let Some(raw) = stats.get("plugins") {
        let raw_plugins = decode_utf8(raw)?;
        if !raw_plugins.is_empty() {
            let mut plugins: Vec<String> =
                raw_plugins.split(" ;").map(str::to_string).collect();
            // the first entry may lead with the server software,
            // e.g. "Paper on 1.19.3: SomePlugin 7.3"
            if let Some((software, first)) = plugins[0]
                .split_once(": ")
                .map(|(a, b)| (a.to_string(), b.to_string()))
            {
                record.version = Some(software);
                plugins[0] = first;
            }
            record.plugins = Some(plugins);
        }
    }

    if let Some(raw) = stats.get("map") {
        record.map = Some(decode_utf8(raw)?);
    }

    if let Some(raw) = stats.get("numplayers") {
        record.current_players = Some(decode_count(raw, "numplayers")?);
        let max = stats
            .get("maxplayers")
            .ok_or_else(|| unrecognized("numplayers without maxplayers"))?;
        record.max_players = Some(decode_count(max, "maxplayers")?);
    }

    // player names, NUL separated; the reply ends with two empty splits
    // that are dropped along with any empty names
    let players: Vec<&[u8]> = raw_players.split(|&byte| byte == 0).collect();
    let kept = players.len().saturating_sub(2);
    let mut names = Vec::new();
    for name in &players[..kept] {
        if !name.is_empty() {
            names.push(decode_utf8(name)?);
        }
    }
    record.player_list = Some(names);

    Ok(record)
}

fn decode_utf8(raw: &[u8]) -> Result<String, ProbeError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| unrecognized("stat value is not UTF-8"))
}

fn decode_count(raw: &[u8], what: &str) -> Result<i32, ProbeError> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| unrecognized(format!("non-numeric {what}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnStatus;

    fn test_addr() -> SocketAddr {
        "203.0.113.5:25565".parse().unwrap()
    }

    fn fullstat_fixture() -> Vec<u8> {
        let mut payload = vec![0u8; 11]; // header the parser skips
        payload.extend_from_slice(b"\x00\x00"); // padding before the k/v area
        for (key, value) in [
            ("hostname", "A Minecraft Server".as_bytes()),
            ("gametype", b"SMP"),
            ("version", b"1.19.3"),
            ("plugins", b"Paper on 1.19.3: WorldEdit 7.2 ;EssentialsX 2.19"),
            ("map", b"world"),
            ("numplayers", b"2"),
            ("maxplayers", b"20"),
        ] {
            payload.extend_from_slice(key.as_bytes());
            payload.push(0);
            payload.extend_from_slice(value);
            payload.push(0);
        }
        // the final value's NUL merges into the section marker
        payload.truncate(payload.len() - 1);
        payload.extend_from_slice(PLAYER_SECTION);
        payload.extend_from_slice(b"Alice\x00Bob\x00\x00");
        payload
    }

    #[test]
    fn parses_fullstat_reply() {
        let record = parse_fullstat(&fullstat_fixture(), test_addr(), 4).unwrap();
        assert_eq!(record.motd.as_deref(), Some("A Minecraft Server"));
        assert_eq!(record.version.as_deref(), Some("Paper on 1.19.3"));
        assert_eq!(
            record.plugins,
            Some(vec![
                "WorldEdit 7.2".to_string(),
                "EssentialsX 2.19".to_string()
            ])
        );
        assert_eq!(record.map.as_deref(), Some("world"));
        assert_eq!(record.current_players, Some(2));
        assert_eq!(record.max_players, Some(20));
        assert_eq!(
            record.player_list,
            Some(vec!["Alice".to_string(), "Bob".to_string()])
        );
        assert_eq!(record.slp_protocol, Some(SlpProtocol::Query));
    }

    #[test]
    fn motd_decodes_as_latin1() {
        let mut payload = vec![0u8; 11];
        payload.extend_from_slice(b"\x00\x00hostname\x00");
        payload.extend_from_slice(&[0xA7, b'6', b'g', b'o', b'l', b'd']);
        payload.extend_from_slice(PLAYER_SECTION);
        payload.extend_from_slice(b"\x00\x00");
        let record = parse_fullstat(&payload, test_addr(), 0).unwrap();
        assert_eq!(record.motd.as_deref(), Some("§6gold"));
        assert_eq!(record.stripped_motd.as_deref(), Some("gold"));
    }

    #[test]
    fn trailing_player_splits_are_dropped() {
        let mut payload = vec![0u8; 11];
        payload.extend_from_slice(b"\x00\x00version\x001.0");
        payload.extend_from_slice(PLAYER_SECTION);
        payload.extend_from_slice(b"Solo\x00\x00");
        let record = parse_fullstat(&payload, test_addr(), 0).unwrap();
        assert_eq!(record.player_list, Some(vec!["Solo".to_string()]));
    }

    #[test]
    fn missing_player_section_is_unrecognized() {
        let err = parse_fullstat(&[0u8; 32], test_addr(), 0).unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }

    #[test]
    fn parses_challenge_token() {
        let mut reply = vec![0x09, 0, 0, 0, 0];
        reply.extend_from_slice(b"9513307\x00");
        assert_eq!(parse_challenge(&reply).unwrap(), 9_513_307);
    }

    #[test]
    fn rejects_garbage_challenge() {
        let err = parse_challenge(b"\x09\x00\x00\x00\x00not-a-number\x00").unwrap_err();
        assert_eq!(err.status(), ConnStatus::Unknown);
    }
}
