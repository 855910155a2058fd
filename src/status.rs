use serde::Serialize;
use std::fmt;

/// Default TCP port for Java-edition status queries.
pub const DEFAULT_JAVA_PORT: u16 = 25565;
/// Default UDP port of an IPv4 Bedrock server.
pub const DEFAULT_BEDROCK_PORT_V4: u16 = 19132;
/// Default UDP port of an IPv6 Bedrock server.
pub const DEFAULT_BEDROCK_PORT_V6: u16 = 19133;

/// The wire protocols a server may answer a status probe on.
///
/// The Java protocols are listed oldest first; see
/// [`crate::check::probe_java`] for why the probing order matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SlpProtocol {
    /// Minecraft Beta 1.8 to Release 1.3. MOTD and player counts only.
    Beta,
    /// Minecraft 1.4 and 1.5, the first protocol carrying a server version.
    Legacy,
    /// Minecraft 1.6; modern servers still answer it.
    ExtendedLegacy,
    /// Minecraft 1.7+, JSON payloads.
    Json,
    /// GameSpy4 / UT3 "Query"; must be enabled in server.properties.
    Query,
    /// Bedrock / Pocket / Education edition, RakNet Unconnected Ping.
    BedrockRaknet,
}

impl fmt::Display for SlpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlpProtocol::Beta => "BETA",
            SlpProtocol::Legacy => "LEGACY",
            SlpProtocol::ExtendedLegacy => "EXTENDED_LEGACY",
            SlpProtocol::Json => "JSON",
            SlpProtocol::Query => "QUERY",
            SlpProtocol::BedrockRaknet => "BEDROCK_RAKNET",
        })
    }
}

/// What the caller wants probed: one specific protocol, or the full
/// fallback chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolChoice {
    All,
    Single(SlpProtocol),
}

/// Terminal state of one probe attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConnStatus {
    /// The request and response both parsed; a record was produced.
    Success,
    /// No TCP/UDP association could be established. Server offline, or
    /// wrong host/port.
    ConnFail,
    /// Connected or sent, but no reply within the deadline.
    Timeout,
    /// A reply arrived but its framing or payload did not match the
    /// protocol being attempted.
    Unknown,
}

impl fmt::Display for ConnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnStatus::Success => "SUCCESS",
            ConnStatus::ConnFail => "CONNFAIL",
            ConnStatus::Timeout => "TIMEOUT",
            ConnStatus::Unknown => "UNKNOWN",
        })
    }
}

/// Why a probe produced no record, plus the wall-clock measured before
/// the failure when a connect completed or a reply arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProbeFailure {
    pub status: ConnStatus,
    pub latency_ms: Option<u32>,
}

/// Bedrock server edition, from the first field of the pong payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Edition {
    /// Pocket edition, "MCPE".
    Mcpe,
    /// Education edition, "MCEE".
    Mcee,
    /// An edition string this crate does not know about.
    Other(String),
}

impl From<String> for Edition {
    fn from(edition: String) -> Self {
        match edition.to_lowercase().as_str() {
            "mcpe" => Edition::Mcpe,
            "mcee" => Edition::Mcee,
            _ => Edition::Other(edition),
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edition::Mcpe => f.write_str("MCPE"),
            Edition::Mcee => f.write_str("MCEE"),
            Edition::Other(s) => f.write_str(s),
        }
    }
}

/// Normalized status of one server endpoint, as produced by a probe.
///
/// Immutable once returned. `online` is `true` exactly when
/// `connection_status` is [`ConnStatus::Success`], and `slp_protocol` is
/// present exactly when `online`.
#[derive(Clone, Debug, Serialize)]
pub struct StatusRecord {
    /// The address that was dialed (an IP literal after resolution).
    pub address: String,
    /// The port that was dialed.
    pub port: u16,
    pub online: bool,
    pub connection_status: ConnStatus,
    pub slp_protocol: Option<SlpProtocol>,
    pub protocol_version: Option<i32>,
    pub version: Option<String>,
    /// MOTD exactly as the server sent it, formatting codes or JSON intact.
    pub motd: Option<String>,
    /// MOTD with all formatting removed.
    pub stripped_motd: Option<String>,
    pub current_players: Option<i32>,
    pub max_players: Option<i32>,
    /// Player sample. May be empty even when `current_players` is positive.
    pub player_list: Option<Vec<String>>,
    /// World name; Query and Bedrock only.
    pub map: Option<String>,
    /// Bedrock only.
    pub gamemode: Option<String>,
    /// Bedrock only.
    pub edition: Option<Edition>,
    /// Query only.
    pub plugins: Option<Vec<String>>,
    /// The favicon data URI exactly as sent.
    pub favicon_b64: Option<String>,
    /// Decoded favicon image bytes.
    #[serde(skip)]
    pub favicon: Option<Vec<u8>>,
    pub latency_ms: Option<u32>,
}

impl StatusRecord {
    /// A blank online record for `protocol`; probes fill in what their
    /// payload carries.
    pub fn online(address: &str, port: u16, protocol: SlpProtocol) -> Self {
        Self {
            address: address.to_string(),
            port,
            online: true,
            connection_status: ConnStatus::Success,
            slp_protocol: Some(protocol),
            protocol_version: None,
            version: None,
            motd: None,
            stripped_motd: None,
            current_players: None,
            max_players: None,
            player_list: None,
            map: None,
            gamemode: None,
            edition: None,
            plugins: None,
            favicon_b64: None,
            favicon: None,
            latency_ms: None,
        }
    }
}
