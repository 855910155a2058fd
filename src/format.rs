//! Turns a [`StatusRecord`] into frontend output: a structured record for
//! an HTML-template renderer (mode 0), a localized text block with the
//! favicon attached (mode 1), or the text block alone (mode 2).

use crate::lang::{self, LabelMap};
use crate::motd;
use crate::status::{SlpProtocol, StatusRecord};
use serde::Serialize;

/// Placeholder image name the HTML template falls back to.
const NO_FAVICON: &str = "no_favicon.png";

/// Output atoms a chat frontend can forward as-is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Image(Vec<u8>),
}

/// What a render produced: template data, or chat messages.
#[derive(Debug)]
pub enum Rendered {
    Template(RenderData),
    Chat(Vec<Message>),
}

/// The record handed to the HTML-template collaborator, with MOTD,
/// version, and player sample already rendered to HTML.
#[derive(Debug, Serialize)]
pub struct RenderData {
    pub favicon: String,
    pub version: String,
    pub slp_protocol: String,
    pub protocol_version: Option<i32>,
    pub address: String,
    pub ip: String,
    pub port: u16,
    pub delay: String,
    pub gamemode: Option<String>,
    pub motd: String,
    pub players: String,
    pub player_list: Option<String>,
    pub lang: LabelMap,
    #[serde(rename = "VERSION")]
    pub crate_version: String,
}

/// Renders `record` in the given output mode. `queried_address` is the
/// host part of the user's input, shown alongside the resolved IP.
pub fn render(record: &StatusRecord, queried_address: &str, mode: u8) -> Rendered {
    match mode {
        0 => Rendered::Template(render_data(record, queried_address)),
        1 => Rendered::Chat(chat_messages(record, queried_address, true)),
        _ => Rendered::Chat(chat_messages(record, queried_address, false)),
    }
}

pub fn render_data(record: &StatusRecord, queried_address: &str) -> RenderData {
    RenderData {
        favicon: match (&record.favicon, &record.favicon_b64) {
            (Some(_), Some(data_uri)) => data_uri.clone(),
            _ => NO_FAVICON.to_string(),
        },
        version: motd::html_from_str(record.version.as_deref().unwrap_or_default()),
        slp_protocol: protocol_name(record),
        protocol_version: record.protocol_version,
        address: queried_address.to_string(),
        ip: record.address.clone(),
        port: record.port,
        delay: format!("{}ms", record.latency_ms.unwrap_or_default()),
        gamemode: record.gamemode.clone(),
        motd: motd::html_from_str(record.motd.as_deref().unwrap_or_default()),
        players: players_line(record),
        player_list: record
            .player_list
            .as_ref()
            .filter(|names| !names.is_empty())
            .map(|names| motd::html_from_str(&names.join("§r, "))),
        lang: lang::labels(),
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub fn chat_messages(
    record: &StatusRecord,
    queried_address: &str,
    with_favicon: bool,
) -> Vec<Message> {
    let labels = lang::labels();
    let get = |key: &str| labels.get(key).cloned().unwrap_or_default();

    let mut text = String::new();
    text.push_str(&format!(
        "\n{}{}",
        get("version"),
        record.version.as_deref().unwrap_or("-")
    ));
    text.push_str(&format!("\n{}{}", get("slp_protocol"), protocol_name(record)));
    text.push_str(&format!(
        "\n{}{}",
        get("protocol_version"),
        record
            .protocol_version
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    text.push_str(&format!("\n{}{}", get("address"), queried_address));
    text.push_str(&format!("\n{}{}", get("ip"), record.address));
    text.push_str(&format!("\n{}{}", get("port"), record.port));
    text.push_str(&format!(
        "\n{}{}ms",
        get("delay"),
        record.latency_ms.unwrap_or_default()
    ));

    if record.slp_protocol == Some(SlpProtocol::BedrockRaknet) {
        text.push_str(&format!(
            "\n{}{}",
            get("gamemode"),
            record.gamemode.as_deref().unwrap_or("-")
        ));
    }

    text.push_str(&format!(
        "\n{}{}",
        get("motd"),
        record.stripped_motd.as_deref().unwrap_or_default()
    ));
    text.push_str(&format!("\n{}{}", get("players"), players_line(record)));

    if let Some(names) = record.player_list.as_ref().filter(|names| !names.is_empty()) {
        text.push_str(&format!("\n{}{}", get("player_list"), names.join(", ")));
    }

    let mut messages = vec![Message::Text(text)];
    if with_favicon {
        if let Some(bytes) = &record.favicon {
            messages.push(Message::Text("\nFavicon:".to_string()));
            messages.push(Message::Image(bytes.clone()));
        }
    }
    messages
}

fn protocol_name(record: &StatusRecord) -> String {
    record
        .slp_protocol
        .map(|protocol| protocol.to_string())
        .unwrap_or_default()
}

fn players_line(record: &StatusRecord) -> String {
    format!(
        "{}/{}",
        record.current_players.unwrap_or_default(),
        record.max_players.unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ConnStatus;

    fn sample_record() -> StatusRecord {
        let mut record = StatusRecord::online("203.0.113.5", 25565, SlpProtocol::Json);
        record.version = Some("1.20.4".to_string());
        record.protocol_version = Some(765);
        record.motd = Some("§aWelcome".to_string());
        record.stripped_motd = Some("Welcome".to_string());
        record.current_players = Some(3);
        record.max_players = Some(20);
        record.player_list = Some(vec!["Alice".to_string(), "Bob".to_string()]);
        record.latency_ms = Some(42);
        record.favicon_b64 = Some("data:image/png;base64,AAAA".to_string());
        record.favicon = Some(vec![0, 0, 0]);
        record
    }

    #[test]
    fn template_data_prerenders_html() {
        let _guard = lang::test_support::locale_lock();
        lang::init_language("en");
        let data = render_data(&sample_record(), "mc.example.com");
        assert_eq!(data.favicon, "data:image/png;base64,AAAA");
        assert_eq!(data.motd, "<span style=\"color:#00AA00;\">Welcome</span>");
        assert_eq!(data.players, "3/20");
        assert_eq!(data.address, "mc.example.com");
        assert_eq!(data.ip, "203.0.113.5");
        assert_eq!(data.delay, "42ms");
        // the sample is joined with a reset so names render unstyled
        assert_eq!(data.player_list.as_deref(), Some("Alice, Bob"));
        assert!(data.lang.contains_key("motd"));
        lang::init_language("zh-cn");
    }

    #[test]
    fn template_data_uses_placeholder_without_favicon() {
        let mut record = sample_record();
        record.favicon = None;
        record.favicon_b64 = None;
        assert_eq!(render_data(&record, "x").favicon, NO_FAVICON);
    }

    #[test]
    fn chat_block_lists_fields_in_order() {
        let _guard = lang::test_support::locale_lock();
        lang::init_language("en");
        let messages = chat_messages(&sample_record(), "mc.example.com", true);
        assert_eq!(messages.len(), 3);
        let Message::Text(text) = &messages[0] else {
            panic!("expected text first");
        };
        assert!(text.contains("Version: 1.20.4"));
        assert!(text.contains("SLP protocol: JSON"));
        assert!(text.contains("Address: mc.example.com"));
        assert!(text.contains("IP: 203.0.113.5"));
        assert!(text.contains("Delay: 42ms"));
        assert!(text.contains("MOTD: Welcome"));
        assert!(text.contains("Players: 3/20"));
        assert!(text.contains("Player list: Alice, Bob"));
        // JSON records carry no gamemode line
        assert!(!text.contains("Gamemode"));
        assert_eq!(messages[1], Message::Text("\nFavicon:".to_string()));
        assert_eq!(messages[2], Message::Image(vec![0, 0, 0]));
        lang::init_language("zh-cn");
    }

    #[test]
    fn mode_two_never_attaches_images() {
        let Rendered::Chat(messages) = render(&sample_record(), "x", 2) else {
            panic!("expected chat render");
        };
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn bedrock_records_show_gamemode() {
        let mut record = StatusRecord::online("203.0.113.5", 19132, SlpProtocol::BedrockRaknet);
        record.gamemode = Some("Survival".to_string());
        record.connection_status = ConnStatus::Success;
        let _guard = lang::test_support::locale_lock();
        lang::init_language("en");
        let messages = chat_messages(&record, "play.example.com", false);
        let Message::Text(text) = &messages[0] else {
            panic!("expected text");
        };
        assert!(text.contains("Gamemode: Survival"));
        lang::init_language("zh-cn");
    }
}
