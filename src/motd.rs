//! MOTD decoding.
//!
//! Servers send their display line either as a raw string sprinkled with
//! legacy `§x` formatting codes, or as a JSON chat-component tree. Both
//! shapes decode to a plain string (formatting removed) and to an HTML
//! fragment with inline colors and styles.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;

lazy_static! {
    static ref FORMAT_CODE: Regex = Regex::new("§.").expect("valid pattern");
}

/// A chat-component tree as found in the `description` field of a modern
/// SLP response. Components nest through `extra`, and servers freely mix
/// bare strings, objects, and arrays at any level.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Component {
    Text(String),
    Node(Node),
    List(Vec<Component>),
    Other(Value),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub extra: Vec<Component>,
}

/// A server MOTD in either of its two wire shapes.
#[derive(Clone, Debug)]
pub enum Motd {
    Raw(String),
    Component(Component),
}

impl Motd {
    /// Classifies a JSON `description` value. Strings stay raw; anything
    /// else is treated as a component tree.
    pub fn from_value(value: &Value) -> Motd {
        match value {
            Value::String(s) => Motd::Raw(s.clone()),
            other => match serde_json::from_value::<Component>(other.clone()) {
                Ok(component) => Motd::Component(component),
                Err(_) => Motd::Raw(other.to_string()),
            },
        }
    }

    /// Parses formatter input: JSON first, raw text otherwise. This is how
    /// stored `motd` strings (which may be re-serialized JSON) round-trip
    /// back into renderable form.
    pub fn parse(data: &str) -> Motd {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Motd::from_value(&value),
            Err(_) => Motd::Raw(data.to_string()),
        }
    }

    /// The MOTD as plain text: `§x` pairs removed, or the depth-first
    /// concatenation of a component tree's `text` fields.
    pub fn strip(&self) -> String {
        match self {
            Motd::Raw(s) => strip_codes(s),
            Motd::Component(component) => {
                let mut out = String::new();
                collect_text(component, &mut out);
                out
            }
        }
    }

    /// The MOTD as an HTML fragment with inline colors and styles.
    pub fn to_html(&self) -> String {
        match self {
            Motd::Raw(s) => render_legacy(s),
            Motd::Component(component) => {
                let mut out = String::new();
                render_component(component, &mut out);
                out
            }
        }
    }
}

/// Removes every two-character `§x` sequence.
pub fn strip_codes(text: &str) -> String {
    FORMAT_CODE.replace_all(text, "").into_owned()
}

/// Renders any formatter field (version strings, player names, stored
/// MOTDs) to HTML, accepting both JSON and legacy-coded text.
pub fn html_from_str(data: &str) -> String {
    if data.is_empty() {
        return String::new();
    }
    Motd::parse(data).to_html()
}

fn collect_text(component: &Component, out: &mut String) {
    match component {
        Component::Text(s) => out.push_str(s),
        Component::Node(node) => {
            out.push_str(&node.text);
            for child in &node.extra {
                collect_text(child, out);
            }
        }
        Component::List(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        Component::Other(_) => {}
    }
}

enum Code {
    Color(&'static str),
    Bold,
    Strikethrough,
    Underline,
    Italic,
    Reset,
}

/// Legacy code characters. `0..9a..f` are the Java colors, `g..u` the
/// Bedrock material extensions, `l/m/n/o` styles, `r` reset.
fn legacy_code(c: char) -> Option<Code> {
    let hex = match c {
        '0' => "#000000",
        '1' => "#0000AA",
        '2' => "#00AA00",
        '3' => "#00AAAA",
        '4' => "#AA0000",
        '5' => "#AA00AA",
        '6' => "#FFAA00",
        '7' => "#AAAAAA",
        '8' => "#555555",
        '9' => "#0000FF",
        'a' => "#00AA00",
        'b' => "#00AAAA",
        'c' => "#AA0000",
        'd' => "#FFAAFF",
        'e' => "#FFFF00",
        'f' => "#FFFFFF",
        'g' => "#DDD605",
        'h' => "#E3D4D1",
        'i' => "#CECACA",
        'j' => "#443A3B",
        'p' => "#DEB12D",
        'q' => "#47A036",
        's' => "#2CBAA8",
        't' => "#21497B",
        'u' => "#9A5CC6",
        'l' => return Some(Code::Bold),
        'm' => return Some(Code::Strikethrough),
        'n' => return Some(Code::Underline),
        'o' => return Some(Code::Italic),
        'r' => return Some(Code::Reset),
        _ => return None,
    };
    Some(Code::Color(hex))
}

/// Hex value of a named component color.
fn named_color(name: &str) -> Option<&'static str> {
    Some(match name {
        "black" => "#000000",
        "dark_blue" => "#0000AA",
        "dark_green" => "#00AA00",
        "dark_aqua" => "#00AAAA",
        "dark_red" => "#AA0000",
        "dark_purple" => "#AA00AA",
        "gold" => "#FFAA00",
        "gray" => "#AAAAAA",
        "dark_gray" => "#555555",
        "blue" => "#0000FF",
        "green" => "#00AA00",
        "aqua" => "#00AAAA",
        "red" => "#AA0000",
        "light_purple" => "#FFAAFF",
        "yellow" => "#FFFF00",
        "white" => "#FFFFFF",
        "minecoin_gold" => "#DDD605",
        _ => return None,
    })
}

/// Resolves a component `color` value: a palette name, or `#RRGGBB` /
/// `#RGB` shorthand.
fn css_color(color: &str) -> Option<String> {
    if let Some(hex) = color.strip_prefix('#') {
        let expanded = if hex.len() == 3 {
            hex.chars().flat_map(|c| [c, c]).collect::<String>()
        } else {
            hex.to_string()
        };
        return Some(format!("#{}", expanded.to_uppercase()));
    }
    named_color(color).map(str::to_string)
}

/// Walks a `§`-coded string, opening a tag per color or style code and
/// pushing its close tag. Reset pops and closes everything open; so does
/// the end of input.
fn render_legacy(text: &str) -> String {
    let mut out = String::new();
    let mut stack: Vec<&'static str> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '§' {
            if let Some(code) = chars.peek().copied().and_then(legacy_code) {
                chars.next();
                match code {
                    Code::Color(hex) => {
                        let _ = write!(out, "<span style=\"color:{hex};\">");
                        stack.push("</span>");
                    }
                    Code::Bold => {
                        out.push_str("<b>");
                        stack.push("</b>");
                    }
                    Code::Strikethrough => {
                        out.push_str("<s>");
                        stack.push("</s>");
                    }
                    Code::Underline => {
                        out.push_str("<u>");
                        stack.push("</u>");
                    }
                    Code::Italic => {
                        out.push_str("<i>");
                        stack.push("</i>");
                    }
                    Code::Reset => {
                        while let Some(tag) = stack.pop() {
                            out.push_str(tag);
                        }
                    }
                }
                continue;
            }
        }
        if c == '\n' {
            out.push_str("<br>");
            continue;
        }
        out.push(c);
    }

    while let Some(tag) = stack.pop() {
        out.push_str(tag);
    }
    out
}

fn render_component(component: &Component, out: &mut String) {
    match component {
        Component::Text(s) => {
            out.push_str(&s.replace('\n', "<br>"));
        }
        Component::Node(node) => {
            let color = node.color.as_deref().and_then(css_color);
            let mut close: Vec<&'static str> = Vec::new();

            if let Some(hex) = &color {
                let _ = write!(out, "<span style=\"color:{hex};\">");
                close.push("</span>");
            }
            if node.bold {
                out.push_str("<b>");
                close.push("</b>");
            }
            if node.italic {
                out.push_str("<i>");
                close.push("</i>");
            }
            if node.underline {
                out.push_str("<u>");
                close.push("</u>");
            }
            if node.strikethrough {
                out.push_str("<s>");
                close.push("</s>");
            }

            if node.text.contains('§') {
                out.push_str(&render_legacy(&node.text));
            } else {
                out.push_str(&node.text.replace('\n', "<br>"));
            }

            // children render inside the parent's tags and so inherit them
            for child in &node.extra {
                render_component(child, out);
            }

            while let Some(tag) = close.pop() {
                out.push_str(tag);
            }
        }
        Component::List(items) => {
            for item in items {
                render_component(item, out);
            }
        }
        Component::Other(value) => {
            out.push_str(&value.to_string());
        }
    }
}
