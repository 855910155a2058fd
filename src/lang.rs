//! The language table: locale key → field-label map, with a process-wide
//! current locale that can be switched at runtime. The last writer wins;
//! every request reads whatever locale is current when it formats.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use snafu::{Backtrace, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::Path;

/// Labels for one locale.
pub type LabelMap = BTreeMap<String, String>;

type LangTable = BTreeMap<String, LabelMap>;

/// The table shipped with the crate.
const BUILTIN_TABLE: &str = include_str!("../language.json");

lazy_static! {
    static ref TABLE: RwLock<LangTable> =
        RwLock::new(serde_json::from_str(BUILTIN_TABLE).expect("builtin language table parses"));
    static ref CURRENT: RwLock<String> = RwLock::new("zh-cn".to_string());
}

#[derive(Debug, Snafu)]
pub enum LangError {
    #[snafu(display("cannot read language table {path}: {source}"))]
    ReadTable {
        path: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },
    #[snafu(display("language table {path} is not valid JSON: {source}"))]
    ParseTable {
        path: String,
        source: serde_json::Error,
        backtrace: Backtrace,
    },
}

/// Replaces the whole table from a `language.json` on disk.
pub fn load_table(path: impl AsRef<Path>) -> Result<(), LangError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).context(ReadTableSnafu {
        path: path.display().to_string(),
    })?;
    let table: LangTable = serde_json::from_str(&text).context(ParseTableSnafu {
        path: path.display().to_string(),
    })?;
    *TABLE.write() = table;
    Ok(())
}

/// Switches the current locale, answering in the words the command surface
/// promises.
pub fn set_language(code: &str) -> String {
    if !TABLE.read().contains_key(code) {
        return format!("No language named '{code}'!");
    }
    let mut current = CURRENT.write();
    if *current == code {
        return format!("The language is already '{code}'!");
    }
    *current = code.to_string();
    format!("Change to '{code}' success!")
}

/// Sets the startup locale from configuration, without the conversational
/// replies.
pub fn init_language(code: &str) {
    *CURRENT.write() = code.to_string();
}

pub fn current_language() -> String {
    CURRENT.read().clone()
}

pub fn language_list() -> Vec<String> {
    TABLE.read().keys().cloned().collect()
}

/// Labels for the current locale. An unknown current locale (possible via
/// configuration) falls back to `en`, then to empty labels.
pub fn labels() -> LabelMap {
    let table = TABLE.read();
    let current = CURRENT.read();
    table
        .get(current.as_str())
        .or_else(|| table.get("en"))
        .cloned()
        .unwrap_or_default()
}

/// One label of the current locale.
pub fn label(key: &str) -> String {
    labels().get(key).cloned().unwrap_or_default()
}

/// The locale cell is process-wide; tests that switch it serialize on
/// this lock so the harness can still run them on parallel threads.
#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::{Mutex, MutexGuard};

    static LOCALE_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) fn locale_lock() -> MutexGuard<'static, ()> {
        LOCALE_LOCK.lock()
    }
}
