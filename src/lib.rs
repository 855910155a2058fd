//! Probe the status of Minecraft servers over every protocol generation.
//!
//! One call resolves an address (SRV records, dual A/AAAA fan-out
//! included), walks the server-list-ping protocols a Java server may
//! speak (Legacy, Beta, Extended Legacy, Query, modern JSON), races a
//! Bedrock RakNet ping alongside, and returns normalized
//! [`StatusRecord`]s with the MOTD decoded to both plain text and HTML.
//!
//! ```no_run
//! # async {
//! let report = spyglass_ping::check("mc.hypixel.net").await?;
//! for record in &report.records {
//!     println!(
//!         "{} on port {} via {:?}: {:?}",
//!         record.address, record.port, record.slp_protocol, record.stripped_motd,
//!     );
//! }
//! # Ok::<(), spyglass_ping::resolve::AddressError>(())
//! # };
//! ```

pub mod bedrock;
pub mod check;
pub mod config;
pub mod format;
pub mod lang;
pub mod legacy;
pub mod motd;
pub mod probe;
pub mod query;
pub mod resolve;
pub mod slp;
pub mod status;
pub mod wire;

pub use check::{check, check_server, check_server_with, CheckReport, ProbeOutcome};
pub use config::Config;
pub use format::{Message, RenderData, Rendered};
pub use motd::Motd;
pub use probe::{ProbeError, DEFAULT_TIMEOUT};
pub use resolve::{parse_host, resolve_targets, ProbeTarget, TargetKind};
pub use status::{ConnStatus, Edition, ProbeFailure, ProtocolChoice, SlpProtocol, StatusRecord};
