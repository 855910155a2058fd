//! The probe orchestrator: dispatches protocol probes per endpoint,
//! enforces the Java fallback order, and runs the Java chain and the
//! Bedrock probe concurrently where both are plausible.

use crate::bedrock;
use crate::legacy;
use crate::probe::{socket_addr, ProbeError, DEFAULT_TIMEOUT};
use crate::query;
use crate::resolve::{self, AddressError, PortOutOfRangeSnafu, ProbeTarget};
use crate::slp;
use crate::status::{
    ConnStatus, ProbeFailure, ProtocolChoice, SlpProtocol, StatusRecord, DEFAULT_BEDROCK_PORT_V4,
    DEFAULT_BEDROCK_PORT_V6, DEFAULT_JAVA_PORT,
};
use std::time::Duration;
use tracing::{debug, instrument};

/// One probe's verdict: a record, or the failure explaining why not,
/// latency included when one was measured before things went wrong.
pub type ProbeOutcome = Result<StatusRecord, ProbeFailure>;

/// Everything learned about one user-supplied address.
#[derive(Debug)]
pub struct CheckReport {
    /// The host part of the user's input, as typed.
    pub address: String,
    /// Records from every endpoint and protocol that answered, in
    /// resolution order.
    pub records: Vec<StatusRecord>,
    /// When `records` is empty: the most informative failure observed
    /// (any non-CONNFAIL beats CONNFAIL), with its measured latency.
    pub fallback: ProbeFailure,
}

/// Port 0 means "whatever this protocol defaults to".
fn effective_port(target: &ProbeTarget, protocol: SlpProtocol) -> u16 {
    if target.port != 0 {
        target.port
    } else if protocol == SlpProtocol::BedrockRaknet {
        if target.kind.is_ipv6() {
            DEFAULT_BEDROCK_PORT_V6
        } else {
            DEFAULT_BEDROCK_PORT_V4
        }
    } else {
        DEFAULT_JAVA_PORT
    }
}

/// Runs exactly one protocol probe against a target, with no fallback.
pub async fn probe_protocol(
    protocol: SlpProtocol,
    target: &ProbeTarget,
    timeout: Duration,
) -> Result<StatusRecord, ProbeError> {
    let addr = socket_addr(&target.ip, effective_port(target, protocol))?;
    match protocol {
        SlpProtocol::Beta => legacy::probe_beta(addr, timeout).await,
        SlpProtocol::Legacy => legacy::probe_legacy(addr, timeout).await,
        SlpProtocol::ExtendedLegacy => {
            legacy::probe_extended_legacy(addr, &target.refer, timeout).await
        }
        SlpProtocol::Json => slp::probe_json(addr, &target.refer, timeout).await,
        SlpProtocol::Query => query::probe_query(addr, timeout).await,
        SlpProtocol::BedrockRaknet => bedrock::probe_bedrock(addr, timeout).await,
    }
}

/// The Java fallback chain, oldest protocol first.
///
/// The order is not arbitrary: some old servers stall for several seconds
/// after an unrecognized packet, so the chain leads with the requests
/// those servers do understand. A failed connection at any step means the
/// port is not listening, and short-circuits the rest.
#[instrument(skip(target, timeout), fields(ip = %target.ip))]
pub async fn probe_java(target: &ProbeTarget, timeout: Duration) -> ProbeOutcome {
    let mut failure;

    // Minecraft 1.4 & 1.5
    match probe_protocol(SlpProtocol::Legacy, target, timeout).await {
        Ok(record) => return Ok(record),
        Err(err) => failure = err.failure(),
    }

    // Minecraft Beta 1.8 to Release 1.3
    if failure.status != ConnStatus::ConnFail {
        match probe_protocol(SlpProtocol::Beta, target, timeout).await {
            Ok(record) => return Ok(record),
            Err(err) => failure = err.failure(),
        }
    }

    // Minecraft 1.6
    if failure.status != ConnStatus::ConnFail {
        match probe_protocol(SlpProtocol::ExtendedLegacy, target, timeout).await {
            Ok(record) => return Ok(record),
            Err(err) => failure = err.failure(),
        }
    }

    // Query, where the server has it enabled
    if failure.status != ConnStatus::ConnFail {
        match probe_protocol(SlpProtocol::Query, target, timeout).await {
            Ok(record) => return Ok(record),
            Err(err) => failure = err.failure(),
        }
    }

    // Minecraft 1.7+
    if failure.status != ConnStatus::ConnFail {
        match probe_protocol(SlpProtocol::Json, target, timeout).await {
            Ok(record) => return Ok(record),
            Err(err) => failure = err.failure(),
        }
    }

    debug!("java chain exhausted: {}", failure.status);
    Err(failure)
}

/// Probes one endpoint. SRV-derived endpoints run the Java chain only
/// (Bedrock never lives behind an SRV record, and probing it would just
/// add failure latency); everything else probes Java and Bedrock
/// concurrently.
pub async fn probe_endpoint(target: &ProbeTarget, timeout: Duration) -> Vec<ProbeOutcome> {
    if target.kind.is_srv() {
        return vec![probe_java(target, timeout).await];
    }

    let (java, bedrock) = tokio::join!(probe_java(target, timeout), async {
        probe_protocol(SlpProtocol::BedrockRaknet, target, timeout)
            .await
            .map_err(|err| err.failure())
    });
    vec![java, bedrock]
}

/// Probes every endpoint a user-supplied address resolves to.
///
/// Input errors (not an address, port out of range) fail fast; an address
/// that resolves to nothing reports a failed connection.
pub async fn check_server_with(
    input: &str,
    choice: ProtocolChoice,
    timeout: Duration,
) -> Result<CheckReport, AddressError> {
    let (host, port) = resolve::parse_host(input);
    if port > u32::from(u16::MAX) {
        return PortOutOfRangeSnafu { port }.fail();
    }

    let targets = resolve::resolve_targets(&host, port as u16).await?;
    debug!("{host} resolved to {} target(s)", targets.len());

    let mut handles = Vec::with_capacity(targets.len());
    for target in targets {
        handles.push(tokio::spawn(async move {
            match choice {
                ProtocolChoice::All => probe_endpoint(&target, timeout).await,
                ProtocolChoice::Single(protocol) => {
                    vec![probe_protocol(protocol, &target, timeout)
                        .await
                        .map_err(|err| err.failure())]
                }
            }
        }));
    }

    let mut records = Vec::new();
    let mut fallback = ProbeFailure {
        status: ConnStatus::ConnFail,
        latency_ms: None,
    };
    for handle in handles {
        let Ok(outcomes) = handle.await else { continue };
        for outcome in outcomes {
            match outcome {
                Ok(record) => records.push(record),
                Err(failure) => {
                    if failure.status != ConnStatus::ConnFail {
                        // the first informative failure wins
                        if fallback.status == ConnStatus::ConnFail {
                            fallback = failure;
                        }
                    } else if fallback.status == ConnStatus::ConnFail
                        && fallback.latency_ms.is_none()
                    {
                        fallback.latency_ms = failure.latency_ms;
                    }
                }
            }
        }
    }

    Ok(CheckReport {
        address: host,
        records,
        fallback,
    })
}

/// [`check_server_with`] over the full fallback chain.
pub async fn check_server(input: &str, timeout: Duration) -> Result<CheckReport, AddressError> {
    check_server_with(input, ProtocolChoice::All, timeout).await
}

/// [`check_server`] with the default 5 second timeout.
pub async fn check(input: &str) -> Result<CheckReport, AddressError> {
    check_server(input, DEFAULT_TIMEOUT).await
}
