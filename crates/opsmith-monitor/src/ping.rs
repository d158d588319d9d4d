//! ICMP ping monitor
//!
//! Pings every configured target through the bound host facade and
//! rates packet loss and round-trip times against the configured
//! thresholds. Targets are pinged by a bounded pool of workers; each
//! worker drives one target at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use opsmith_host::error::HostError;
use opsmith_host::host::Host;

use crate::error::MonitorError;
use crate::monitor::{Finding, Severity, rate};

fn default_ping_count() -> u32 {
    4
}

fn default_workers() -> usize {
    5
}

/// Ping monitor configuration, usually loaded from a TOML file
///
/// ```toml
/// [global]
/// ping_count = 10
/// workers = 5
///
/// [[network]]
/// label = 'lan'
/// hosts = ['192.168.0.1', '192.168.0.10']
///
///     [[network.test]]
///     parameter = 'packet_loss_rate'
///     thresholds = [0.5, 1.0, 3.0]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PingConfig {
    #[serde(default)]
    pub global: PingGlobal,
    #[serde(default, rename = "network")]
    pub networks: Vec<Network>,
}

/// Global section of the ping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PingGlobal {
    /// ICMP packets per target
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    /// Maximum concurrently pinged targets
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PingGlobal {
    fn default() -> Self {
        Self {
            ping_count: default_ping_count(),
            workers: default_workers(),
        }
    }
}

/// A labeled group of targets expected to behave alike
#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    pub label: String,
    pub hosts: Vec<String>,
    #[serde(default, rename = "test")]
    pub tests: Vec<PingTest>,
}

/// One threshold test applied to every target of a network
#[derive(Debug, Clone, Deserialize)]
pub struct PingTest {
    pub parameter: PingParameter,
    /// Ascending Notice/Warning/Critical thresholds
    pub thresholds: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingParameter {
    PacketLossRate,
    RttAvg,
    RttMax,
}

impl PingParameter {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PingParameter::PacketLossRate => "packet_loss_rate",
            PingParameter::RttAvg => "rtt_avg",
            PingParameter::RttMax => "rtt_max",
        }
    }
}

impl PingConfig {
    /// Parse a configuration document.
    ///
    /// # Errors
    /// `MonitorError::Config` when the document does not parse.
    pub fn from_toml(raw: &str) -> Result<Self, MonitorError> {
        toml::from_str(raw).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// Read the configuration file from a bound host.
    ///
    /// # Errors
    /// Facade errors propagate; parse failures are `Config`.
    pub async fn load(host: &Host, path: &str) -> Result<Self, MonitorError> {
        let raw = host.read_file(path).await?;
        Self::from_toml(&raw)
    }
}

/// Statistics parsed from one ping run
#[derive(Debug, Clone, Default)]
pub struct PingStats {
    pub packet_loss_rate: f64,
    pub rtt_avg: Option<f64>,
    pub rtt_max: Option<f64>,
}

/// What happened to one target
#[derive(Debug, Clone)]
pub enum PingOutcome {
    /// The ping command exited nonzero or produced no statistics
    Unreachable,
    /// Statistics were collected and rated
    Measured {
        stats: PingStats,
        /// Tests whose threshold was reached; empty means all clear
        findings: Vec<Finding>,
    },
}

/// Result for one target of one network
#[derive(Debug, Clone)]
pub struct PingResult {
    pub network: String,
    pub target: String,
    pub outcome: PingOutcome,
}

/// A finished ping sweep
#[derive(Debug)]
pub struct PingReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<PingResult>,
}

impl PingReport {
    /// Worst severity in the sweep; an unreachable target counts as
    /// critical.
    #[must_use]
    pub fn worst(&self) -> Option<Severity> {
        self.results
            .iter()
            .filter_map(|result| match &result.outcome {
                PingOutcome::Unreachable => Some(Severity::Critical),
                PingOutcome::Measured { findings, .. } => {
                    findings.iter().map(|f| f.severity).max()
                }
            })
            .max()
    }
}

/// Pings the configured networks through one bound host
pub struct PingMonitor {
    host: Arc<Host>,
    config: PingConfig,
}

impl PingMonitor {
    #[must_use]
    pub fn new(host: Arc<Host>, config: PingConfig) -> Self {
        Self { host, config }
    }

    /// Sweep every target of every network.
    ///
    /// # Errors
    /// `NoTests` when no network carries a test; transport errors from
    /// the facade propagate.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PingReport, MonitorError> {
        if self.config.networks.iter().all(|n| n.tests.is_empty()) {
            return Err(MonitorError::NoTests);
        }

        let started_at = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.config.global.workers.max(1)));
        let mut workers = JoinSet::new();

        for network in &self.config.networks {
            for target in &network.hosts {
                let host = Arc::clone(&self.host);
                let semaphore = Arc::clone(&semaphore);
                let label = network.label.clone();
                let tests = network.tests.clone();
                let target = target.clone();
                let count = self.config.global.ping_count;

                workers.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| MonitorError::Worker(e.to_string()))?;
                    ping_one(&host, &label, &target, count, &tests).await
                });
            }
        }

        let mut results = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(MonitorError::Worker(e.to_string())),
            }
        }

        Ok(PingReport {
            started_at,
            finished_at: Utc::now(),
            results,
        })
    }
}

async fn ping_one(
    host: &Host,
    network: &str,
    target: &str,
    count: u32,
    tests: &[PingTest],
) -> Result<PingResult, MonitorError> {
    let cmd = format!("ping -n -q -c {count} {}", shell_words::quote(target));
    let result = host.run(&cmd).await.map_err(HostError::from)?;

    let outcome = if !result.success() {
        warn!(network = %network, target = %target, "target unreachable");
        PingOutcome::Unreachable
    } else {
        match parse_ping(&result.stdout) {
            Some(stats) => {
                let findings = rate_stats(target, &stats, tests);
                debug!(target = %target, loss = stats.packet_loss_rate, "target measured");
                PingOutcome::Measured { stats, findings }
            }
            None => {
                warn!(network = %network, target = %target, "unparsable ping output");
                PingOutcome::Unreachable
            }
        }
    };

    Ok(PingResult {
        network: network.to_string(),
        target: target.to_string(),
        outcome,
    })
}

/// Pull loss and rtt figures out of `ping -q` summary output.
fn parse_ping(lines: &[String]) -> Option<PingStats> {
    let mut stats = PingStats::default();
    let mut saw_loss = false;

    for line in lines {
        if let Some(idx) = line.find("% packet loss") {
            let head = &line[..idx];
            let token = head.rsplit([' ', ',']).next()?;
            stats.packet_loss_rate = token.trim().parse().ok()?;
            saw_loss = true;
        } else if line.starts_with("rtt") || line.starts_with("round-trip") {
            // rtt min/avg/max/mdev = 0.035/0.042/0.048/0.005 ms
            let values = line.split('=').nth(1)?.trim();
            let values = values.split_whitespace().next()?;
            let parts: Vec<&str> = values.split('/').collect();
            if parts.len() >= 3 {
                stats.rtt_avg = parts[1].parse().ok();
                stats.rtt_max = parts[2].parse().ok();
            }
        }
    }

    saw_loss.then_some(stats)
}

fn rate_stats(target: &str, stats: &PingStats, tests: &[PingTest]) -> Vec<Finding> {
    tests
        .iter()
        .filter_map(|test| {
            let value = match test.parameter {
                PingParameter::PacketLossRate => Some(stats.packet_loss_rate),
                PingParameter::RttAvg => stats.rtt_avg,
                PingParameter::RttMax => stats.rtt_max,
            }?;

            rate(value, &test.thresholds).map(|severity| Finding {
                subject: target.to_string(),
                parameter: test.parameter.name().to_string(),
                value,
                severity,
            })
        })
        .collect()
}
