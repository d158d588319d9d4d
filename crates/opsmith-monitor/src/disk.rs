//! Disk-space monitor
//!
//! Reads `df` through the bound host facade and rates per-mount-point
//! usage against configured thresholds. `df` is invoked with `-P -k` so
//! sizes arrive as plain KiB integers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use opsmith_exec::error::ExecError;
use opsmith_host::error::HostError;
use opsmith_host::host::Host;

use crate::error::MonitorError;
use crate::monitor::{Finding, rate, rate_below};

/// Disk monitor configuration
///
/// ```toml
/// [[diskfree]]
/// mount_point = '/'
/// parameter = 'used_percent'
/// thresholds = [80.0, 90.0, 95.0]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    #[serde(default, rename = "diskfree")]
    pub checks: Vec<DiskCheck>,
}

/// One threshold test against one mount point
#[derive(Debug, Clone, Deserialize)]
pub struct DiskCheck {
    pub mount_point: String,
    pub parameter: DiskParameter,
    /// Ascending thresholds for `used`/`used_percent`; descending
    /// free-space floors for `free`
    pub thresholds: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskParameter {
    /// Available space in KiB; rated when it falls below a threshold
    Free,
    /// Used space in KiB
    Used,
    /// Used capacity in percent
    UsedPercent,
}

impl DiskParameter {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DiskParameter::Free => "free",
            DiskParameter::Used => "used",
            DiskParameter::UsedPercent => "used_percent",
        }
    }
}

impl DiskConfig {
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

/// Usage of one filesystem as reported by `df -P -k`
#[derive(Debug, Clone)]
pub struct DiskUsage {
    pub mount_point: String,
    pub size_kib: f64,
    pub used_kib: f64,
    pub available_kib: f64,
    pub used_percent: f64,
}

/// A finished disk sweep
#[derive(Debug)]
pub struct DiskReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Every filesystem seen, tested or not
    pub usages: Vec<DiskUsage>,
    /// Tests whose threshold was reached
    pub findings: Vec<Finding>,
}

/// Rates disk usage on one bound host
pub struct DiskFreeMonitor {
    host: Arc<Host>,
    config: DiskConfig,
}

impl DiskFreeMonitor {
    #[must_use]
    pub fn new(host: Arc<Host>, config: DiskConfig) -> Self {
        Self { host, config }
    }

    /// Check every configured mount point.
    ///
    /// # Errors
    /// `NoTests` when nothing is configured; a failing `df` is
    /// `CommandFailed`; transport errors propagate.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<DiskReport, MonitorError> {
        if self.config.checks.is_empty() {
            return Err(MonitorError::NoTests);
        }

        let started_at = Utc::now();

        let result = self.host.run("df -P -k").await.map_err(HostError::from)?;
        if !result.success() {
            return Err(MonitorError::Host(
                ExecError::CommandFailed {
                    exit_code: result.exit_code,
                    stderr: result.stderr_joined(),
                }
                .into(),
            ));
        }

        let usages = parse_df(&result.stdout);
        let findings = self.rate_usages(&usages);

        debug!(
            filesystems = usages.len(),
            findings = findings.len(),
            "disk sweep finished"
        );

        Ok(DiskReport {
            started_at,
            finished_at: Utc::now(),
            usages,
            findings,
        })
    }

    fn rate_usages(&self, usages: &[DiskUsage]) -> Vec<Finding> {
        let mut findings = Vec::new();

        for usage in usages {
            for check in &self.config.checks {
                if check.mount_point != usage.mount_point {
                    continue;
                }

                let (value, severity) = match check.parameter {
                    DiskParameter::Free => (
                        usage.available_kib,
                        rate_below(usage.available_kib, &check.thresholds),
                    ),
                    DiskParameter::Used => {
                        (usage.used_kib, rate(usage.used_kib, &check.thresholds))
                    }
                    DiskParameter::UsedPercent => (
                        usage.used_percent,
                        rate(usage.used_percent, &check.thresholds),
                    ),
                };

                if let Some(severity) = severity {
                    findings.push(Finding {
                        subject: usage.mount_point.clone(),
                        parameter: check.parameter.name().to_string(),
                        value,
                        severity,
                    });
                }
            }
        }

        findings
    }
}

/// Parse `df -P -k` output, skipping the header line.
fn parse_df(lines: &[String]) -> Vec<DiskUsage> {
    lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            Some(DiskUsage {
                mount_point: fields[5..].join(" "),
                size_kib: fields[1].parse().ok()?,
                used_kib: fields[2].parse().ok()?,
                available_kib: fields[3].parse().ok()?,
                used_percent: fields[4].trim_end_matches('%').parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Severity;

    fn sample_df() -> Vec<String> {
        [
            "Filesystem     1024-blocks     Used Available Capacity Mounted on",
            "/dev/sda1         41152812 37037530   2004048      95% /",
            "/dev/sdb1        103081248 10308124  87515164      11% /srv/data",
            "tmpfs              8154884        0   8154884       0% /dev/shm",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }

    #[test]
    fn parses_portable_df_output() {
        let usages = parse_df(&sample_df());
        assert_eq!(usages.len(), 3);
        assert_eq!(usages[0].mount_point, "/");
        assert_eq!(usages[0].used_percent, 95.0);
        assert_eq!(usages[1].available_kib, 87_515_164.0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let mut lines = sample_df();
        lines.push("garbage line".to_string());
        assert_eq!(parse_df(&lines).len(), 3);
    }

    #[test]
    fn used_percent_rates_against_ascending_thresholds() {
        let config = DiskConfig::from_toml(
            "[[diskfree]]\nmount_point = '/'\nparameter = 'used_percent'\nthresholds = [80.0, 90.0, 95.0]\n",
        )
        .unwrap();
        let monitor = DiskFreeMonitor {
            host: Arc::new(opsmith_host::host::Host::local("tester", None)),
            config,
        };

        let findings = monitor.rate_usages(&parse_df(&sample_df()));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].subject, "/");
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn free_rates_when_space_runs_out() {
        let config = DiskConfig::from_toml(
            "[[diskfree]]\nmount_point = '/'\nparameter = 'free'\nthresholds = [4000000.0, 3000000.0, 1000000.0]\n",
        )
        .unwrap();
        let monitor = DiskFreeMonitor {
            host: Arc::new(opsmith_host::host::Host::local("tester", None)),
            config,
        };

        // 2,004,048 KiB free on / is below 3,000,000 but above 1,000,000.
        let findings = monitor.rate_usages(&parse_df(&sample_df()));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn untested_mounts_produce_no_findings() {
        let config = DiskConfig::from_toml(
            "[[diskfree]]\nmount_point = '/var'\nparameter = 'used_percent'\nthresholds = [80.0, 90.0, 95.0]\n",
        )
        .unwrap();
        let monitor = DiskFreeMonitor {
            host: Arc::new(opsmith_host::host::Host::local("tester", None)),
            config,
        };

        assert!(monitor.rate_usages(&parse_df(&sample_df())).is_empty());
    }
}
