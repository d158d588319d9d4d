//! Monitor runs against a fake host

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use opsmith_exec::error::ExecError;
use opsmith_exec::result::CommandResult;
use opsmith_exec::sudo::SudoOptions;
use opsmith_exec::traits::Executor;
use opsmith_host::host::Host;
use opsmith_monitor::disk::{DiskConfig, DiskFreeMonitor};
use opsmith_monitor::error::MonitorError;
use opsmith_monitor::monitor::Severity;
use opsmith_monitor::ping::{PingConfig, PingMonitor, PingOutcome};

/// Answers ping and df commands with canned output; `10.0.0.66` is
/// unreachable.
struct FakeFleet;

fn lines(exit_code: i32, text: &str) -> CommandResult {
    CommandResult {
        exit_code,
        stdout: text.lines().map(str::to_string).collect(),
        stderr: Vec::new(),
    }
}

#[async_trait]
impl Executor for FakeFleet {
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        if cmd.starts_with("ping ") {
            if cmd.ends_with("10.0.0.66") {
                return Ok(lines(1, ""));
            }
            return Ok(lines(
                0,
                "4 packets transmitted, 4 received, 0% packet loss, time 3004ms\n\
                 rtt min/avg/max/mdev = 0.321/0.398/0.512/0.058 ms",
            ));
        }
        if cmd == "df -P -k" {
            return Ok(lines(
                0,
                "Filesystem     1024-blocks     Used Available Capacity Mounted on\n\
                 /dev/sda1         41152812 37037530   2004048      95% /",
            ));
        }
        Ok(lines(1, ""))
    }

    async fn sudo(&self, cmd: &str, _opts: &SudoOptions) -> Result<CommandResult, ExecError> {
        self.run(cmd).await
    }

    async fn upload(&self, _src: &Path, _dest: &str) -> Result<(), ExecError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}

fn fake_host() -> Arc<Host> {
    Arc::new(Host::with_executor("monitor", None, Box::new(FakeFleet)))
}

#[tokio::test]
async fn ping_sweep_measures_and_flags_unreachable_targets() {
    let config = PingConfig::from_toml(
        r"
[[network]]
label = 'lan'
hosts = ['192.168.0.1', '10.0.0.66']

    [[network.test]]
    parameter = 'packet_loss_rate'
    thresholds = [0.5, 1.0, 3.0]
",
    )
    .unwrap();

    let monitor = PingMonitor::new(fake_host(), config);
    let report = monitor.run().await.unwrap();

    assert_eq!(report.results.len(), 2);
    assert!(report.finished_at >= report.started_at);

    let down = report
        .results
        .iter()
        .find(|r| r.target == "10.0.0.66")
        .unwrap();
    assert!(matches!(down.outcome, PingOutcome::Unreachable));

    let up = report
        .results
        .iter()
        .find(|r| r.target == "192.168.0.1")
        .unwrap();
    match &up.outcome {
        PingOutcome::Measured { stats, findings } => {
            assert_eq!(stats.packet_loss_rate, 0.0);
            assert!(findings.is_empty());
        }
        PingOutcome::Unreachable => panic!("192.168.0.1 should be reachable"),
    }

    // The unreachable target dominates the sweep.
    assert_eq!(report.worst(), Some(Severity::Critical));
}

#[tokio::test]
async fn ping_without_tests_refuses_to_run() {
    let config = PingConfig::from_toml("[[network]]\nlabel = 'lan'\nhosts = ['192.168.0.1']\n")
        .unwrap();

    let monitor = PingMonitor::new(fake_host(), config);
    let err = monitor.run().await.unwrap_err();
    assert!(matches!(err, MonitorError::NoTests));
}

#[tokio::test]
async fn disk_sweep_rates_the_configured_mounts() {
    let config = DiskConfig::from_toml(
        "[[diskfree]]\nmount_point = '/'\nparameter = 'used_percent'\nthresholds = [80.0, 90.0, 95.0]\n",
    )
    .unwrap();

    let monitor = DiskFreeMonitor::new(fake_host(), config);
    let report = monitor.run().await.unwrap();

    assert_eq!(report.usages.len(), 1);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::Critical);
}

#[tokio::test]
async fn disk_without_checks_refuses_to_run() {
    let config = DiskConfig::from_toml("").unwrap();
    let monitor = DiskFreeMonitor::new(fake_host(), config);
    assert!(matches!(
        monitor.run().await.unwrap_err(),
        MonitorError::NoTests
    ));
}
