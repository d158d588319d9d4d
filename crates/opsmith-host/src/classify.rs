//! OS classification cascade
//!
//! Probes a bound host to select its most specific recognized OS
//! variant. Probes run in a fixed, most-specific-first order and the
//! cascade stops at the first match; a machine matching no probe at all
//! is `UnknownSystem`, never a silent default.

use std::ops::Deref;

use tracing::{debug, info, instrument};

use opsmith_exec::error::ExecError;

use crate::error::HostError;
use crate::host::Host;

/// The most specific recognized variant of a machine's operating system.
///
/// Chosen once per host; changing it means constructing and
/// classifying a new [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Generic Linux with no more specific match
    Linux,
    Debian,
    Ubuntu,
    /// Debian derivative; `/etc/os-release` reports `ID=debian`
    Proxmox,
    CentOS,
    /// CentOS derivative; `/etc/os-release` reports `ID=centos`
    Issabel,
    Fedora,
}

impl HostKind {
    /// The broad family a variant descends from (itself for families).
    #[must_use]
    pub fn family(self) -> HostKind {
        match self {
            HostKind::Ubuntu | HostKind::Proxmox => HostKind::Debian,
            HostKind::Issabel => HostKind::CentOS,
            other => other,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HostKind::Linux => "Linux",
            HostKind::Debian => "Debian",
            HostKind::Ubuntu => "Ubuntu",
            HostKind::Proxmox => "Proxmox",
            HostKind::CentOS => "CentOS",
            HostKind::Issabel => "Issabel",
            HostKind::Fedora => "Fedora",
        }
    }
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A host whose OS variant has been determined.
///
/// Wraps the generic [`Host`] (same executor, no reconnection) together
/// with its immutable classification. Derefs to [`Host`], so the whole
/// facade remains available.
#[derive(Debug)]
pub struct LinuxHost {
    host: Host,
    kind: HostKind,
}

impl LinuxHost {
    /// The classified variant
    #[must_use]
    pub fn kind(&self) -> HostKind {
        self.kind
    }

    /// Give back the generic host
    #[must_use]
    pub fn into_inner(self) -> Host {
        self.host
    }
}

impl Deref for LinuxHost {
    type Target = Host;

    fn deref(&self) -> &Host {
        &self.host
    }
}

impl Host {
    /// Classify this host, consuming the generic binding.
    ///
    /// The returned [`LinuxHost`] reuses the already-bound executor.
    ///
    /// # Errors
    /// `UnknownSystem` when no probe matches; transport errors from the
    /// probes propagate unwrapped.
    pub async fn classify(self) -> Result<LinuxHost, HostError> {
        classify(self).await
    }
}

/// Run the classification cascade against a bound host.
///
/// # Errors
/// `UnknownSystem` when no probe matches.
#[instrument(skip(host), fields(addr = host.addr().unwrap_or("local")))]
pub async fn classify(host: Host) -> Result<LinuxHost, HostError> {
    let kind = probe(&host).await?;
    info!(kind = %kind, "host classified");
    Ok(LinuxHost { host, kind })
}

async fn probe(host: &Host) -> Result<HostKind, HostError> {
    // Narrow product markers come first: these systems also ship a broad
    // distro id in /etc/os-release (Issabel reports centos, Proxmox
    // reports debian), and the narrow variant must win.
    if host.file_exists("/etc/issabel.conf").await? {
        return Ok(HostKind::Issabel);
    }

    if let Some(id) = host.distro().await? {
        if host.directory_exists("/etc/pve").await? {
            return Ok(HostKind::Proxmox);
        }

        debug!(id = %id, "os-release id probe");
        match id.as_str() {
            "ubuntu" => return Ok(HostKind::Ubuntu),
            "debian" => return Ok(HostKind::Debian),
            "centos" => return Ok(HostKind::CentOS),
            "fedora" => return Ok(HostKind::Fedora),
            _ => {}
        }
    }

    // Generic fallback: anything that answers a basic "is Linux" probe.
    match host.uname().await {
        Ok(kernel) if kernel == "Linux" => Ok(HostKind::Linux),
        Ok(_) => Err(HostError::UnknownSystem),
        Err(HostError::Exec(ExecError::CommandNotFound(_))) => Err(HostError::UnknownSystem),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivatives_report_their_family() {
        assert_eq!(HostKind::Proxmox.family(), HostKind::Debian);
        assert_eq!(HostKind::Ubuntu.family(), HostKind::Debian);
        assert_eq!(HostKind::Issabel.family(), HostKind::CentOS);
        assert_eq!(HostKind::Fedora.family(), HostKind::Fedora);
        assert_eq!(HostKind::Linux.family(), HostKind::Linux);
    }

    #[test]
    fn display_matches_name() {
        assert_eq!(HostKind::CentOS.to_string(), "CentOS");
    }
}
