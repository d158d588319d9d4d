//! opsmith-registry: the flat-file host registry
//!
//! One TOML file maps labels to connection details. The file is read
//! and rewritten as a whole; a missing or unparsable file is treated as
//! an empty registry, never a fatal error.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from registry persistence
#[derive(Error, Debug)]
pub enum RegistryError {
    /// I/O error while writing the registry file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry could not be serialized
    #[error("serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One registered host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// IP address or hostname
    pub addr: String,
    /// SSH user (defaults to root)
    #[serde(default = "default_user")]
    pub user: String,
    /// Path to an SSH private key (optional, falls back to defaults)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    /// Tags for filtering and grouping
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn default_user() -> String {
    "root".to_string()
}

impl HostEntry {
    /// Entry with just an address, user defaulting to root
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: default_user(),
            ssh_key: None,
            tags: Vec::new(),
        }
    }

    /// Set the SSH user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

/// Label → entry registry persisted as a single TOML file
#[derive(Debug, Default)]
pub struct Registry {
    path: PathBuf,
    hosts: BTreeMap<String, HostEntry>,
}

impl Registry {
    /// The conventional registry location, `~/.opsmith/hosts.conf`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(Path::new(&home).join(".opsmith").join("hosts.conf"))
    }

    /// Load the registry at `path`.
    ///
    /// A missing file yields an empty registry, as does a file that does
    /// not parse (logged, not fatal) — the sole condition in this system
    /// treated as a default rather than an error.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let hosts = match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(hosts) => hosts,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unparsable registry, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no registry file, starting empty");
                BTreeMap::new()
            }
        };

        Self { path, hosts }
    }

    /// Look up a host by label
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&HostEntry> {
        self.hosts.get(label)
    }

    /// Insert or replace a host entry
    pub fn set(&mut self, label: impl Into<String>, entry: HostEntry) {
        self.hosts.insert(label.into(), entry);
    }

    /// Remove a host entry, returning it if it was present
    pub fn remove(&mut self, label: &str) -> Option<HostEntry> {
        self.hosts.remove(label)
    }

    /// All labels, sorted
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    /// All entries, sorted by label
    pub fn entries(&self) -> impl Iterator<Item = (&str, &HostEntry)> {
        self.hosts.iter().map(|(label, entry)| (label.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Persist the registry, replacing the whole file.
    ///
    /// The parent directory is created with mode 0700 on first use.
    ///
    /// # Errors
    /// `RegistryError::Io` on filesystem failure, `Serialize` if the
    /// table cannot be rendered.
    pub fn store(&self) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
        }

        let raw = toml::to_string_pretty(&self.hosts)?;
        fs::write(&self.path, raw)?;
        debug!(path = %self.path.display(), hosts = self.hosts.len(), "registry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path().join("hosts.conf"));
        assert!(registry.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.conf");
        fs::write(&path, "this is { not toml").unwrap();

        let registry = Registry::open(&path);
        assert!(registry.is_empty());
    }

    #[test]
    fn round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.conf");

        let mut registry = Registry::open(&path);
        registry.set("web1", HostEntry::new("192.168.0.10").with_user("deploy"));
        registry.set("db", HostEntry::new("192.168.0.20"));
        registry.store().unwrap();

        let reloaded = Registry::open(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("web1").unwrap().user, "deploy");
        assert_eq!(reloaded.get("db").unwrap().user, "root");
        assert_eq!(reloaded.labels().collect::<Vec<_>>(), vec!["db", "web1"]);
    }

    #[test]
    fn store_replaces_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.conf");

        let mut registry = Registry::open(&path);
        registry.set("old", HostEntry::new("10.0.0.1"));
        registry.store().unwrap();

        let mut registry = Registry::open(&path);
        registry.remove("old");
        registry.set("new", HostEntry::new("10.0.0.2"));
        registry.store().unwrap();

        let reloaded = Registry::open(&path);
        assert!(reloaded.get("old").is_none());
        assert!(reloaded.get("new").is_some());
    }

    #[test]
    fn creates_the_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hosts.conf");

        let mut registry = Registry::open(&path);
        registry.set("web1", HostEntry::new("192.168.0.10"));
        registry.store().unwrap();

        assert!(path.exists());
    }
}
