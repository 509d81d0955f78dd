//! Per-controller build session.
//!
//! Everything a build needs that must never be shared between two
//! playgrounds lives here: the version counter, the session epoch that makes
//! hostnames unique across restarts, and the compiler's virtual environment.

use uuid::Uuid;

use playpen_common::Hostname;
use playpen_core::VirtualEnv;
use playpen_core::toolchain::ENTRY_FILE;

/// Stand-in for empty source; the environment treats empty content as deletion.
pub const EMPTY_SOURCE_PLACEHOLDER: &str = " ";

/// Snapshot taken when a rebuild fires.
#[derive(Debug, Clone)]
pub struct BuildTicket {
    /// Version assigned to this build.
    pub version: u64,
    /// Identity the bundle will carry.
    pub hostname: Hostname,
    /// Environment as it was at fire time.
    pub env: VirtualEnv,
}

/// Mutable build state owned by one controller.
#[derive(Debug, Clone)]
pub struct BuildSession {
    version: u64,
    epoch: String,
    env: VirtualEnv,
}

impl BuildSession {
    /// Start a session with a fresh random epoch.
    pub fn new() -> Self {
        let mut epoch = Uuid::new_v4().simple().to_string();
        epoch.truncate(8);
        Self::with_epoch(epoch)
    }

    /// Start a session with a fixed epoch.
    pub fn with_epoch(epoch: impl Into<String>) -> Self {
        Self {
            version: 0,
            epoch: epoch.into(),
            env: VirtualEnv::new(),
        }
    }

    /// Write the entry-point file.
    pub fn write_source(&mut self, source: &str) {
        let content = if source.is_empty() {
            EMPTY_SOURCE_PLACEHOLDER
        } else {
            source
        };
        self.env.write(ENTRY_FILE, content);
    }

    /// Bump the version and snapshot the environment for a build.
    pub fn next_build(&mut self, name: &str) -> BuildTicket {
        self.version += 1;
        BuildTicket {
            version: self.version,
            hostname: Hostname::derive(name, self.version, &self.epoch),
            env: self.env.clone(),
        }
    }

    /// Version of the most recent build, 0 before the first.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Session epoch.
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Current environment.
    pub fn env(&self) -> &VirtualEnv {
        &self.env
    }
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_empty_source_is_coerced() {
        let mut session = BuildSession::with_epoch("e");

        session.write_source("");
        assert_eq!(session.env().entry(), Some(EMPTY_SOURCE_PLACEHOLDER));

        session.write_source("(module)");
        assert_eq!(session.env().entry(), Some("(module)"));
    }

    #[test]
    fn test_versions_strictly_increase() {
        let mut session = BuildSession::with_epoch("e");
        let mut seen = HashSet::new();
        let mut last = session.version();

        for _ in 0..20 {
            let ticket = session.next_build("Foo");
            assert!(ticket.version > last);
            assert!(seen.insert(ticket.hostname.clone()));
            last = ticket.version;
        }
    }

    #[test]
    fn test_ticket_snapshots_environment() {
        let mut session = BuildSession::with_epoch("e");
        session.write_source("one");
        let ticket = session.next_build("Foo");
        session.write_source("two");

        assert_eq!(ticket.env.entry(), Some("one"));
        assert_eq!(ticket.hostname.as_str(), "foo-1-e");
    }

    #[test]
    fn test_epochs_differ_between_sessions() {
        let a = BuildSession::new();
        let b = BuildSession::new();

        assert_eq!(a.epoch().len(), 8);
        assert_ne!(a.epoch(), b.epoch());
    }
}
