//! opsmith-monitor: periodic checks built on the host facade
//!
//! Monitors consume a bound host's operations and rate what they find
//! against configured thresholds. They own no execution machinery of
//! their own.

pub mod disk;
pub mod error;
pub mod monitor;
pub mod ping;
