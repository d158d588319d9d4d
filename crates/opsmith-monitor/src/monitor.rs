//! Severity rating shared by all monitors

use serde::Serialize;

/// How bad a rated observation is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Notice,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Notice => f.write_str("Notice"),
            Severity::Warning => f.write_str("Warning"),
            Severity::Critical => f.write_str("Critical"),
        }
    }
}

const LEVELS: [Severity; 3] = [Severity::Notice, Severity::Warning, Severity::Critical];

/// Rate a value against an ascending three-step threshold list.
///
/// The highest threshold the value reaches wins; a value below the
/// first yields no severity at all.
#[must_use]
pub fn rate(value: f64, thresholds: &[f64; 3]) -> Option<Severity> {
    let mut severity = None;
    for (level, threshold) in LEVELS.iter().zip(thresholds) {
        if value < *threshold {
            return severity;
        }
        severity = Some(*level);
    }
    severity
}

/// Rate a value that is bad when low (free disk space) against a
/// descending threshold list: dropping below a threshold reaches that
/// level.
#[must_use]
pub fn rate_below(value: f64, thresholds: &[f64; 3]) -> Option<Severity> {
    let mut severity = None;
    for (level, threshold) in LEVELS.iter().zip(thresholds) {
        if value > *threshold {
            return severity;
        }
        severity = Some(*level);
    }
    severity
}

/// One rated observation in a monitor report
#[derive(Debug, Clone)]
pub struct Finding {
    /// What was measured (a target host, a mount point)
    pub subject: String,
    /// The tested parameter
    pub parameter: String,
    /// The observed value
    pub value: f64,
    /// How bad it is
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_the_first_threshold_is_unrated() {
        assert_eq!(rate(0.2, &[0.5, 1.0, 3.0]), None);
    }

    #[test]
    fn highest_crossed_threshold_wins() {
        assert_eq!(rate(0.5, &[0.5, 1.0, 3.0]), Some(Severity::Notice));
        assert_eq!(rate(2.0, &[0.5, 1.0, 3.0]), Some(Severity::Warning));
        assert_eq!(rate(10.0, &[0.5, 1.0, 3.0]), Some(Severity::Critical));
    }

    #[test]
    fn rate_below_inverts_the_ladder() {
        let thresholds = [2048.0, 1024.0, 512.0];
        assert_eq!(rate_below(5000.0, &thresholds), None);
        assert_eq!(rate_below(1500.0, &thresholds), Some(Severity::Notice));
        assert_eq!(rate_below(800.0, &thresholds), Some(Severity::Warning));
        assert_eq!(rate_below(100.0, &thresholds), Some(Severity::Critical));
    }

    #[test]
    fn severities_order_by_badness() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Notice);
    }
}
