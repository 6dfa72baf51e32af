//! Phase identifiers and per-phase results

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The four pipeline phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    #[serde(rename = "phase1")]
    Discovery,
    #[serde(rename = "phase2")]
    Scraping,
    #[serde(rename = "phase3")]
    Loading,
    #[serde(rename = "phase4")]
    Classification,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Discovery,
        Phase::Scraping,
        Phase::Loading,
        Phase::Classification,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Phase::Discovery => 1,
            Phase::Scraping => 2,
            Phase::Loading => 3,
            Phase::Classification => 4,
        }
    }

    pub fn from_number(number: u8) -> Option<Phase> {
        Phase::ALL.into_iter().find(|phase| phase.number() == number)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Discovery => "Discovery",
            Phase::Scraping => "Scraping",
            Phase::Loading => "Loading",
            Phase::Classification => "Classification",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phase {} ({})", self.number(), self.name())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Phase::from_number)
            .ok_or_else(|| format!("invalid phase '{}': expected 1, 2, 3 or 4", s.trim()))
    }
}

/// Phases to run, in ascending order
///
/// `only` is an allow-list (all phases when `None`); `skip` is a deny-list
/// and wins over `only`.
pub fn select_phases(only: Option<&[Phase]>, skip: Option<&[Phase]>) -> Vec<Phase> {
    Phase::ALL
        .into_iter()
        .filter(|phase| only.map_or(true, |allowed| allowed.contains(phase)))
        .filter(|phase| !skip.map_or(false, |denied| denied.contains(phase)))
        .collect()
}

/// Counts produced by one phase for one vendor
///
/// In a dry run, `new` holds the amount of work the phase would have done.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub dry_run: bool,
    pub discovered: usize,
    pub new: usize,
    pub skipped: usize,
    pub scraped: usize,
    pub failed: usize,
    pub loaded: usize,
    pub classified: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PhaseResult {
    pub fn new(phase: Phase, dry_run: bool) -> Self {
        Self {
            phase,
            dry_run,
            discovered: 0,
            new: 0,
            skipped: 0,
            scraped: 0,
            failed: 0,
            loaded: 0,
            classified: 0,
            error: None,
        }
    }

    pub fn failed_with(phase: Phase, dry_run: bool, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(phase, dry_run)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// One-line summary for logs and the summary table
    pub fn describe(&self) -> String {
        if let Some(error) = &self.error {
            return format!("error: {}", error);
        }

        if self.dry_run {
            return format!("[dry run] {} to process", self.new);
        }

        match self.phase {
            Phase::Discovery => format!(
                "{} discovered, {} new, {} already known",
                self.discovered, self.new, self.skipped
            ),
            Phase::Scraping => format!(
                "{} scraped, {} failed, {} skipped",
                self.scraped, self.failed, self.skipped
            ),
            Phase::Loading => format!(
                "{} loaded, {} skipped, {} failed",
                self.loaded, self.skipped, self.failed
            ),
            Phase::Classification => {
                format!("{} classified, {} failed", self.classified, self.failed)
            }
        }
    }
}
