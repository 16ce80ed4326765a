// src/config.rs

use crate::error::{Result, TopologyError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;
pub const DEFAULT_MAX_HOTSPOTS: usize = 50;

/// Paths dropped from the HEAD file list before parsing
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    r"(^|/)node_modules/",
    r"(^|/)dist/",
    r"(^|/)build/",
    r"(^|/)coverage/",
    r"(^|/)\.next/",
    r"(^|/)vendor/",
    r"\.min\.(js|css)$",
    r"\.d\.ts$",
    r"(^|/)(package-lock\.json|yarn\.lock|pnpm-lock\.yaml|bun\.lockb|Cargo\.lock)$",
];

/// Cut points between difficulty tiers; a score below `moderate` is trivial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub moderate: u32,
    pub complex: u32,
    pub extreme: u32,
}

impl TierThresholds {
    pub const TRIVIAL_BELOW: u32 = 10;
    pub const MODERATE_BELOW: u32 = 30;
    pub const COMPLEX_BELOW: u32 = 80;
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            moderate: Self::TRIVIAL_BELOW,
            complex: Self::MODERATE_BELOW,
            extreme: Self::COMPLEX_BELOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub churn: f64,
    pub complexity: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            churn: 0.5,
            complexity: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouplingConfig {
    /// Pairs changed together fewer times than this are noise
    pub min_co_changes: u32,
    pub min_coefficient: f64,
    /// Commits touching more files than this (mass renames, formatting sweeps) are skipped
    pub max_commit_files: usize,
    pub max_couplings: Option<usize>,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            min_co_changes: 3,
            min_coefficient: 0.3,
            max_commit_files: 50,
            max_couplings: Some(100),
        }
    }
}

/// Every tunable of a run. Loaded from TOML, then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub git_timeout_secs: u64,
    pub max_commits: Option<usize>,
    /// Worker threads for parsing; defaults to the CPU count
    pub jobs: Option<usize>,
    pub max_file_bytes: u64,
    pub ignore: Vec<String>,
    pub tiers: TierThresholds,
    pub risk: RiskWeights,
    pub coupling: CouplingConfig,
    pub max_hotspots: Option<usize>,
    /// Write JSON without pretty-printing
    pub compact: bool,
    /// JSON document attached verbatim under `deepwiki`
    pub enrichment: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            max_commits: None,
            jobs: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            ignore: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            tiers: TierThresholds::default(),
            risk: RiskWeights::default(),
            coupling: CouplingConfig::default(),
            max_hotspots: Some(DEFAULT_MAX_HOTSPOTS),
            compact: false,
            enrichment: None,
            show_progress: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AnalysisConfig =
            toml::from_str(text).map_err(|e| TopologyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn jobs(&self) -> usize {
        self.jobs.filter(|&n| n > 0).unwrap_or_else(num_cpus::get)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tiers;
        if !(t.moderate <= t.complex && t.complex <= t.extreme) {
            return Err(TopologyError::Config(format!(
                "tier thresholds must be ascending, got {}/{}/{}",
                t.moderate, t.complex, t.extreme
            )));
        }
        let w = &self.risk;
        if !(w.churn.is_finite() && w.complexity.is_finite() && w.churn >= 0.0 && w.complexity >= 0.0) {
            return Err(TopologyError::Config("risk weights must be finite and non-negative".into()));
        }
        let c = &self.coupling;
        if !(0.0..=1.0).contains(&c.min_coefficient) {
            return Err(TopologyError::Config(format!(
                "coupling.min_coefficient must be within [0, 1], got {}",
                c.min_coefficient
            )));
        }
        if self.git_timeout_secs == 0 {
            return Err(TopologyError::Config("git_timeout_secs must be positive".into()));
        }
        for pattern in &self.ignore {
            regex::Regex::new(pattern)
                .map_err(|e| TopologyError::Config(format!("bad ignore pattern {pattern:?}: {e}")))?;
        }
        Ok(())
    }
}
