// src/cli.rs

use clap::{ArgAction, Parser};
use git_topology::config::AnalysisConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract a code topology (history, complexity, hotspots) from a git repository", long_about = None)]
pub struct Args {
    /// Path to the git repository to analyze
    #[arg(short, long, default_value = ".")]
    pub repo: PathBuf,

    /// Directory to write topology.json and its companion files into
    #[arg(short, long, default_value = "topology")]
    pub output: PathBuf,

    /// TOML file with analysis settings; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON document to attach verbatim under `deepwiki`
    #[arg(long)]
    pub enrichment: Option<PathBuf>,

    /// Seconds before the git history read is abandoned
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Parser worker threads (defaults to the CPU count)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Only read this many of the most recent commits
    #[arg(long)]
    pub max_commits: Option<usize>,

    /// Write JSON without indentation
    #[arg(long)]
    pub compact: bool,

    /// No progress bars or summary, warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut AnalysisConfig) {
        if let Some(path) = &self.enrichment {
            config.enrichment = Some(path.clone());
        }
        if let Some(secs) = self.timeout {
            config.git_timeout_secs = secs;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
        if self.max_commits.is_some() {
            config.max_commits = self.max_commits;
        }
        config.compact |= self.compact;
        config.show_progress = !self.quiet;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from(["git-topology", "--repo", "/tmp/r", "--timeout", "5", "-j", "2", "--compact", "-q"]);
        let mut config = AnalysisConfig {
            max_commits: Some(10),
            ..AnalysisConfig::default()
        };
        args.apply(&mut config);
        assert_eq!(config.git_timeout_secs, 5);
        assert_eq!(config.jobs, Some(2));
        assert_eq!(config.max_commits, Some(10));
        assert!(config.compact);
        assert!(!config.show_progress);
    }

    #[test]
    fn defaults() {
        let args = Args::parse_from(["git-topology", "-vv"]);
        assert_eq!(args.repo, PathBuf::from("."));
        assert_eq!(args.output, PathBuf::from("topology"));
        assert_eq!(args.verbose, 2);
        assert!(args.config.is_none());
    }
}
