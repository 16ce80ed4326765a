// src/pipeline.rs

use crate::classifier;
use crate::complexity;
use crate::config::AnalysisConfig;
use crate::contributors;
use crate::error::{Result, TopologyError};
use crate::history;
use crate::hotspot;
use crate::model::*;
use crate::parser;
use crate::schema;
use crate::topology::{self, ComplexityReport, TopologyOutput, VERSION};
use crate::tree;
use chrono::Utc;
use indicatif::ProgressBar;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const TOPOLOGY_FILE: &str = "topology.json";
pub const COMPLEXITY_FILE: &str = "complexity.json";
pub const COMMITS_FILE: &str = "commits.json";
pub const HOTSPOTS_FILE: &str = "hotspots.json";
pub const CONTRIBUTORS_FILE: &str = "contributors.json";

/// What a run had to degrade on instead of failing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradationReport {
    pub stubs: BTreeMap<StubReason, u32>,
    pub unknown_commits: u32,
    pub low_confidence_commits: u32,
}

impl DegradationReport {
    pub fn collect(files: &[ParsedFile], commits: &[ClassifiedCommit]) -> Self {
        let mut report = DegradationReport::default();
        for reason in files.iter().filter_map(ParsedFile::stub_reason) {
            *report.stubs.entry(reason).or_insert(0) += 1;
        }
        for commit in commits {
            report.unknown_commits += u32::from(commit.kind == CommitType::Unknown);
            report.low_confidence_commits += u32::from(commit.confidence == Confidence::Low);
        }
        report
    }

    pub fn stubbed_files(&self) -> u32 {
        self.stubs.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.stubbed_files() == 0 && self.unknown_commits == 0 && self.low_confidence_commits == 0
    }
}

impl fmt::Display for DegradationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stubbed file(s)", self.stubbed_files())?;
        if !self.stubs.is_empty() {
            let parts: Vec<String> = self.stubs.iter().map(|(r, n)| format!("{}: {n}", r.as_str())).collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        write!(
            f,
            ", {} unknown commit(s), {} low-confidence commit(s)",
            self.unknown_commits, self.low_confidence_commits
        )
    }
}

/// The artifacts, assembled and validated but not yet written
#[derive(Debug, Clone)]
pub struct Analysis {
    pub topology: TopologyOutput,
    pub complexity: ComplexityReport,
    pub degradation: DegradationReport,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every artifact written, `topology.json` first
    pub written: Vec<PathBuf>,
    pub files: usize,
    pub commits: usize,
    pub hotspots: usize,
    pub couplings: usize,
    pub degradation: DegradationReport,
    pub elapsed: Duration,
}

pub fn compile_ignore(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| TopologyError::Config(format!("bad ignore pattern {p:?}: {e}"))))
        .collect()
}

/// Read the enrichment document. A missing or malformed file is logged and skipped.
pub fn load_enrichment(path: &Path) -> Option<serde_json::Value> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "enrichment file unreadable, skipping");
            return None;
        }
    };
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(serde_json::Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "enrichment file is not JSON, skipping");
            None
        }
    }
}

fn repository_name(repo_path: &Path) -> String {
    repo_path
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .or_else(|| repo_path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "repository".to_string())
}

fn progress_bar(len: usize, message: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_message(message);
    bar
}

/// Run every stage and build the artifacts in memory. Nothing touches the output directory.
pub fn analyze(repo_path: &Path, config: &AnalysisConfig) -> Result<Analysis> {
    config.validate()?;
    let ignore = compile_ignore(&config.ignore)?;

    // 1. Open the repository and list HEAD
    let step = Instant::now();
    let repo = history::open_repository(repo_path)?;
    let head = history::resolve_head(&repo, repo_path)?;
    let entries = parser::discover_files(&repo, repo_path, &ignore)?;
    drop(repo);
    info!(step = "discover", files = entries.len(), head = %head.id, elapsed_ms = step.elapsed().as_millis() as u64, "HEAD listed");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs())
        .build()
        .map_err(|e| TopologyError::Config(format!("cannot build worker pool: {e}")))?;
    let timeout = Duration::from_secs(config.git_timeout_secs);
    let bar = progress_bar(entries.len(), "Parsing files", config.show_progress);

    // 2. History and parsing are independent
    let step = Instant::now();
    let (history, parsed) = rayon::join(
        || history::read_history(repo_path, &head, config.max_commits, timeout),
        || pool.install(|| parser::parse_files(&entries, repo_path, config.max_file_bytes, &bar)),
    );
    bar.finish_and_clear();
    let history = history?;
    info!(
        step = "read",
        commits = history.commits.len(),
        parsed = parsed.len(),
        elapsed_ms = step.elapsed().as_millis() as u64,
        "history and sources read"
    );

    // 3. Classify commits
    let commits = pool.install(|| classifier::classify_all(&history.commits));

    // 4. Complexity
    let complexity = pool.install(|| complexity::analyze_all(&parsed, &config.tiers));

    // 5. Hotspots and coupling
    let hotspots = hotspot::detect_hotspots(&history.churn, &complexity, &config.risk, config.max_hotspots);
    let known: HashSet<&str> = parsed.iter().map(|f| f.path.as_str()).collect();
    let couplings = hotspot::detect_couplings(&history.commits, &known, &config.coupling);
    debug!(hotspots = hotspots.len(), couplings = couplings.len(), "risk ranked");

    // 6. Contributors
    let summary = contributors::summarize(contributors::profile_contributors(&commits));

    // 7. Tree and assembly
    let name = repository_name(repo_path);
    let paths: Vec<String> = parsed.iter().map(|f| f.path.clone()).collect();
    let file_tree = tree::build_tree(&name, &paths);
    let languages = topology::language_distribution(&parsed);
    let files = topology::file_records(&parsed, &complexity, &history.commits);
    let repository = topology::repository_info(
        &name,
        &head,
        &files,
        commits.len(),
        summary.contributors.len(),
        &languages,
    );
    let deepwiki = config.enrichment.as_deref().and_then(load_enrichment);
    let degradation = DegradationReport::collect(&parsed, &commits);

    let output = TopologyOutput {
        version: VERSION.to_string(),
        analyzed_at: Utc::now(),
        repository: Some(repository),
        files,
        commits,
        tree: file_tree,
        hotspots,
        temporal_couplings: couplings,
        contributor_summary: Some(summary),
        language_distribution: languages,
        deepwiki,
    };

    // 8. Validate before anything is written
    schema::validate(&output)?;
    Ok(Analysis {
        topology: output,
        complexity: ComplexityReport::new(complexity),
        degradation,
    })
}

fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String> {
    let text = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(text)
}

/// Write `topology.json`, `complexity.json` and the companion files cut from the topology.
/// The directory is created only once every document has serialized.
pub fn write_outputs(analysis: &Analysis, output_dir: &Path, compact: bool) -> Result<Vec<PathBuf>> {
    let topology = &analysis.topology;
    let documents = [
        (TOPOLOGY_FILE, to_json(topology, compact)?),
        (COMPLEXITY_FILE, to_json(&analysis.complexity, compact)?),
        (COMMITS_FILE, to_json(&topology.commits, compact)?),
        (HOTSPOTS_FILE, to_json(&topology.hotspot_report(), compact)?),
        (CONTRIBUTORS_FILE, to_json(&topology.contributor_report(), compact)?),
    ];

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TopologyError::Io { path, source }
    };
    std::fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;

    let mut written = Vec::with_capacity(documents.len());
    for (name, json) in documents {
        let path = output_dir.join(name);
        std::fs::write(&path, json).map_err(io_err(&path))?;
        debug!(path = %path.display(), "artifact written");
        written.push(path);
    }
    Ok(written)
}

/// Analyze `repo_path` and write every artifact into `output_dir`.
pub fn run(repo_path: &Path, output_dir: &Path, config: &AnalysisConfig) -> Result<RunReport> {
    let started = Instant::now();
    let analysis = analyze(repo_path, config)?;
    let written = write_outputs(&analysis, output_dir, config.compact)?;

    let report = RunReport {
        written,
        files: analysis.topology.files.len(),
        commits: analysis.topology.commits.len(),
        hotspots: analysis.topology.hotspots.len(),
        couplings: analysis.topology.temporal_couplings.len(),
        degradation: analysis.degradation,
        elapsed: started.elapsed(),
    };
    info!(
        step = "write",
        files = report.files,
        commits = report.commits,
        degradation = %report.degradation,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "topology written"
    );
    Ok(report)
}
