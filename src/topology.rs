// src/topology.rs

//! The output artifacts and the pure functions that assemble them.

use crate::history::HeadRef;
use crate::model::*;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const VERSION: &str = "1.0.0";

/// `topology.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyOutput {
    pub version: String,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    pub files: Vec<FileRecord>,
    pub commits: Vec<ClassifiedCommit>,
    pub tree: TreeNode,
    pub hotspots: Vec<Hotspot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal_couplings: Vec<TemporalCoupling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor_summary: Option<ContributorSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language_distribution: Vec<LanguageShare>,
    /// Enrichment payload, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deepwiki: Option<serde_json::Value>,
}

/// `complexity.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub version: String,
    pub files: Vec<FileComplexity>,
}

impl ComplexityReport {
    pub fn new(files: Vec<FileComplexity>) -> Self {
        ComplexityReport {
            version: VERSION.to_string(),
            files,
        }
    }
}

/// `hotspots.json`, cut from a validated topology
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotReport<'a> {
    pub version: &'a str,
    pub hotspots: &'a [Hotspot],
    pub temporal_couplings: &'a [TemporalCoupling],
}

/// `contributors.json`
#[derive(Debug, Clone, Serialize)]
pub struct ContributorReport<'a> {
    pub version: &'a str,
    pub contributors: &'a [ContributorProfile],
}

impl TopologyOutput {
    pub fn hotspot_report(&self) -> HotspotReport<'_> {
        HotspotReport {
            version: &self.version,
            hotspots: &self.hotspots,
            temporal_couplings: &self.temporal_couplings,
        }
    }

    pub fn contributor_report(&self) -> ContributorReport<'_> {
        ContributorReport {
            version: &self.version,
            contributors: self
                .contributor_summary
                .as_ref()
                .map(|s| s.contributors.as_slice())
                .unwrap_or_default(),
        }
    }
}

/// Per-language file and line totals, largest share first.
pub fn language_distribution(files: &[ParsedFile]) -> Vec<LanguageShare> {
    let mut by_language: BTreeMap<&str, (u32, u64)> = BTreeMap::new();
    for file in files {
        let entry = by_language.entry(file.language.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += file.loc as u64;
    }

    let total = files.len().max(1) as f64;
    let mut shares: Vec<LanguageShare> = by_language
        .into_iter()
        .map(|(language, (file_count, loc_total))| LanguageShare {
            language: language.to_string(),
            file_count,
            loc_total,
            percentage: (f64::from(file_count) / total * 1000.0).round() / 10.0,
        })
        .collect();
    // Stable sort keeps the BTreeMap's alphabetical order among equal counts.
    shares.sort_by(|a, b| b.file_count.cmp(&a.file_count));
    shares
}

/// Join parse results, complexity and history into `files[]` records.
///
/// `last_modified`/`author` come from the newest commit touching the file. Files no commit
/// mentions fall back to the newest commit overall, or the epoch and an empty author.
pub fn file_records(parsed: &[ParsedFile], complexity: &[FileComplexity], commits: &[RawCommit]) -> Vec<FileRecord> {
    let mut last_touch: HashMap<&str, &RawCommit> = HashMap::new();
    for commit in commits {
        for path in &commit.files_changed {
            last_touch.entry(path.as_str()).or_insert(commit);
        }
    }
    let scores: HashMap<&str, &FileComplexity> = complexity.iter().map(|c| (c.path.as_str(), c)).collect();
    let epoch: DateTime<FixedOffset> = DateTime::<Utc>::default().into();
    let fallback = commits.first();

    parsed
        .iter()
        .map(|file| {
            let touch = last_touch.get(file.path.as_str()).copied().or(fallback);
            let score = scores.get(file.path.as_str());
            FileRecord {
                path: file.path.clone(),
                hash: file.hash.clone(),
                language: file.language.clone(),
                complexity: score.map_or(0, |s| s.complexity),
                loc: file.loc as u64,
                last_modified: touch.map_or(epoch, |c| c.date),
                author: touch.map_or_else(String::new, |c| c.author.clone()),
                difficulty: score.map_or(DifficultyTier::Trivial, |s| s.difficulty),
            }
        })
        .collect()
}

pub fn repository_info(
    name: &str,
    head: &HeadRef,
    files: &[FileRecord],
    commit_count: usize,
    contributor_count: usize,
    languages: &[LanguageShare],
) -> RepositoryInfo {
    RepositoryInfo {
        name: name.to_string(),
        head_hash: head.id.clone(),
        branch: head.branch.clone(),
        file_count: files.len() as u32,
        commit_count: commit_count as u32,
        contributor_count: contributor_count as u32,
        languages: languages.iter().map(|l| l.language.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(path: &str, language: &str, loc: usize) -> ParsedFile {
        ParsedFile {
            path: path.into(),
            hash: format!("blob-{path}"),
            language: language.into(),
            loc,
            structure: Structure::Parsed(vec![]),
        }
    }

    fn raw(hash: &str, author: &str, date: &str, files: &[&str]) -> RawCommit {
        RawCommit {
            hash: hash.into(),
            parents: vec![],
            message: "m".into(),
            author: author.into(),
            author_email: String::new(),
            date: DateTime::parse_from_rfc3339(date).unwrap(),
            files_changed: files.iter().map(|f| f.to_string()).collect(),
            insertions: 0,
            deletions: 0,
            is_merge: false,
        }
    }

    #[test]
    fn distribution_percentages() {
        let files = vec![
            parsed("a.ts", "typescript", 10),
            parsed("b.ts", "typescript", 30),
            parsed("c.rs", "rust", 5),
        ];
        let dist = language_distribution(&files);
        assert_eq!(dist[0].language, "typescript");
        assert_eq!(dist[0].file_count, 2);
        assert_eq!(dist[0].loc_total, 40);
        assert_eq!(dist[0].percentage, 66.7);
        assert_eq!(dist[1].percentage, 33.3);
        assert!(language_distribution(&[]).is_empty());
    }

    #[test]
    fn records_use_newest_touching_commit() {
        let files = vec![parsed("a.ts", "typescript", 10), parsed("untouched.ts", "typescript", 1)];
        let commits = vec![
            raw("c2", "Bea", "2024-02-02T00:00:00Z", &["other.ts"]),
            raw("c1", "Ada", "2024-01-01T00:00:00Z", &["a.ts"]),
            raw("c0", "Old", "2023-01-01T00:00:00Z", &["a.ts"]),
        ];
        let records = file_records(&files, &[], &commits);
        assert_eq!(records[0].author, "Ada");
        assert_eq!(records[0].last_modified.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(records[0].hash, "blob-a.ts");
        assert_eq!(records[0].loc, 10);
        assert_eq!(records[1].author, "Bea");

        let lonely = file_records(&files, &[], &[]);
        assert_eq!(lonely[0].author, "");
        assert_eq!(lonely[0].last_modified.timestamp(), 0);
        assert_eq!(lonely[0].difficulty, DifficultyTier::Trivial);
    }

    #[test]
    fn companion_reports_carry_the_version() {
        let output = TopologyOutput {
            version: VERSION.into(),
            analyzed_at: Utc::now(),
            repository: None,
            files: vec![],
            commits: vec![],
            tree: crate::tree::build_tree("r", &[]),
            hotspots: vec![],
            temporal_couplings: vec![],
            contributor_summary: None,
            language_distribution: vec![],
            deepwiki: None,
        };
        let hotspots = serde_json::to_value(output.hotspot_report()).unwrap();
        assert_eq!(
            hotspots,
            serde_json::json!({ "version": VERSION, "hotspots": [], "temporalCouplings": [] })
        );
        let contributors = serde_json::to_value(output.contributor_report()).unwrap();
        assert_eq!(contributors, serde_json::json!({ "version": VERSION, "contributors": [] }));
    }
}
