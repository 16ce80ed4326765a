// src/model.rs

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Full hex object id of a commit
pub type CommitHash = String;

/// Maps a repo-relative path to the number of (non-merge) commits that touched it
pub type ChurnMap = HashMap<String, u32>;

/// A commit exactly as read from history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCommit {
    pub hash: CommitHash,
    #[serde(default)]
    pub parents: Vec<CommitHash>,
    pub message: String,
    pub author: String,
    #[serde(default)]
    pub author_email: String,
    /// Authored time, keeping the author's UTC offset
    pub date: DateTime<FixedOffset>,
    pub files_changed: Vec<String>,
    pub insertions: u64,
    pub deletions: u64,
    pub is_merge: bool,
}

impl RawCommit {
    /// First line of the message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Semantic commit type. Closed set: anything else is rejected at the schema boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitType {
    Feature,
    Fix,
    Refactor,
    Docs,
    Chore,
    Style,
    Test,
    Build,
    Revert,
    Unknown,
}

impl CommitType {
    pub const ALL: [CommitType; 10] = [
        CommitType::Feature,
        CommitType::Fix,
        CommitType::Refactor,
        CommitType::Docs,
        CommitType::Chore,
        CommitType::Style,
        CommitType::Test,
        CommitType::Build,
        CommitType::Revert,
        CommitType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitType::Feature => "feature",
            CommitType::Fix => "fix",
            CommitType::Refactor => "refactor",
            CommitType::Docs => "docs",
            CommitType::Chore => "chore",
            CommitType::Style => "style",
            CommitType::Test => "test",
            CommitType::Build => "build",
            CommitType::Revert => "revert",
            CommitType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

/// A raw commit plus its inferred semantics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedCommit {
    #[serde(flatten)]
    pub raw: RawCommit,
    #[serde(rename = "type")]
    pub kind: CommitType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub is_breaking: bool,
    #[serde(default)]
    pub confidence: Confidence,
}

/// Why a file carries no structural parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StubReason {
    Binary,
    Unreadable,
    TooLarge,
    /// Recognised language we do not parse (markdown, json, ...)
    NoGrammar,
    UnknownLanguage,
    Unparseable,
}

impl StubReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StubReason::Binary => "binary",
            StubReason::Unreadable => "unreadable",
            StubReason::TooLarge => "too-large",
            StubReason::NoGrammar => "no-grammar",
            StubReason::UnknownLanguage => "unknown-language",
            StubReason::Unparseable => "unparseable",
        }
    }
}

/// One function located by the source parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Branching constructs inside the body, nested functions excluded
    pub branches: u32,
    /// Cognitive weight: each conditional or loop costs one more per enclosing block
    pub cognitive: u32,
    pub nesting_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    Parsed(Vec<FunctionSpan>),
    Stub(StubReason),
}

/// A file at HEAD after the source parser has looked at it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: String,
    /// Git blob id at HEAD
    pub hash: String,
    pub language: String,
    pub loc: usize,
    pub structure: Structure,
}

impl ParsedFile {
    pub fn stub_reason(&self) -> Option<StubReason> {
        match self.structure {
            Structure::Stub(reason) => Some(reason),
            Structure::Parsed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionComplexity {
    pub name: String,
    pub file: String,
    pub start_line: usize,
    pub end_line: usize,
    pub loc: usize,
    pub complexity: u32,
    pub cognitive: u32,
    pub nesting_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    Trivial,
    Moderate,
    Complex,
    Extreme,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplexity {
    pub path: String,
    pub language: String,
    pub complexity: u32,
    pub cognitive: u32,
    pub difficulty: DifficultyTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stub: Option<StubReason>,
    #[serde(default)]
    pub functions: Vec<FunctionComplexity>,
}

/// Entry of the topology `files[]` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub path: String,
    pub hash: String,
    pub language: String,
    pub complexity: u32,
    pub loc: u64,
    pub last_modified: DateTime<FixedOffset>,
    pub author: String,
    pub difficulty: DifficultyTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub path: String,
    pub change_count: u32,
    /// Changes relative to the most-changed file, in [0, 1]
    pub churn_rate: f64,
    pub complexity: u32,
    pub risk_score: f64,
}

/// Two files that tend to change in the same commits. `file_a < file_b` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalCoupling {
    pub file_a: String,
    pub file_b: String,
    pub co_change_count: u32,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Archetype {
    Architect,
    Firefighter,
    Documenter,
    Maintainer,
    Generalist,
}

/// Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeArchetype {
    NightOwl,
    EarlyBird,
    NineToFive,
    Evening,
}

/// Personality facets, each 0..=100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorFacets {
    pub energy: u8,
    pub discipline: u8,
    pub creativity: u8,
    pub protectiveness: u8,
    pub breadth: u8,
    pub collaboration: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorProfile {
    pub name: String,
    pub email: String,
    pub commit_count: u32,
    pub merge_count: u32,
    pub insertions: u64,
    pub deletions: u64,
    pub files_touched: u32,
    pub first_commit: DateTime<FixedOffset>,
    pub last_commit: DateTime<FixedOffset>,
    /// Local hour (0-23) with the most commits
    pub peak_hour: u8,
    pub type_distribution: BTreeMap<CommitType, u32>,
    pub facets: ContributorFacets,
    pub archetype: Archetype,
    pub time_archetype: TimeArchetype,
}

impl ContributorProfile {
    pub fn net_churn(&self) -> i64 {
        self.insertions as i64 - self.deletions as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorSummary {
    pub total_contributors: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_contributor: Option<String>,
    pub archetype_distribution: BTreeMap<Archetype, u32>,
    pub contributors: Vec<ContributorProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// Purely structural; analysis data is joined by path downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub name: String,
    pub head_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub file_count: u32,
    pub commit_count: u32,
    pub contributor_count: u32,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageShare {
    pub language: String,
    pub file_count: u32,
    pub loc_total: u64,
    /// Share of files, 0-100 with one decimal
    pub percentage: f64,
}
