// src/classifier.rs

//! Commit message classification.
//!
//! Three tiers, first hit wins:
//! 1. Conventional-commit header on the first line (`type(scope)!: subject`) -> high confidence
//! 2. The ordered [`heuristic_rules`] table over the full message and changed files -> medium
//! 3. Nothing matched -> `unknown`, low confidence

use crate::model::*;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

static CONVENTIONAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<type>[A-Za-z]+)(?:\((?P<scope>[^()\r\n]*)\))?(?P<bang>!)?:\s*\S").expect("valid regex")
});
static GIT_REVERT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^Revert ""#).expect("valid regex"));
static BREAKING_FOOTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^BREAKING[ -]CHANGE:").expect("valid regex"));
static DOCS_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|/)docs?/|\.(md|mdx|markdown|rst|adoc|txt)$|(^|/)(readme|changelog|license|contributing)[^/]*$")
        .expect("valid regex")
});

/// What a heuristic rule looks at
#[derive(Debug)]
pub enum RuleMatch {
    /// Regex over the full commit message
    Message(Regex),
    /// Every changed file is documentation
    DocsOnlyFiles,
}

#[derive(Debug)]
pub struct Rule {
    pub name: &'static str,
    pub kind: CommitType,
    pub matcher: RuleMatch,
}

impl Rule {
    fn message(name: &'static str, kind: CommitType, pattern: &str) -> Self {
        Rule {
            name,
            kind,
            matcher: RuleMatch::Message(Regex::new(pattern).expect("valid regex")),
        }
    }

    pub fn matches(&self, message: &str, files: &[String]) -> bool {
        match &self.matcher {
            RuleMatch::Message(re) => re.is_match(message),
            RuleMatch::DocsOnlyFiles => !files.is_empty() && files.iter().all(|f| DOCS_PATH_RE.is_match(f)),
        }
    }
}

static HEURISTIC_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::message("revert", CommitType::Revert, r"(?i)\b(revert(s|ed|ing)?|roll(ed)?[ -]?back|undo)\b"),
        Rule {
            name: "docs-only-files",
            kind: CommitType::Docs,
            matcher: RuleMatch::DocsOnlyFiles,
        },
        Rule::message(
            "fix",
            CommitType::Fix,
            r"(?i)\b(fix(es|ed|ing)?|bugs?|bugfix|hotfix|patch(es|ed)?|resolve[sd]?|crash(es|ed)?|regression)\b",
        ),
        Rule::message("test", CommitType::Test, r"(?i)\b(tests?|testing|specs?|coverage|mocks?)\b"),
        Rule::message("docs", CommitType::Docs, r"(?i)\b(docs?|documentation|readme|changelog|typos?)\b"),
        Rule::message(
            "style",
            CommitType::Style,
            r"(?i)\b(style[sd]?|format(s|ted|ting)?|lint(s|ed|ing)?|whitespace|prettier|rustfmt|clippy)\b",
        ),
        Rule::message(
            "refactor",
            CommitType::Refactor,
            r"(?i)\b(refactor(s|ed|ing)?|restructur(e|ed|ing)|reorganiz(e|ed|ing)|clean(ed)?[ -]?up|simplif(y|ied|ies)|rename[sd]?|optimi[sz](e|ed|ation)|perf(ormance)?)\b",
        ),
        Rule::message(
            "build",
            CommitType::Build,
            r"(?i)\b(build|ci|deps?|dependenc(y|ies)|bump(s|ed)?|upgrade[sd]?|dockerfile|makefile|workflows?)\b",
        ),
        Rule::message(
            "feature",
            CommitType::Feature,
            r"(?i)\b(feat(ure)?s?|add(s|ed|ing)?|implement(s|ed|ing)?|introduce[sd]?|create[sd]?)\b",
        ),
        Rule::message("chore", CommitType::Chore, r"(?i)\b(chore|release[sd]?|version|config(ure|uration)?|wip)\b"),
    ]
});

/// The medium-confidence decision table, in evaluation order.
pub fn heuristic_rules() -> &'static [Rule] {
    &HEURISTIC_RULES
}

/// First heuristic rule that fires for this message/file set
pub fn first_matching_rule(message: &str, files: &[String]) -> Option<&'static Rule> {
    heuristic_rules().iter().find(|rule| rule.matches(message, files))
}

/// Map a conventional-commit type token to our closed set.
pub fn conventional_type(token: &str) -> Option<CommitType> {
    match token.to_ascii_lowercase().as_str() {
        "feat" | "feature" => Some(CommitType::Feature),
        "fix" | "bugfix" | "hotfix" => Some(CommitType::Fix),
        "refactor" | "perf" => Some(CommitType::Refactor),
        "docs" | "doc" => Some(CommitType::Docs),
        "chore" => Some(CommitType::Chore),
        "style" => Some(CommitType::Style),
        "test" | "tests" => Some(CommitType::Test),
        "build" | "ci" | "deps" => Some(CommitType::Build),
        "revert" => Some(CommitType::Revert),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: CommitType,
    pub scope: Option<String>,
    pub is_breaking: bool,
    pub confidence: Confidence,
}

pub fn classify_message(message: &str, files: &[String]) -> Classification {
    let first_line = message.lines().next().unwrap_or("").trim();
    let footer_breaking = BREAKING_FOOTER_RE.is_match(message);

    if let Some(caps) = CONVENTIONAL_RE.captures(first_line) {
        if let Some(kind) = conventional_type(&caps["type"]) {
            let scope = caps
                .name("scope")
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty());
            return Classification {
                kind,
                scope,
                is_breaking: caps.name("bang").is_some() || footer_breaking,
                confidence: Confidence::High,
            };
        }
    }

    if GIT_REVERT_RE.is_match(first_line) {
        return Classification {
            kind: CommitType::Revert,
            scope: None,
            is_breaking: footer_breaking,
            confidence: Confidence::High,
        };
    }

    match first_matching_rule(message, files) {
        Some(rule) => Classification {
            kind: rule.kind,
            scope: None,
            is_breaking: footer_breaking,
            confidence: Confidence::Medium,
        },
        None => Classification {
            kind: CommitType::Unknown,
            scope: None,
            is_breaking: footer_breaking,
            confidence: Confidence::Low,
        },
    }
}

pub fn classify(raw: &RawCommit) -> ClassifiedCommit {
    let Classification {
        kind,
        scope,
        is_breaking,
        confidence,
    } = classify_message(&raw.message, &raw.files_changed);
    ClassifiedCommit {
        raw: raw.clone(),
        kind,
        scope,
        is_breaking,
        confidence,
    }
}

/// Classify on the current rayon pool. Output order matches input order.
pub fn classify_all(commits: &[RawCommit]) -> Vec<ClassifiedCommit> {
    commits.par_iter().map(classify).collect()
}
