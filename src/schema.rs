// src/schema.rs

//! Output contract checks run before anything is written.

use crate::error::{Result, TopologyError};
use crate::topology::TopologyOutput;
use crate::tree;
use std::collections::HashSet;

fn unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

/// Every way `output` breaks the contract; empty when valid.
pub fn violations(output: &TopologyOutput) -> Vec<String> {
    let mut out = Vec::new();

    if output.version.trim().is_empty() {
        out.push("version is empty".to_string());
    }

    let mut paths: HashSet<&str> = HashSet::new();
    for file in &output.files {
        if !paths.insert(file.path.as_str()) {
            out.push(format!("duplicate file path {}", file.path));
        }
    }

    let leaves = tree::file_paths(&output.tree);
    if leaves.len() != output.files.len() {
        out.push(format!(
            "tree has {} file leaves but files[] has {} entries",
            leaves.len(),
            output.files.len()
        ));
    }
    for leaf in &leaves {
        if !paths.contains(leaf) {
            out.push(format!("tree leaf {leaf} is not in files[]"));
        }
    }

    let mut hashes: HashSet<&str> = HashSet::new();
    for commit in &output.commits {
        let raw = &commit.raw;
        if !hashes.insert(raw.hash.as_str()) {
            out.push(format!("duplicate commit {}", raw.hash));
        }
        if raw.is_merge != (raw.parents.len() > 1) {
            out.push(format!("commit {} merge flag disagrees with its parents", raw.hash));
        }
    }

    let mut ranked: HashSet<&str> = HashSet::new();
    for h in &output.hotspots {
        if !paths.contains(h.path.as_str()) {
            out.push(format!("hotspot {} is not in files[]", h.path));
        }
        if !ranked.insert(h.path.as_str()) {
            out.push(format!("hotspot {} listed twice", h.path));
        }
        if !unit_range(h.churn_rate) || !unit_range(h.risk_score) {
            out.push(format!(
                "hotspot {} has churnRate {} / riskScore {} outside [0, 1]",
                h.path, h.churn_rate, h.risk_score
            ));
        }
    }

    let mut pairs: HashSet<(&str, &str)> = HashSet::new();
    for c in &output.temporal_couplings {
        for path in [&c.file_a, &c.file_b] {
            if !paths.contains(path.as_str()) {
                out.push(format!("coupling references unknown file {path}"));
            }
        }
        if c.file_a >= c.file_b {
            out.push(format!("coupling pair {} / {} is not in canonical order", c.file_a, c.file_b));
        }
        if !pairs.insert((c.file_a.as_str(), c.file_b.as_str())) {
            out.push(format!("coupling pair {} / {} listed twice", c.file_a, c.file_b));
        }
        if !unit_range(c.coefficient) {
            out.push(format!("coupling {} / {} coefficient {} outside [0, 1]", c.file_a, c.file_b, c.coefficient));
        }
    }

    for share in &output.language_distribution {
        if !(share.percentage.is_finite() && (0.0..=100.0).contains(&share.percentage)) {
            out.push(format!("language {} percentage {} outside [0, 100]", share.language, share.percentage));
        }
    }

    if let Some(summary) = &output.contributor_summary {
        for p in &summary.contributors {
            let f = &p.facets;
            let facets = [f.energy, f.discipline, f.creativity, f.protectiveness, f.breadth, f.collaboration];
            if facets.iter().any(|&v| v > 100) {
                out.push(format!("contributor {} has a facet above 100", p.name));
            }
        }
    }

    if let Some(repo) = &output.repository {
        if repo.file_count as usize != output.files.len() {
            out.push(format!("repository.fileCount {} != {} files", repo.file_count, output.files.len()));
        }
        if repo.commit_count as usize != output.commits.len() {
            out.push(format!("repository.commitCount {} != {} commits", repo.commit_count, output.commits.len()));
        }
    }

    match serde_json::to_value(output).and_then(serde_json::from_value::<TopologyOutput>) {
        Ok(back) if &back == output => {}
        Ok(_) => out.push("artifact does not survive a JSON round trip".to_string()),
        Err(e) => out.push(format!("artifact does not serialize cleanly: {e}")),
    }

    out
}

pub fn validate(output: &TopologyOutput) -> Result<()> {
    let violations = violations(output);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(TopologyError::SchemaValidationFailed { violations })
    }
}

/// Parse `topology.json` text under the contract. Unknown enum values fail deserialization.
pub fn parse_and_validate(json: &str) -> Result<TopologyOutput> {
    let output: TopologyOutput = serde_json::from_str(json)?;
    validate(&output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::topology::VERSION;
    use chrono::{DateTime, TimeZone, Utc};

    fn sample() -> TopologyOutput {
        let date = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+02:00").unwrap();
        let file = |path: &str, complexity| FileRecord {
            path: path.into(),
            hash: "0123abcd".into(),
            language: "typescript".into(),
            complexity,
            loc: 10,
            last_modified: date,
            author: "Ada".into(),
            difficulty: DifficultyTier::Trivial,
        };
        let commit = ClassifiedCommit {
            raw: RawCommit {
                hash: "c1".into(),
                parents: vec!["c0".into()],
                message: "fix: correct off-by-one".into(),
                author: "Ada".into(),
                author_email: "ada@example.com".into(),
                date,
                files_changed: vec!["src/a.ts".into(), "src/b.ts".into()],
                insertions: 3,
                deletions: 1,
                is_merge: false,
            },
            kind: CommitType::Fix,
            scope: None,
            is_breaking: false,
            confidence: Confidence::High,
        };
        let paths = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];
        TopologyOutput {
            version: VERSION.into(),
            analyzed_at: Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
            repository: None,
            files: vec![file("src/a.ts", 1), file("src/b.ts", 6)],
            commits: vec![commit],
            tree: crate::tree::build_tree("repo", &paths),
            hotspots: vec![Hotspot {
                path: "src/b.ts".into(),
                change_count: 1,
                churn_rate: 1.0,
                complexity: 6,
                risk_score: 1.0,
            }],
            temporal_couplings: vec![TemporalCoupling {
                file_a: "src/a.ts".into(),
                file_b: "src/b.ts".into(),
                co_change_count: 3,
                coefficient: 1.0 / 3.0,
            }],
            contributor_summary: None,
            language_distribution: vec![],
            deepwiki: Some(serde_json::json!({ "overview": "text", "pages": [1, 2] })),
        }
    }

    #[test]
    fn sample_is_valid_and_round_trips() {
        let output = sample();
        assert!(violations(&output).is_empty(), "{:?}", violations(&output));
        let text = serde_json::to_string_pretty(&output).unwrap();
        let back = parse_and_validate(&text).unwrap();
        assert_eq!(back, output);
    }

    #[test]
    fn json_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("analyzedAt").is_some());
        assert_eq!(value["commits"][0]["type"], "fix");
        assert_eq!(value["commits"][0]["confidence"], "high");
        assert_eq!(value["commits"][0]["isMerge"], false);
        assert_eq!(value["commits"][0]["filesChanged"][1], "src/b.ts");
        assert!(value["commits"][0].get("scope").is_none());
        assert_eq!(value["hotspots"][0]["riskScore"], 1.0);
        assert_eq!(value["temporalCouplings"][0]["fileA"], "src/a.ts");
        assert_eq!(value["files"][0]["difficulty"], "trivial");
        assert_eq!(value["tree"]["type"], "directory");
        assert!(value.get("repository").is_none());
    }

    #[test]
    fn referential_and_range_violations() {
        let mut output = sample();
        output.hotspots[0].path = "nope.ts".into();
        output.hotspots[0].risk_score = 1.5;
        output.temporal_couplings.push(TemporalCoupling {
            file_a: "src/b.ts".into(),
            file_b: "src/a.ts".into(),
            co_change_count: 3,
            coefficient: f64::NAN,
        });
        let v = violations(&output);
        assert!(v.iter().any(|m| m.contains("hotspot nope.ts is not in files[]")));
        assert!(v.iter().any(|m| m.contains("outside [0, 1]")));
        assert!(v.iter().any(|m| m.contains("canonical order")));
        assert!(matches!(validate(&output), Err(TopologyError::SchemaValidationFailed { .. })));
    }

    #[test]
    fn tree_must_match_files() {
        let mut output = sample();
        output.tree = crate::tree::build_tree("repo", &["src/a.ts".to_string()]);
        let v = violations(&output);
        assert!(v.iter().any(|m| m.contains("file leaves")));

        let mut dup = sample();
        dup.files[1].path = "src/a.ts".into();
        assert!(violations(&dup).iter().any(|m| m.contains("duplicate file path")));
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let text = serde_json::to_string(&sample()).unwrap().replace("\"fix\"", "\"bugfix\"");
        let err = parse_and_validate(&text).unwrap_err();
        assert!(matches!(err, TopologyError::Json(_)));

        let text = serde_json::to_string(&sample()).unwrap().replace("\"trivial\"", "\"easy\"");
        assert!(parse_and_validate(&text).is_err());
    }
}
