// src/hotspot.rs

use crate::config::{CouplingConfig, RiskWeights};
use crate::model::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

fn normalized(value: u32, max: u32) -> f64 {
    if max == 0 {
        0.0
    } else {
        f64::from(value) / f64::from(max)
    }
}

pub fn risk_score(churn_rate: f64, complexity_norm: f64, weights: &RiskWeights) -> f64 {
    let score = weights.churn * churn_rate + weights.complexity * complexity_norm;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Rank changed files by combined churn and complexity, riskiest first.
///
/// Only files present in `files` are ranked, and only those changed at least once.
pub fn detect_hotspots(
    churn: &ChurnMap,
    files: &[FileComplexity],
    weights: &RiskWeights,
    limit: Option<usize>,
) -> Vec<Hotspot> {
    let max_churn = files
        .iter()
        .filter_map(|f| churn.get(&f.path).copied())
        .max()
        .unwrap_or(0);
    let max_complexity = files.iter().map(|f| f.complexity).max().unwrap_or(0);

    let mut hotspots: Vec<Hotspot> = files
        .iter()
        .filter_map(|file| {
            let change_count = churn.get(&file.path).copied().filter(|&n| n > 0)?;
            let churn_rate = normalized(change_count, max_churn);
            let complexity_norm = normalized(file.complexity, max_complexity);
            Some(Hotspot {
                path: file.path.clone(),
                change_count,
                churn_rate,
                complexity: file.complexity,
                risk_score: risk_score(churn_rate, complexity_norm, weights),
            })
        })
        .collect();

    hotspots.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score).then_with(|| a.path.cmp(&b.path)));
    if let Some(limit) = limit {
        hotspots.truncate(limit);
    }
    hotspots
}

/// Jaccard similarity of the two files' commit sets
pub fn coupling_coefficient(co_changes: u32, changes_a: u32, changes_b: u32) -> f64 {
    let union = (changes_a + changes_b).saturating_sub(co_changes);
    if union == 0 {
        0.0
    } else {
        (f64::from(co_changes) / f64::from(union)).clamp(0.0, 1.0)
    }
}

/// Find file pairs that change together.
///
/// One pass over non-merge commits. Commits touching a single file or more than
/// `max_commit_files` files contribute nothing to pairs; oversized commits are skipped
/// entirely. Pairs involving paths outside `known_files` are dropped.
pub fn detect_couplings(
    commits: &[RawCommit],
    known_files: &HashSet<&str>,
    config: &CouplingConfig,
) -> Vec<TemporalCoupling> {
    let mut changes: HashMap<&str, u32> = HashMap::new();
    let mut pairs: HashMap<(&str, &str), u32> = HashMap::new();

    for commit in commits.iter().filter(|c| !c.is_merge) {
        let mut touched: Vec<&str> = commit.files_changed.iter().map(String::as_str).collect();
        touched.sort_unstable();
        touched.dedup();
        if touched.len() > config.max_commit_files {
            continue;
        }
        touched.retain(|path| known_files.contains(path));

        for &path in &touched {
            *changes.entry(path).or_insert(0) += 1;
        }
        for (i, &a) in touched.iter().enumerate() {
            for &b in &touched[i + 1..] {
                *pairs.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    let mut couplings: Vec<TemporalCoupling> = pairs
        .into_iter()
        .filter(|&(_, co)| co >= config.min_co_changes)
        .filter_map(|((a, b), co)| {
            let coefficient = coupling_coefficient(co, changes[a], changes[b]);
            (coefficient >= config.min_coefficient).then(|| TemporalCoupling {
                file_a: a.to_string(),
                file_b: b.to_string(),
                co_change_count: co,
                coefficient,
            })
        })
        .collect();

    couplings.sort_by(|x, y| {
        y.coefficient
            .partial_cmp(&x.coefficient)
            .unwrap_or(Ordering::Equal)
            .then_with(|| y.co_change_count.cmp(&x.co_change_count))
            .then_with(|| x.file_a.cmp(&y.file_a))
            .then_with(|| x.file_b.cmp(&y.file_b))
    });
    if let Some(limit) = config.max_couplings {
        couplings.truncate(limit);
    }
    couplings
}
