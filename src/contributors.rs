// src/contributors.rs

use crate::model::*;
use chrono::{DateTime, FixedOffset, Timelike};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const ARCHITECT_FEATURE_SHARE: f64 = 0.5;
pub const ARCHITECT_FILE_SPREAD: f64 = 3.0;
pub const FIREFIGHTER_SHARE: f64 = 0.5;
pub const DOCUMENTER_SHARE: f64 = 0.4;
pub const MAINTAINER_SHARE: f64 = 0.5;

/// Grouping key: lower-cased email, or the name when no email was recorded
pub fn identity(commit: &RawCommit) -> String {
    let email = commit.author_email.trim();
    if email.is_empty() {
        format!("name:{}", commit.author.trim().to_lowercase())
    } else {
        email.to_lowercase()
    }
}

/// Build one profile per author, most active first.
pub fn profile_contributors(commits: &[ClassifiedCommit]) -> Vec<ContributorProfile> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&ClassifiedCommit>> = HashMap::new();
    for commit in commits {
        let key = identity(&commit.raw);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(commit);
    }

    let author_count = groups.len().max(1);
    let average_commits = commits.len() as f64 / author_count as f64;

    let mut profiles: Vec<ContributorProfile> = order
        .iter()
        .filter_map(|key| groups.get(key))
        .filter_map(|group| build_profile(group, average_commits))
        .collect();
    profiles.sort_by(|a, b| b.commit_count.cmp(&a.commit_count).then_with(|| a.name.cmp(&b.name)));
    profiles
}

fn build_profile(commits: &[&ClassifiedCommit], average_commits: f64) -> Option<ContributorProfile> {
    // History is newest first, so the first commit carries the current name.
    let latest = commits.first()?;
    let total = commits.len() as u32;

    let mut type_distribution: BTreeMap<CommitType, u32> = BTreeMap::new();
    let mut hours = [0u32; 24];
    let mut files: BTreeSet<&str> = BTreeSet::new();
    let mut first_commit: DateTime<FixedOffset> = latest.raw.date;
    let mut last_commit: DateTime<FixedOffset> = latest.raw.date;
    let (mut insertions, mut deletions, mut merges, mut conventional) = (0u64, 0u64, 0u32, 0u32);

    for commit in commits {
        let raw = &commit.raw;
        *type_distribution.entry(commit.kind).or_insert(0) += 1;
        hours[raw.date.hour() as usize] += 1;
        files.extend(raw.files_changed.iter().map(String::as_str));
        first_commit = first_commit.min(raw.date);
        last_commit = last_commit.max(raw.date);
        insertions += raw.insertions;
        deletions += raw.deletions;
        merges += u32::from(raw.is_merge);
        conventional += u32::from(commit.confidence == Confidence::High);
    }

    let peak_hour = hours
        .iter()
        .enumerate()
        .max_by(|(ha, ca), (hb, cb)| ca.cmp(cb).then_with(|| hb.cmp(ha)))
        .map_or(0, |(hour, _)| hour as u8);
    let files_touched = files.len() as u32;
    let stats = AuthorStats {
        total,
        merges,
        conventional,
        files_touched,
        average_commits,
        types: &type_distribution,
    };

    Some(ContributorProfile {
        name: latest.raw.author.clone(),
        email: latest.raw.author_email.clone(),
        commit_count: total,
        merge_count: merges,
        insertions,
        deletions,
        files_touched,
        first_commit,
        last_commit,
        peak_hour,
        facets: facets(&stats),
        archetype: archetype(&type_distribution, total, files_touched),
        time_archetype: time_archetype(&hours),
        type_distribution,
    })
}

fn share(types: &BTreeMap<CommitType, u32>, total: u32, kinds: &[CommitType]) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let count: u32 = kinds.iter().map(|k| types.get(k).copied().unwrap_or(0)).sum();
    f64::from(count) / f64::from(total)
}

/// Each qualifying archetype scores its type share; the highest wins.
/// Ties go to the earlier archetype in declaration order.
pub fn archetype(types: &BTreeMap<CommitType, u32>, total: u32, files_touched: u32) -> Archetype {
    let spread = if total == 0 { 0.0 } else { f64::from(files_touched) / f64::from(total) };

    let feature = share(types, total, &[CommitType::Feature]);
    let firefighting = share(types, total, &[CommitType::Fix, CommitType::Refactor, CommitType::Revert]);
    let docs = share(types, total, &[CommitType::Docs]);
    let upkeep = share(
        types,
        total,
        &[CommitType::Chore, CommitType::Build, CommitType::Style, CommitType::Test],
    );

    let candidates = [
        (Archetype::Architect, feature, feature >= ARCHITECT_FEATURE_SHARE && spread >= ARCHITECT_FILE_SPREAD),
        (Archetype::Firefighter, firefighting, firefighting >= FIREFIGHTER_SHARE),
        (Archetype::Documenter, docs, docs >= DOCUMENTER_SHARE),
        (Archetype::Maintainer, upkeep, upkeep >= MAINTAINER_SHARE),
    ];

    let mut best: Option<(Archetype, f64)> = None;
    for (kind, score, qualifies) in candidates {
        if qualifies && best.map_or(true, |(_, top)| score > top) {
            best = Some((kind, score));
        }
    }
    best.map_or(Archetype::Generalist, |(kind, _)| kind)
}

pub fn time_band(hour: u32) -> TimeArchetype {
    match hour {
        5..=8 => TimeArchetype::EarlyBird,
        9..=16 => TimeArchetype::NineToFive,
        17..=20 => TimeArchetype::Evening,
        _ => TimeArchetype::NightOwl,
    }
}

/// Plurality band over an hour histogram
pub fn time_archetype(hours: &[u32; 24]) -> TimeArchetype {
    let mut bands: BTreeMap<TimeArchetype, u32> = BTreeMap::new();
    for (hour, &count) in hours.iter().enumerate() {
        *bands.entry(time_band(hour as u32)).or_insert(0) += count;
    }
    // BTreeMap iterates in declaration order; strict `>` keeps the earliest on ties.
    let mut best = (TimeArchetype::NightOwl, 0u32);
    for (band, count) in bands {
        if count > best.1 {
            best = (band, count);
        }
    }
    best.0
}

struct AuthorStats<'a> {
    total: u32,
    merges: u32,
    conventional: u32,
    files_touched: u32,
    average_commits: f64,
    types: &'a BTreeMap<CommitType, u32>,
}

fn percent(value: f64) -> u8 {
    if value.is_finite() {
        value.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

fn facets(stats: &AuthorStats<'_>) -> ContributorFacets {
    let total = f64::from(stats.total.max(1));
    let types = stats.types;
    let energy = if stats.average_commits > 0.0 {
        f64::from(stats.total) / stats.average_commits * 50.0
    } else {
        0.0
    };

    ContributorFacets {
        energy: percent(energy),
        discipline: percent(f64::from(stats.conventional) / total * 100.0),
        creativity: percent(share(types, stats.total, &[CommitType::Feature]) * 100.0),
        protectiveness: percent(share(types, stats.total, &[CommitType::Fix, CommitType::Test]) * 100.0),
        breadth: percent(f64::from(stats.files_touched) / total * 20.0),
        collaboration: percent(f64::from(stats.merges) / total * 200.0),
    }
}

pub fn summarize(profiles: Vec<ContributorProfile>) -> ContributorSummary {
    let mut archetype_distribution: BTreeMap<Archetype, u32> = BTreeMap::new();
    for profile in &profiles {
        *archetype_distribution.entry(profile.archetype).or_insert(0) += 1;
    }
    ContributorSummary {
        total_contributors: profiles.len() as u32,
        top_contributor: profiles.first().map(|p| p.name.clone()),
        archetype_distribution,
        contributors: profiles,
    }
}
