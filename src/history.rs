// src/history.rs

use crate::error::{Result, TopologyError};
use crate::model::*;
use chrono::DateTime;
use git2::Repository;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RECORD_SEP: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%x1e%H%x1f%P%x1f%an%x1f%ae%x1f%aI%x1f%B%x1f";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Everything the history reader produces for one run
#[derive(Debug, Clone)]
pub struct History {
    pub head: String,
    pub branch: Option<String>,
    /// Most recent first
    pub commits: Vec<RawCommit>,
    pub churn: ChurnMap,
}

/// The HEAD commit and the branch it is on, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadRef {
    pub id: String,
    pub branch: Option<String>,
}

pub fn open_repository(repo_path: &Path) -> Result<Repository> {
    Repository::open(repo_path)
        .map_err(|e| TopologyError::history(repo_path, e.message().to_string()))
}

pub fn resolve_head(repo: &Repository, repo_path: &Path) -> Result<HeadRef> {
    let head = repo
        .head()
        .map_err(|e| TopologyError::history(repo_path, format!("no HEAD: {}", e.message())))?;
    let commit = head
        .peel_to_commit()
        .map_err(|e| TopologyError::history(repo_path, format!("HEAD is not a commit: {}", e.message())))?;
    let branch = if head.is_branch() {
        head.shorthand().map(String::from)
    } else {
        None
    };
    Ok(HeadRef {
        id: commit.id().to_string(),
        branch,
    })
}

/// Read the commit stream reachable from HEAD, newest first.
pub fn read_history(
    repo_path: &Path,
    head: &HeadRef,
    max_commits: Option<usize>,
    timeout: Duration,
) -> Result<History> {
    let mut args: Vec<String> = vec![
        "-c".into(),
        "core.quotepath=off".into(),
        "log".into(),
        "--numstat".into(),
        "--no-color".into(),
        LOG_FORMAT.into(),
    ];
    if let Some(limit) = max_commits.filter(|&n| n > 0) {
        args.push(format!("--max-count={limit}"));
    }
    args.push(head.id.clone());

    let output = run_git(repo_path, "log", &args, timeout)?;
    let commits = parse_log_output(&output);
    let churn = churn_counts(&commits);
    debug!(commits = commits.len(), files = churn.len(), "history read");

    Ok(History {
        head: head.id.clone(),
        branch: head.branch.clone(),
        commits,
        churn,
    })
}

/// `git` with inherited repository overrides removed, so `-C` always wins
fn git_cmd() -> Command {
    let mut cmd = Command::new("git");
    cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
    cmd
}

/// Run git to completion, killing it once `timeout` elapses.
fn run_git(repo_path: &Path, label: &str, args: &[String], timeout: Duration) -> Result<String> {
    let mut child = git_cmd()
        .arg("-C")
        .arg(repo_path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| TopologyError::history(repo_path, format!("cannot spawn git: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| TopologyError::history(repo_path, "git stdout not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| TopologyError::history(repo_path, "git stderr not captured"))?;

    // Drain both pipes off-thread so a full pipe buffer never stalls the child.
    let out_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });
    let err_reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TopologyError::history(
                    repo_path,
                    format!("git {label} timed out after {:.1}s", timeout.as_secs_f64()),
                ));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                return Err(TopologyError::history(repo_path, format!("waiting on git {label}: {e}")))
            }
        }
    };

    let bytes = out_reader
        .join()
        .map_err(|_| TopologyError::history(repo_path, "stdout reader panicked"))?
        .map_err(|e| TopologyError::history(repo_path, format!("reading git {label} output: {e}")))?;
    let stderr = err_reader.join().unwrap_or_default();

    if !status.success() {
        return Err(TopologyError::history(
            repo_path,
            format!("git {label} failed ({status}): {}", stderr.trim()),
        ));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse `git log --numstat` output produced with `LOG_FORMAT`.
/// Malformed records are skipped, never fatal.
pub(crate) fn parse_log_output(output: &str) -> Vec<RawCommit> {
    output
        .split(RECORD_SEP)
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let commit = parse_record(record);
            if commit.is_none() {
                warn!(record = %record.chars().take(60).collect::<String>(), "skipping malformed log record");
            }
            commit
        })
        .collect()
}

fn parse_record(record: &str) -> Option<RawCommit> {
    let fields: Vec<&str> = record.splitn(7, FIELD_SEP).collect();
    if fields.len() < 7 {
        return None;
    }
    let hash = fields[0].trim();
    if hash.is_empty() {
        return None;
    }
    let parents: Vec<String> = fields[1].split_whitespace().map(String::from).collect();
    let author = match fields[2].trim() {
        "" => "Unknown".to_string(),
        name => name.to_string(),
    };
    let date = DateTime::parse_from_rfc3339(fields[4].trim()).ok()?;

    let mut insertions = 0u64;
    let mut deletions = 0u64;
    let mut files_changed = Vec::new();
    for line in fields[6].lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(ins), Some(del), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        // Binary files report "-" for both counts.
        insertions += ins.trim().parse::<u64>().unwrap_or(0);
        deletions += del.trim().parse::<u64>().unwrap_or(0);
        let path = normalize_rename(path.trim());
        if !path.is_empty() && !files_changed.contains(&path) {
            files_changed.push(path);
        }
    }

    Some(RawCommit {
        hash: hash.to_string(),
        is_merge: parents.len() > 1,
        parents,
        message: fields[5].trim().to_string(),
        author,
        author_email: fields[3].trim().to_string(),
        date,
        files_changed,
        insertions,
        deletions,
    })
}

/// Collapse numstat rename notation to the post-rename path:
/// `a.rs => b.rs` and `src/{old => new}/lib.rs`.
pub(crate) fn normalize_rename(path: &str) -> String {
    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            if let Some((_, new)) = path[open + 1..close].split_once(" => ") {
                let joined = format!("{}{}{}", &path[..open], new, &path[close + 1..]);
                return joined.replace("//", "/").trim_start_matches('/').to_string();
            }
        }
    }
    match path.split_once(" => ") {
        Some((_, new)) => new.to_string(),
        None => path.to_string(),
    }
}

/// Per-file change counts over non-merge commits
pub fn churn_counts(commits: &[RawCommit]) -> ChurnMap {
    let mut churn = ChurnMap::new();
    for commit in commits.iter().filter(|c| !c.is_merge) {
        let unique: BTreeSet<&String> = commit.files_changed.iter().collect();
        for path in unique {
            *churn.entry(path.clone()).or_insert(0) += 1;
        }
    }
    churn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, parents: &str, date: &str, message: &str, numstat: &str) -> String {
        format!(
            "{RECORD_SEP}{hash}{FIELD_SEP}{parents}{FIELD_SEP}Ada{FIELD_SEP}ada@example.com{FIELD_SEP}{date}{FIELD_SEP}{message}\n{FIELD_SEP}\n\n{numstat}"
        )
    }

    #[test]
    fn parses_numstat_records() {
        let out = [
            record("bbb", "aaa", "2024-03-01T10:00:00+02:00", "fix: off by one", "3\t1\tsrc/a.ts\n-\t-\tlogo.png\n"),
            record("aaa", "", "2024-02-01T09:00:00+00:00", "initial\n\nlonger body", "10\t0\tsrc/a.ts\n"),
        ]
        .concat();

        let commits = parse_log_output(&out);
        assert_eq!(commits.len(), 2);
        let first = &commits[0];
        assert_eq!(first.hash, "bbb");
        assert_eq!(first.parents, vec!["aaa".to_string()]);
        assert_eq!(first.files_changed, vec!["src/a.ts", "logo.png"]);
        assert_eq!((first.insertions, first.deletions), (3, 1));
        assert!(!first.is_merge);
        assert_eq!(first.date.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(commits[1].message, "initial\n\nlonger body");
        assert_eq!(commits[1].subject(), "initial");
    }

    #[test]
    fn merge_commits_are_tagged() {
        let out = record("ccc", "aaa bbb", "2024-03-02T10:00:00+00:00", "Merge branch 'x'", "");
        let commits = parse_log_output(&out);
        assert!(commits[0].is_merge);
        assert!(commits[0].files_changed.is_empty());
    }

    #[test]
    fn malformed_records_are_skipped() {
        let out = format!(
            "{}{RECORD_SEP}garbage without fields",
            record("aaa", "", "not-a-date", "msg", "")
        );
        assert!(parse_log_output(&out).is_empty());
    }

    #[test]
    fn rename_notation_is_normalized() {
        assert_eq!(normalize_rename("old.rs => new.rs"), "new.rs");
        assert_eq!(normalize_rename("src/{old => new}/lib.rs"), "src/new/lib.rs");
        assert_eq!(normalize_rename("src/{ => nested}/lib.rs"), "src/nested/lib.rs");
        assert_eq!(normalize_rename("src/{gone => }/lib.rs"), "src/lib.rs");
        assert_eq!(normalize_rename("{a => b}/x.rs"), "b/x.rs");
        assert_eq!(normalize_rename("plain/path.rs"), "plain/path.rs");
    }

    #[test]
    fn churn_ignores_merges() {
        let mut out = record("m", "a b", "2024-03-02T10:00:00+00:00", "Merge", "1\t1\tx.rs\n");
        out.push_str(&record("a", "", "2024-03-01T10:00:00+00:00", "edit", "1\t1\tx.rs\n2\t0\ty.rs\n"));
        let churn = churn_counts(&parse_log_output(&out));
        assert_eq!(churn.get("x.rs"), Some(&1));
        assert_eq!(churn.get("y.rs"), Some(&1));
    }

    #[test]
    fn missing_repository_is_history_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = open_repository(&dir.path().join("nope")) else {
            panic!("opened a repository that does not exist");
        };
        assert!(matches!(err, TopologyError::HistoryUnavailable { .. }));
        assert_eq!(err.stage(), "history");
    }

    fn repo_with_one_commit(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let sig = git2::Signature::now("Ada", "ada@example.com").unwrap();
        {
            let tree_id = repo.index().unwrap().write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
        }
        repo
    }

    #[test]
    fn slow_git_is_killed_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_with_one_commit(dir.path());
        let head = resolve_head(&repo, dir.path()).unwrap();

        let err = read_history(dir.path(), &head, None, Duration::from_nanos(1)).unwrap_err();
        let TopologyError::HistoryUnavailable { reason, .. } = &err else {
            panic!("unexpected error {err}");
        };
        // Without a git binary the spawn itself fails, which is the same outcome.
        assert!(
            reason.contains("timed out") || reason.contains("cannot spawn git"),
            "{reason}"
        );
    }

    #[test]
    fn generous_timeout_reads_history() {
        if Command::new("git").arg("--version").output().is_err() {
            eprintln!("git not available, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_with_one_commit(dir.path());
        let head = resolve_head(&repo, dir.path()).unwrap();

        let history = read_history(dir.path(), &head, None, Duration::from_secs(60)).unwrap();
        assert_eq!(history.commits.len(), 1);
        assert_eq!(history.commits[0].hash, head.id);
        assert_eq!(history.commits[0].message, "initial");
    }
}
