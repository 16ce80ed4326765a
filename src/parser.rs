// src/parser.rs

//! Source discovery and structural parsing.
//!
//! This is not a full AST. Comments and string literals are blanked out (keeping byte offsets
//! and newlines), function headers are found with per-language patterns, bodies are delimited by
//! brace matching (indentation for Python), and branching constructs are counted inside each body.
//! Anything we cannot handle becomes a stub record instead of an error.

use crate::error::{ParseError, Result, TopologyError};
use crate::model::*;
use git2::{ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use indicatif::{ParallelProgressIterator, ProgressBar};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

/// Bytes inspected for NUL when sniffing binary content
const SNIFF_BYTES: usize = 8000;
const SYMLINK_MODE: i32 = 0o120000;
const BODY_SCAN_LIMIT: usize = 400;

/// A blob in the HEAD tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadEntry {
    pub path: String,
    pub blob_id: String,
}

/// List regular files at HEAD, sorted by path, minus anything matching `ignore`.
pub fn discover_files(repo: &Repository, repo_path: &Path, ignore: &[Regex]) -> Result<Vec<HeadEntry>> {
    let tree = repo
        .head()
        .and_then(|head| head.peel_to_tree())
        .map_err(|e| TopologyError::history(repo_path, format!("cannot read HEAD tree: {}", e.message())))?;

    let mut entries = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) && entry.filemode() != SYMLINK_MODE {
            if let Some(name) = entry.name() {
                let path = format!("{root}{name}");
                if !ignore.iter().any(|re| re.is_match(&path)) {
                    entries.push(HeadEntry {
                        path,
                        blob_id: entry.id().to_string(),
                    });
                }
            }
        }
        TreeWalkResult::Ok
    })
    .map_err(|e| TopologyError::history(repo_path, format!("cannot walk HEAD tree: {}", e.message())))?;

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Parse every entry on the current rayon pool, reading content from the object database so the
/// result reflects HEAD whatever state the working tree is in. Each worker opens its own handle on
/// the repository. Output order matches input order.
pub fn parse_files(entries: &[HeadEntry], repo_path: &Path, max_file_bytes: u64, bar: &ProgressBar) -> Vec<ParsedFile> {
    entries
        .par_iter()
        .progress_with(bar.clone())
        .map_init(
            || Repository::open(repo_path),
            |repo, entry| match repo {
                Ok(repo) => parse_blob(repo, entry, max_file_bytes),
                Err(e) => unreadable(
                    entry,
                    ParseError::FileUnreadable {
                        path: entry.path.clone(),
                        reason: e.message().to_string(),
                    },
                ),
            },
        )
        .collect()
}

fn stub(entry: &HeadEntry, language: &str, loc: usize, reason: StubReason) -> ParsedFile {
    ParsedFile {
        path: entry.path.clone(),
        hash: entry.blob_id.clone(),
        language: language.to_string(),
        loc,
        structure: Structure::Stub(reason),
    }
}

fn extension_language(entry: &HeadEntry) -> &'static str {
    Language::from_path(&entry.path).map_or("unknown", |l| l.name())
}

fn unreadable(entry: &HeadEntry, err: ParseError) -> ParsedFile {
    warn!(error = %err, "stubbing file");
    stub(entry, extension_language(entry), 0, StubReason::Unreadable)
}

enum Loaded<'r> {
    Blob(git2::Blob<'r>),
    TooLarge(usize),
}

/// Look the blob up, checking its size from the object header before the content is inflated.
fn load_blob<'r>(repo: &'r Repository, entry: &HeadEntry, max_file_bytes: u64) -> std::result::Result<Loaded<'r>, ParseError> {
    let unreadable = |e: git2::Error| ParseError::FileUnreadable {
        path: entry.path.clone(),
        reason: e.message().to_string(),
    };
    let oid = Oid::from_str(&entry.blob_id).map_err(unreadable)?;
    let (size, _) = repo.odb().and_then(|odb| odb.read_header(oid)).map_err(unreadable)?;
    if size as u64 > max_file_bytes {
        return Ok(Loaded::TooLarge(size));
    }
    repo.find_blob(oid).map(Loaded::Blob).map_err(unreadable)
}

/// Parse one HEAD entry. Never fails: problems become stub records.
pub fn parse_blob(repo: &Repository, entry: &HeadEntry, max_file_bytes: u64) -> ParsedFile {
    match load_blob(repo, entry, max_file_bytes) {
        Ok(Loaded::Blob(blob)) => parse_content(entry, blob.content()),
        Ok(Loaded::TooLarge(size)) => {
            debug!(path = %entry.path, bytes = size, "too large to parse");
            stub(entry, extension_language(entry), 0, StubReason::TooLarge)
        }
        Err(err) => unreadable(entry, err),
    }
}

/// Sniff, detect the language, and parse already-loaded content.
pub fn parse_content(entry: &HeadEntry, bytes: &[u8]) -> ParsedFile {
    let Some(text) = as_text(bytes) else {
        debug!(path = %entry.path, "binary content");
        return stub(entry, "unknown", 0, StubReason::Binary);
    };
    let loc = text.lines().count();

    let detected = Language::from_path(&entry.path).or_else(|| text.lines().next().and_then(Language::from_shebang));
    let Some(language) = detected else {
        return stub(entry, "unknown", loc, StubReason::UnknownLanguage);
    };

    match parse_source(&entry.path, text, language) {
        Ok(functions) => ParsedFile {
            path: entry.path.clone(),
            hash: entry.blob_id.clone(),
            language: language.name().to_string(),
            loc,
            structure: Structure::Parsed(functions),
        },
        Err(ParseError::UnparseableLanguage { .. }) => stub(entry, language.name(), loc, StubReason::NoGrammar),
        Err(err) => {
            debug!(error = %err, "stubbing file");
            stub(entry, "unparseable", loc, StubReason::Unparseable)
        }
    }
}

/// `None` for binary content: a NUL byte near the start, or invalid UTF-8.
fn as_text(bytes: &[u8]) -> Option<&str> {
    if bytes[..bytes.len().min(SNIFF_BYTES)].contains(&0) {
        return None;
    }
    std::str::from_utf8(bytes).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    JavaScript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Kotlin,
    Swift,
    Php,
    Python,
    Ruby,
    Scala,
    Lua,
    Shell,
    Markdown,
    Json,
    Yaml,
    Toml,
    Html,
    Css,
    Scss,
    Sql,
    GraphQl,
    Glsl,
    Wgsl,
    Vue,
    Svelte,
    Dockerfile,
    Makefile,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Kotlin => "kotlin",
            Language::Swift => "swift",
            Language::Php => "php",
            Language::Python => "python",
            Language::Ruby => "ruby",
            Language::Scala => "scala",
            Language::Lua => "lua",
            Language::Shell => "shell",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Html => "html",
            Language::Css => "css",
            Language::Scss => "scss",
            Language::Sql => "sql",
            Language::GraphQl => "graphql",
            Language::Glsl => "glsl",
            Language::Wgsl => "wgsl",
            Language::Vue => "vue",
            Language::Svelte => "svelte",
            Language::Dockerfile => "dockerfile",
            Language::Makefile => "makefile",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name {
            "Dockerfile" => return Some(Language::Dockerfile),
            "Makefile" | "GNUmakefile" => return Some(Language::Makefile),
            _ => {}
        }
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        let lang = match ext.to_ascii_lowercase().as_str() {
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "kt" | "kts" => Language::Kotlin,
            "swift" => Language::Swift,
            "php" => Language::Php,
            "py" | "pyi" => Language::Python,
            "rb" => Language::Ruby,
            "scala" | "sc" => Language::Scala,
            "lua" => Language::Lua,
            "sh" | "bash" | "zsh" => Language::Shell,
            "md" | "mdx" | "markdown" => Language::Markdown,
            "json" => Language::Json,
            "yml" | "yaml" => Language::Yaml,
            "toml" => Language::Toml,
            "html" | "htm" => Language::Html,
            "css" => Language::Css,
            "scss" => Language::Scss,
            "sql" => Language::Sql,
            "graphql" | "gql" => Language::GraphQl,
            "glsl" | "vert" | "frag" => Language::Glsl,
            "wgsl" => Language::Wgsl,
            "vue" => Language::Vue,
            "svelte" => Language::Svelte,
            _ => return None,
        };
        Some(lang)
    }

    /// Detect from a `#!` line, e.g. `#!/usr/bin/env python3`.
    pub fn from_shebang(first_line: &str) -> Option<Self> {
        let line = first_line.strip_prefix("#!")?;
        let mut words = line.split_whitespace();
        let program = words.next()?.rsplit('/').next()?;
        let interpreter = if program == "env" {
            words.find(|w| !w.starts_with('-'))?
        } else {
            program
        };
        let interpreter = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        match interpreter {
            "python" => Some(Language::Python),
            "node" | "nodejs" => Some(Language::JavaScript),
            "deno" | "ts-node" | "bun" => Some(Language::TypeScript),
            "sh" | "bash" | "zsh" | "dash" | "ksh" => Some(Language::Shell),
            "ruby" => Some(Language::Ruby),
            "php" => Some(Language::Php),
            "lua" => Some(Language::Lua),
            _ => None,
        }
    }

    fn grammar(&self) -> Option<Grammar> {
        let clike = |headers: &'static [Regex]| Grammar {
            lexer: Lexer::CLike { backtick: false },
            body: Body::Braces,
            headers,
            tokens: &CLIKE_TOKENS,
        };
        let grammar = match self {
            Language::TypeScript | Language::JavaScript => Grammar {
                lexer: Lexer::Script,
                body: Body::Braces,
                headers: JS_HEADERS.as_slice(),
                tokens: &CLIKE_TOKENS,
            },
            Language::Rust => Grammar {
                lexer: Lexer::Rust,
                body: Body::Braces,
                headers: RUST_HEADERS.as_slice(),
                tokens: &RUST_TOKENS,
            },
            Language::Go => Grammar {
                lexer: Lexer::CLike { backtick: true },
                body: Body::Braces,
                headers: GO_HEADERS.as_slice(),
                tokens: &GO_TOKENS,
            },
            Language::Java | Language::C | Language::Cpp | Language::CSharp => clike(CLIKE_HEADERS.as_slice()),
            Language::Kotlin => Grammar {
                tokens: &KOTLIN_TOKENS,
                ..clike(KOTLIN_HEADERS.as_slice())
            },
            Language::Swift => clike(SWIFT_HEADERS.as_slice()),
            Language::Php => clike(PHP_HEADERS.as_slice()),
            Language::Python => Grammar {
                lexer: Lexer::Python,
                body: Body::Indent,
                headers: PY_HEADERS.as_slice(),
                tokens: &PY_TOKENS,
            },
            _ => return None,
        };
        Some(grammar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexer {
    CLike { backtick: bool },
    /// JavaScript and TypeScript: template literals, regex literals, JSX text
    Script,
    Rust,
    Python,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    Braces,
    Indent,
}

struct Grammar {
    lexer: Lexer,
    body: Body,
    /// Each pattern has a `name` group and ends at the parameter list's `(` or an arrow `=>`
    headers: &'static [Regex],
    /// Decision points, `else`, and the block keywords that only add cognitive weight
    tokens: &'static Regex,
}

fn patterns(sources: &[&str]) -> Vec<Regex> {
    sources.iter().map(|p| Regex::new(p).expect("valid regex")).collect()
}

static JS_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"\bfunction\b\s*\*?\s*(?P<name>[A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(",
        r"(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?=\s*(?:async\s+)?function\b\s*\*?\s*[\w$]*\s*\(",
        r"(?P<name>[A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?[=:]\s*(?:async\s+)?(?:\([^()]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=;{}\n]+)?=>",
        r"(?m)^[ \t]*(?:(?:public|private|protected|static|async|readonly|override|abstract|get|set)[ \t]+)*(?P<name>[A-Za-z_$][\w$]*)[ \t]*(?:<[^>(\n]*>)?[ \t]*\(",
    ])
});
static RUST_HEADERS: Lazy<Vec<Regex>> =
    Lazy::new(|| patterns(&[r"\bfn\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^{;]*?>)?\s*\("]));
static GO_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[r"(?m)^func\s+(?:\([^)]*\)\s*)?(?P<name>[A-Za-z_]\w*)\s*(?:\[[^\]]*\])?\s*\("])
});
static CLIKE_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"(?m)^[ \t]*(?:[\w<>\[\]?,.*&:@]+[ \t]+)*(?P<name>(?:[A-Za-z_]\w*::)*~?[A-Za-z_]\w*)[ \t]*\(",
    ])
});
static KOTLIN_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[r"\bfun\s+(?:<[^>]*>\s*)?(?:[\w.]+\.)?(?P<name>[A-Za-z_]\w*)\s*\("])
});
static SWIFT_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[
        r"\bfunc\s+(?P<name>[A-Za-z_]\w*)\s*(?:<[^>]*>)?\s*\(",
        r"(?m)^[ \t]*(?:(?:public|private|internal|fileprivate|convenience|required|override)[ \t]+)*(?P<name>init)[?!]?\s*\(",
    ])
});
static PHP_HEADERS: Lazy<Vec<Regex>> =
    Lazy::new(|| patterns(&[r"\bfunction\s+&?(?P<name>[A-Za-z_]\w*)\s*\("]));
static PY_HEADERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    patterns(&[r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+(?P<name>[A-Za-z_]\w*)[ \t]*\("])
});

// A ternary `?` is written with whitespace on both sides, which keeps `?.`, `??`, `a?: T` and
// nullable `T?` out.
static CLIKE_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|else|for|foreach|while|switch|case|catch|guard)\b|&&|\|\||\s\?\s").expect("valid regex")
});
static KOTLIN_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:if|else|for|while|when|catch)\b|&&|\|\|").expect("valid regex"));
static RUST_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:if|else|for|while|loop|match)\b|=>|&&|\|\|").expect("valid regex"));
static GO_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:if|else|for|switch|select|case)\b|&&|\|\|").expect("valid regex"));
static PY_TOKENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:if|elif|else|for|while|except|case|and|or)\b").expect("valid regex")
});
static KOTLIN_WHEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bwhen\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cognitive {
    None,
    /// +1 regardless of depth: `else`, `elif`, logical operators
    Flat,
    /// +1 plus the current nesting level: conditionals, loops, `catch`, `switch`
    Nested,
}

/// Whether a token is a decision point, and what it adds to cognitive complexity.
fn token_effect(token: &str) -> (bool, Cognitive) {
    match token {
        "if" | "for" | "foreach" | "while" | "loop" | "catch" | "except" | "guard" | "?" => (true, Cognitive::Nested),
        "elif" | "&&" | "||" | "and" | "or" => (true, Cognitive::Flat),
        "case" | "=>" | "->" => (true, Cognitive::None),
        "else" => (false, Cognitive::Flat),
        "switch" | "match" | "select" | "when" => (false, Cognitive::Nested),
        _ => (false, Cognitive::None),
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    branches: u32,
    cognitive: u32,
}

/// Words that look like a call-then-block but are control flow or expressions
const NOT_FUNCTION_NAMES: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "function", "return", "else", "do", "try",
    "with", "using", "lock", "fixed", "synchronized", "sizeof", "typeof", "new", "delete", "throw",
    "await", "yield", "match", "loop", "when", "guard", "defer", "go", "select", "case", "elif",
    "except", "assert",
];
const NOT_FUNCTION_PREFIXES: &[&str] = &["new", "return", "throw", "else", "await", "yield", "case", "in", "of", "do"];

/// Locate functions in `text` and count branching constructs per function.
pub fn parse_source(path: &str, text: &str, language: Language) -> std::result::Result<Vec<FunctionSpan>, ParseError> {
    let Some(grammar) = language.grammar() else {
        return Err(ParseError::UnparseableLanguage {
            path: path.to_string(),
            language: language.name().to_string(),
        });
    };

    let cleaned = blank_comments_and_strings(text, grammar.lexer);
    let lines = LineIndex::new(&cleaned);
    check_balance(path, &cleaned, grammar.body, &lines)?;

    let mut spans = match grammar.body {
        Body::Braces => brace_spans(&cleaned, &grammar),
        Body::Indent => indent_spans(&cleaned, grammar.headers),
    };
    spans.sort_by_key(|s| (s.body_start, std::cmp::Reverse(s.body_end)));
    spans.dedup_by_key(|s| s.body_start);

    let depths = block_depths(&cleaned, grammar.body);
    // Depth of code directly inside each body; the module level sits at 0.
    let bases: Vec<u32> = spans
        .iter()
        .map(|s| match grammar.body {
            Body::Braces => depths[s.body_start] + 1,
            Body::Indent => depths[s.header_start] + 1,
        })
        .collect();

    let mut tokens: Vec<(usize, &str)> = grammar
        .tokens
        .find_iter(&cleaned)
        .map(|m| (m.start(), m.as_str().trim()))
        .collect();
    if language == Language::Kotlin {
        tokens.extend(when_arms(&cleaned).into_iter().map(|pos| (pos, "->")));
    }

    let mut tallies = vec![Tally::default(); spans.len()];
    let mut module = Tally::default();
    for (pos, token) in tokens {
        if token == "||" && grammar.lexer == Lexer::Rust && opens_closure(&cleaned[..pos]) {
            continue;
        }
        let (decision, mut cognitive) = token_effect(token);
        // `else if` is one flat step, already paid for by the `else`.
        if token == "if" && ends_with_word(&cleaned[..pos], "else") {
            cognitive = Cognitive::None;
        }
        // Innermost span wins: spans are sorted by start, so the last container is the deepest.
        let owner = spans.iter().rposition(|s| s.body_start <= pos && pos < s.body_end);
        let base = owner.map_or(0, |idx| bases[idx]);
        let tally = match owner {
            Some(idx) => &mut tallies[idx],
            None => &mut module,
        };
        tally.branches += u32::from(decision);
        tally.cognitive += match cognitive {
            Cognitive::None => 0,
            Cognitive::Flat => 1,
            Cognitive::Nested => 1 + depths[pos].saturating_sub(base),
        };
    }

    let mut functions: Vec<FunctionSpan> = spans
        .iter()
        .zip(&tallies)
        .map(|(span, tally)| FunctionSpan {
            name: span.name.clone(),
            start_line: lines.line_of(span.header_start),
            end_line: lines.line_of(span.body_end.saturating_sub(1).max(span.header_start)),
            branches: tally.branches,
            cognitive: tally.cognitive,
            nesting_depth: nesting_depth(&cleaned, span.body_start, span.body_end, grammar.body),
        })
        .collect();

    let has_code = cleaned.chars().any(|c| !c.is_whitespace());
    if module.branches > 0 || (functions.is_empty() && has_code) {
        functions.insert(
            0,
            FunctionSpan {
                name: "<module>".to_string(),
                start_line: 1,
                end_line: lines.count().max(1),
                branches: module.branches,
                cognitive: module.cognitive,
                nesting_depth: nesting_depth(&cleaned, 0, cleaned.len(), grammar.body),
            },
        );
    }
    Ok(functions)
}

/// Block depth before every byte: open braces, or indentation levels for indent bodies.
fn block_depths(cleaned: &str, body: Body) -> Vec<u32> {
    let mut depths = Vec::with_capacity(cleaned.len() + 1);
    match body {
        Body::Braces => {
            let mut depth = 0u32;
            for b in cleaned.bytes() {
                depths.push(depth);
                match b {
                    b'{' => depth += 1,
                    b'}' => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            depths.push(depth);
        }
        Body::Indent => {
            let mut stack = vec![0usize];
            let mut level = 0u32;
            for line in cleaned.split_inclusive('\n') {
                if !line.trim().is_empty() {
                    let width = indent_width(line);
                    while stack.len() > 1 && stack.last().is_some_and(|&top| width < top) {
                        stack.pop();
                    }
                    if stack.last().is_some_and(|&top| width > top) {
                        stack.push(width);
                    }
                    level = (stack.len() - 1) as u32;
                }
                depths.extend(std::iter::repeat(level).take(line.len()));
            }
            depths.push(level);
        }
    }
    depths
}

/// `text` ends with `word` as a whole identifier, ignoring trailing whitespace.
fn ends_with_word(text: &str, word: &str) -> bool {
    let text = text.trim_end();
    text.strip_suffix(word)
        .is_some_and(|rest| !rest.bytes().last().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_'))
}

/// A Rust `||` preceded by this text starts a zero-argument closure rather than or-ing two operands.
fn opens_closure(before: &str) -> bool {
    let trimmed = before.trim_end();
    let bytes = trimmed.as_bytes();
    match bytes.last() {
        None => true,
        Some(b'(' | b',' | b'{' | b';' | b'[' | b':') => true,
        Some(b'>') => trimmed.ends_with("=>"),
        Some(b'=') => !matches!(bytes.len().checked_sub(2).map(|i| bytes[i]), Some(b'=' | b'!' | b'<' | b'>')),
        Some(_) => ["move", "return", "break"].iter().any(|kw| ends_with_word(trimmed, kw)),
    }
}

/// Offsets of the `->` arms directly inside Kotlin `when` blocks, `else ->` excluded.
fn when_arms(cleaned: &str) -> Vec<usize> {
    let bytes = cleaned.as_bytes();
    let mut arms = Vec::new();
    for m in KOTLIN_WHEN.find_iter(cleaned) {
        let Some(mut open) = next_non_space(bytes, m.end()) else {
            continue;
        };
        if bytes[open] == b'(' {
            let Some(next) = matching(bytes, open, b'(', b')').and_then(|close| next_non_space(bytes, close + 1)) else {
                continue;
            };
            open = next;
        }
        if bytes[open] != b'{' {
            continue;
        }
        let Some(close) = matching(bytes, open, b'{', b'}') else {
            continue;
        };
        let mut depth = 0i32;
        for i in open + 1..close {
            match bytes[i] {
                b'{' | b'(' | b'[' => depth += 1,
                b'}' | b')' | b']' => depth -= 1,
                b'-' if depth == 0 && bytes[i + 1] == b'>' && !ends_with_word(&cleaned[..i], "else") => arms.push(i),
                _ => {}
            }
        }
    }
    arms
}

#[derive(Debug, Clone)]
struct RawSpan {
    name: String,
    header_start: usize,
    /// Byte range of the body; for brace bodies this includes both braces
    body_start: usize,
    body_end: usize,
}

fn brace_spans(cleaned: &str, grammar: &Grammar) -> Vec<RawSpan> {
    let bytes = cleaned.as_bytes();
    let mut spans = Vec::new();
    for re in grammar.headers {
        for caps in re.captures_iter(cleaned) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
                continue;
            };
            let short_name = name.as_str().rsplit("::").next().unwrap_or(name.as_str());
            if NOT_FUNCTION_NAMES.contains(&short_name) {
                continue;
            }
            let prefix = &cleaned[whole.start()..name.start()];
            if prefix
                .split_whitespace()
                .last()
                .is_some_and(|word| NOT_FUNCTION_PREFIXES.contains(&word))
            {
                continue;
            }
            let open = if whole.as_str().ends_with("=>") {
                next_non_space(bytes, whole.end()).filter(|&i| bytes[i] == b'{')
            } else {
                matching(bytes, whole.end() - 1, b'(', b')').and_then(|close| body_open_after_params(bytes, close + 1))
            };
            let Some(open) = open else { continue };
            let Some(close) = matching(bytes, open, b'{', b'}') else {
                continue;
            };
            spans.push(RawSpan {
                name: name.as_str().to_string(),
                header_start: whole.start() + leading_space(whole.as_str()),
                body_start: open,
                body_end: close + 1,
            });
        }
    }
    spans
}

fn leading_space(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

fn next_non_space(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len()).find(|&i| !bytes[i].is_ascii_whitespace())
}

/// After a parameter list: the `{` opening a body, or `None` for a call, prototype, or expression body.
fn body_open_after_params(bytes: &[u8], from: usize) -> Option<usize> {
    let first = next_non_space(bytes, from)?;
    match bytes[first] {
        b'{' => return Some(first),
        b':' | b'-' | b'(' | b'*' | b'[' => {}
        c if c.is_ascii_alphabetic() || c == b'_' => {}
        _ => return None,
    }
    let end = bytes.len().min(first + BODY_SCAN_LIMIT);
    let mut i = first;
    while i < end {
        match bytes[i] {
            b'{' => return Some(i),
            b';' | b'}' => return None,
            b'=' if bytes.get(i + 1) != Some(&b'>') => return None,
            b'(' => i = matching(bytes, i, b'(', b')')?,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the delimiter closing the one at `open`.
fn matching(bytes: &[u8], open: usize, open_ch: u8, close_ch: u8) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if b == open_ch {
            depth += 1;
        } else if b == close_ch {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn indent_spans(cleaned: &str, headers: &[Regex]) -> Vec<RawSpan> {
    let bytes = cleaned.as_bytes();
    let mut spans = Vec::new();
    for caps in headers.iter().flat_map(|re| re.captures_iter(cleaned)) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) else {
            continue;
        };
        let def_indent = indent_width(&cleaned[whole.start()..]);
        let Some(close_paren) = matching(bytes, whole.end() - 1, b'(', b')') else {
            continue;
        };
        let Some(colon) = (close_paren..bytes.len()).find(|&i| bytes[i] == b':') else {
            continue;
        };
        let header_line_end = line_end(cleaned, colon);

        // `def f(): return x` keeps its body on the header line
        let mut body_end = header_line_end;
        if cleaned[colon + 1..header_line_end].trim().is_empty() {
            let mut line_start = header_line_end + 1;
            while line_start < cleaned.len() {
                let end = line_end(cleaned, line_start);
                let line = &cleaned[line_start..end];
                if !line.trim().is_empty() {
                    if indent_width(line) <= def_indent {
                        break;
                    }
                    body_end = end;
                }
                line_start = end + 1;
            }
        }
        spans.push(RawSpan {
            name: name.as_str().to_string(),
            header_start: whole.start() + leading_space(whole.as_str()),
            body_start: colon + 1,
            body_end,
        });
    }
    spans
}

/// Offset of the newline ending the line that contains `from`, or the text length
fn line_end(text: &str, from: usize) -> usize {
    text[from..].find('\n').map_or(text.len(), |i| from + i)
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn nesting_depth(cleaned: &str, start: usize, end: usize, body: Body) -> u32 {
    let region = &cleaned[start..end.min(cleaned.len())];
    match body {
        Body::Braces => {
            let mut depth = 0i32;
            let mut max = 0i32;
            for b in region.bytes() {
                match b {
                    b'{' => {
                        depth += 1;
                        max = max.max(depth);
                    }
                    b'}' => depth -= 1,
                    _ => {}
                }
            }
            // The function's own braces are not nesting.
            let own = i32::from(region.starts_with('{'));
            (max - own).max(0) as u32
        }
        Body::Indent => {
            let mut stack: Vec<usize> = Vec::new();
            let mut max = 0usize;
            for line in region.lines().filter(|l| !l.trim().is_empty()) {
                let width = indent_width(line);
                while stack.last().is_some_and(|&top| width < top) {
                    stack.pop();
                }
                if stack.last().map_or(true, |&top| width > top) {
                    stack.push(width);
                }
                max = max.max(stack.len().saturating_sub(1));
            }
            max as u32
        }
    }
}

fn check_balance(path: &str, cleaned: &str, body: Body, lines: &LineIndex) -> std::result::Result<(), ParseError> {
    let pairs: &[(u8, u8)] = match body {
        Body::Braces => &[(b'{', b'}')],
        Body::Indent => &[(b'(', b')'), (b'[', b']'), (b'{', b'}')],
    };
    for &(open, close) in pairs {
        let mut depth = 0i64;
        for (i, b) in cleaned.bytes().enumerate() {
            if b == open {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth < 0 {
                    return Err(ParseError::Unbalanced {
                        path: path.to_string(),
                        line: lines.line_of(i),
                    });
                }
            }
        }
        if depth != 0 {
            return Err(ParseError::Unbalanced {
                path: path.to_string(),
                line: lines.count(),
            });
        }
    }
    Ok(())
}

/// Replace comment and string-literal bytes with spaces, keeping newlines and offsets.
fn blank_comments_and_strings(text: &str, lexer: Lexer) -> String {
    let src = text.as_bytes();
    let find_after = |from: usize, needle: &[u8]| -> usize {
        src[from.min(src.len())..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map_or(src.len(), |p| from + p + needle.len())
    };
    // Only Rust string literals may span lines; elsewhere an unterminated quote ends at the newline.
    let multiline = lexer == Lexer::Rust;
    let quoted_end = |from: usize, quote: u8| -> usize {
        let mut i = from + 1;
        while i < src.len() {
            match src[i] {
                b'\\' => i += 2,
                b'\n' if !multiline => return i,
                b if b == quote => return i + 1,
                _ => i += 1,
            }
        }
        src.len()
    };

    let mut out = src.to_vec();
    let mut i = 0;
    while i < src.len() {
        let b = src[i];
        let next = src.get(i + 1).copied();
        let literal_end = match (lexer, b) {
            (Lexer::Python, b'#') => Some(line_end(text, i)),
            (Lexer::Python, b'"' | b'\'') => {
                let triple = [b, b, b];
                Some(if src[i..].starts_with(&triple) {
                    find_after(i + 3, &triple)
                } else {
                    quoted_end(i, b)
                })
            }
            (Lexer::Python, _) => None,
            (_, b'/') if next == Some(b'/') => Some(line_end(text, i)),
            (_, b'/') if next == Some(b'*') => Some(find_after(i + 2, b"*/")),
            (Lexer::CLike { backtick: true } | Lexer::Script, b'`') => Some(
                src[i + 1..]
                    .iter()
                    .position(|&c| c == b'`')
                    .map_or(src.len(), |p| i + p + 2),
            ),
            (Lexer::Rust, b'r') if !is_ident_byte(src, i.wrapping_sub(1)) => rust_raw_string_end(src, i),
            (Lexer::Script, b'/') if regex_allowed(&out[..i]) => regex_literal_end(src, i),
            // A quote glued to a word is an apostrophe in JSX text (`Don't`), never a string opener.
            (Lexer::Script, b'"' | b'\'') if is_ident_byte(src, i.wrapping_sub(1)) => None,
            (Lexer::Rust, b'\'') => rust_char_end(text, i),
            (_, b'"' | b'\'') => Some(quoted_end(i, b)),
            _ => None,
        };
        match literal_end {
            Some(end) => {
                let end = end.min(src.len());
                for byte in &mut out[i..end] {
                    if *byte != b'\n' {
                        *byte = b' ';
                    }
                }
                i = end.max(i + 1);
            }
            None => i += 1,
        }
    }
    // Regions start and end on ASCII delimiters, so the result is still valid UTF-8.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// A `/` after this (already blanked) code starts a regex literal rather than a division.
fn regex_allowed(code: &[u8]) -> bool {
    let Some(end) = code.iter().rposition(|b| !b.is_ascii_whitespace()) else {
        return true;
    };
    match code[end] {
        b'(' | b',' | b'=' | b':' | b'[' | b'!' | b'&' | b'|' | b'?' | b'{' | b'}' | b';' | b'+' | b'-' | b'*'
        | b'%' | b'~' | b'^' => true,
        b if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => {
            let start = code[..end]
                .iter()
                .rposition(|b| !(b.is_ascii_alphanumeric() || *b == b'_' || *b == b'$'))
                .map_or(0, |p| p + 1);
            matches!(
                &code[start..=end],
                b"return" | b"typeof" | b"instanceof" | b"in" | b"of" | b"new" | b"delete" | b"void" | b"throw"
                    | b"case" | b"do" | b"else" | b"yield" | b"await"
            )
        }
        _ => false,
    }
}

/// End of the regex literal opening at `start`, flags included. `None` if it does not close on
/// the same line, in which case the `/` was a division after all.
fn regex_literal_end(src: &[u8], start: usize) -> Option<usize> {
    let mut in_class = false;
    let mut i = start + 1;
    while i < src.len() {
        match src[i] {
            b'\n' => return None,
            b'\\' => i += 1,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                let flags = src[i + 1..].iter().take_while(|b| b.is_ascii_alphabetic()).count();
                return Some(i + 1 + flags);
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_ident_byte(src: &[u8], i: usize) -> bool {
    src.get(i).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
}

/// End of `r"..."` / `r#"..."#` starting at `i`; `None` for anything else, e.g. `r#ident`.
fn rust_raw_string_end(src: &[u8], i: usize) -> Option<usize> {
    let hashes = src[i + 1..].iter().take_while(|&&c| c == b'#').count();
    if src.get(i + 1 + hashes) != Some(&b'"') {
        return None;
    }
    let mut closing = vec![b'"'];
    closing.extend(std::iter::repeat(b'#').take(hashes));
    let body = i + 2 + hashes;
    Some(
        src[body.min(src.len())..]
            .windows(closing.len())
            .position(|w| w == closing.as_slice())
            .map_or(src.len(), |p| body + p + closing.len()),
    )
}

/// End of a Rust char literal starting at `i`, or `None` for a lifetime like `'a`.
fn rust_char_end(text: &str, i: usize) -> Option<usize> {
    let rest = &text[i + 1..];
    if let Some(escaped) = rest.strip_prefix('\\') {
        // '\n', '\'', '\u{1F600}'
        let skip = escaped.chars().next()?.len_utf8();
        let close = escaped[skip..].find('\'')?;
        return Some(i + 2 + skip + close + 1);
    }
    let ch = rest.chars().next()?;
    rest[ch.len_utf8()..]
        .starts_with('\'')
        .then_some(i + 1 + ch.len_utf8() + 1)
}

struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1).filter(|&s| s < text.len()));
        LineIndex { starts }
    }

    /// 1-based line containing byte `offset`
    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset).max(1)
    }

    fn count(&self) -> usize {
        self.starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(path: &str, text: &str) -> Vec<FunctionSpan> {
        let lang = Language::from_path(path).unwrap();
        parse_source(path, text, lang).unwrap()
    }

    fn named<'a>(functions: &'a [FunctionSpan], name: &str) -> &'a FunctionSpan {
        functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function {name} in {functions:?}"))
    }

    #[test]
    fn typescript_function_with_five_ifs() {
        let src = r#"
export function check(a: number, b: number): string {
  if (a > 1) { return "a"; }
  if (b > 1) { return "b"; }
  if (a === b) { return "eq"; }
  if (a < 0) {
    return "neg";
  }
  if (b < 0) { return "negb"; }
  return "none";
}
"#;
        let fns = parse("b.ts", src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "check");
        assert_eq!(fns[0].branches, 5);
        assert_eq!(fns[0].start_line, 2);
        assert_eq!(fns[0].end_line, 11);
        assert_eq!(fns[0].nesting_depth, 1);
    }

    #[test]
    fn code_without_functions_is_one_module_path() {
        let src = "const a = 1;\nconst b = 2;\nexport const c = a + b;\n";
        let fns = parse("a.ts", src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "<module>");
        assert_eq!(fns[0].branches, 0);
    }

    #[test]
    fn strings_and_comments_do_not_count() {
        let src = r#"
function f() {
  // if (x) { while (y) {} }
  const s = "if (a && b) {";
  const t = `for ${x} || case`;
  /* catch
     if */
  return s;
}
"#;
        let fns = parse("x.js", src);
        assert_eq!(named(&fns, "f").branches, 0);
    }

    #[test]
    fn nested_functions_are_counted_separately() {
        let src = r#"
function outer(xs) {
  if (xs) {}
  const inner = (x) => {
    if (x && xs) { return 1; }
    return 0;
  };
  return xs.map(inner);
}
"#;
        let fns = parse("n.js", src);
        assert_eq!(named(&fns, "outer").branches, 1);
        assert_eq!(named(&fns, "inner").branches, 2);
        assert!(fns.iter().all(|f| f.name != "<module>"));
    }

    #[test]
    fn class_methods_and_calls() {
        let src = r#"
class Store {
  private items: Item[] = [];

  async load(id: string): Promise<Item | undefined> {
    for (const item of this.items) {
      if (item.id === id) return item;
    }
    return undefined;
  }

  clear(): void {
    this.items = [];
  }
}
register(new Store());
"#;
        let fns = parse("store.ts", src);
        assert_eq!(named(&fns, "load").branches, 2);
        assert_eq!(named(&fns, "clear").branches, 0);
        assert!(fns.iter().all(|f| f.name != "register"));
    }

    #[test]
    fn rust_match_arms_and_lifetimes() {
        let src = r#"
fn pick<'a>(x: Option<&'a str>, c: char) -> &'a str {
    let _q = '{';
    match x {
        Some(v) if v.is_empty() => "empty",
        Some(v) => v,
        None => "none",
    }
}

trait T {
    fn declared(&self);
}
"#;
        let fns = parse("lib.rs", src);
        assert_eq!(fns.len(), 1);
        let pick = named(&fns, "pick");
        // `if` guard + three arms
        assert_eq!(pick.branches, 4);
        assert_eq!(pick.nesting_depth, 1);
    }

    #[test]
    fn go_methods_with_result_lists() {
        let src = r#"package main

func (s *Server) Start(addr string) (err error) {
	for i := 0; i < 3; i++ {
		if err = s.try(addr); err == nil || i > 5 {
			return nil
		}
	}
	return err
}
"#;
        let fns = parse("server.go", src);
        let start = named(&fns, "Start");
        assert_eq!(start.branches, 3);
        assert_eq!(start.nesting_depth, 2);
    }

    #[test]
    fn java_methods_skip_control_flow_and_anonymous_classes() {
        let src = r#"
public class App {
    public static void main(String[] args) throws Exception {
        try {
            run(args);
        } catch (IOException e) {
            System.exit(1);
        }
        Runnable r = new Runnable() {
            public void run() {
                while (true) {}
            }
        };
    }
}
"#;
        let fns = parse("App.java", src);
        assert_eq!(named(&fns, "main").branches, 1);
        assert_eq!(named(&fns, "run").branches, 1);
        assert!(fns.iter().all(|f| f.name != "Runnable"));
    }

    #[test]
    fn python_indentation_bodies() {
        let src = r#"
import os

def outer(path):
    """docstring with if and or"""
    if os.path.exists(path) and path:
        def helper(x):
            return x if x else None
        return helper(path)
    elif path:
        pass
    return None

def inline(): return 1
"#;
        let fns = parse("tool.py", src);
        let outer = named(&fns, "outer");
        assert_eq!(outer.branches, 3);
        assert_eq!(outer.start_line, 4);
        assert_eq!(outer.end_line, 12);
        assert_eq!(named(&fns, "helper").branches, 1);
        assert_eq!(named(&fns, "inline").branches, 0);
    }

    #[test]
    fn unbalanced_braces_fail() {
        let err = parse_source("bad.ts", "function f() {\n  if (x) {\n", Language::TypeScript).unwrap_err();
        assert!(matches!(err, ParseError::Unbalanced { .. }));
    }

    #[test]
    fn languages_without_grammar_are_reported() {
        let err = parse_source("README.md", "# title", Language::Markdown).unwrap_err();
        assert!(matches!(err, ParseError::UnparseableLanguage { .. }));
    }

    #[test]
    fn language_detection() {
        assert_eq!(Language::from_path("src/app.tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("Dockerfile"), Some(Language::Dockerfile));
        assert_eq!(Language::from_path(".gitignore"), None);
        assert_eq!(Language::from_path("bin/tool"), None);
        assert_eq!(Language::from_shebang("#!/usr/bin/env python3"), Some(Language::Python));
        assert_eq!(Language::from_shebang("#!/bin/bash -e"), Some(Language::Shell));
        assert_eq!(Language::from_shebang("#!/usr/bin/env -S node --flag"), Some(Language::JavaScript));
        assert_eq!(Language::from_shebang("no shebang"), None);
    }

    #[test]
    fn ternaries_count_but_optional_chaining_does_not() {
        let src = r#"
function pick(x, y) {
  const a = x ? 1 : 2;
  const b = y?.value ?? 0;
  return a
    ? b
    : 0;
}

function optional(a?: number, b?: string): number {
  return a ?? 0;
}
"#;
        let fns = parse("pick.ts", src);
        assert_eq!(named(&fns, "pick").branches, 2);
        assert_eq!(named(&fns, "optional").branches, 0);
    }

    #[test]
    fn rust_closures_are_not_logical_or() {
        let src = r#"
fn spawn_all(flag: bool) {
    let a = || 1;
    let b = move || 2;
    run(|| 3, || 4);
    if a() == 1 || b() == 2 {}
    let c = flag || a() > 0;
}
"#;
        let fns = parse("spawn.rs", src);
        // `if` and two real `||`
        assert_eq!(named(&fns, "spawn_all").branches, 3);
    }

    #[test]
    fn regex_literals_do_not_open_blocks() {
        let src = r#"
export function strip(s: string, total: number, count: number): string {
  const re = /[/}]+/g;
  const half = total / 2 / count;
  return s.replace(/\{/g, '').replace(re, "") + half;
}
"#;
        let fns = parse("strip.ts", src);
        assert_eq!(fns.len(), 1);
        assert_eq!(fns[0].name, "strip");
        assert_eq!(fns[0].end_line, 6);
    }

    #[test]
    fn jsx_text_apostrophes_are_not_strings() {
        let src = r#"
export function Welcome({ name }: Props) {
  if (!name) {
    return <p>Don't panic</p>;
  }
  return (
    <div className="hello">
      <h1>It's {name}</h1>
    </div>
  );
}
"#;
        let fns = parse("Welcome.tsx", src);
        let welcome = named(&fns, "Welcome");
        assert_eq!(welcome.branches, 1);
        assert_eq!(welcome.end_line, 11);
    }

    #[test]
    fn kotlin_when_arms_are_branches() {
        let src = r#"
fun describe(x: Int): String {
    val inc = { y: Int -> y + 1 }
    return when (inc(x)) {
        1 -> "one"
        2, 3 -> "few"
        else -> "many"
    }
}
"#;
        let fns = parse("Describe.kt", src);
        assert_eq!(named(&fns, "describe").branches, 2);
    }

    #[test]
    fn cognitive_weighs_nesting() {
        let src = r#"
function walk(items: Item[]) {
  for (const item of items) {
    if (item.ok && item.ready) {
      continue;
    } else if (item.retry) {
      retry(item);
    } else {
      fail(item);
    }
  }
}
"#;
        let walk = named(&parse("walk.ts", src), "walk").clone();
        assert_eq!(walk.branches, 4);
        // for +1, nested if +2, && +1, else if +1, else +1
        assert_eq!(walk.cognitive, 6);

        let py = r#"
def scan(rows):
    for row in rows:
        if row:
            pass
        elif not row:
            pass
    return 1
"#;
        let scan = named(&parse("scan.py", py), "scan").clone();
        assert_eq!(scan.branches, 3);
        assert_eq!(scan.cognitive, 4);
    }

    fn blob_entries(repo: &Repository, files: &[(&str, &[u8])]) -> Vec<HeadEntry> {
        files
            .iter()
            .map(|(path, content)| HeadEntry {
                path: path.to_string(),
                blob_id: repo.blob(content).unwrap().to_string(),
            })
            .collect()
    }

    #[test]
    fn parse_files_stubs_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut entries = blob_entries(
            &repo,
            &[
                ("a.ts", b"export function f() {\n  return 1;\n}\n"),
                ("binary.png", &[0x89, b'P', b'N', b'G', 0, 0, 1, 2]),
                ("notes.md", b"# Notes\n\nhello\n"),
                ("run", b"#!/usr/bin/env python3\nif True:\n    print(1)\n"),
                ("broken.go", b"func f() {\n"),
                ("LICENSE", b"MIT\n"),
            ],
        );
        entries.push(HeadEntry {
            path: "missing.rs".into(),
            blob_id: "0123456789abcdef0123456789abcdef01234567".into(),
        });
        let files = parse_files(&entries, dir.path(), 1024, &ProgressBar::hidden());

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["a.ts", "binary.png", "notes.md", "run", "broken.go", "LICENSE", "missing.rs"]);

        assert_eq!(files[0].language, "typescript");
        assert!(matches!(&files[0].structure, Structure::Parsed(f) if f.len() == 1));
        assert_eq!(files[0].hash, entries[0].blob_id);

        assert_eq!(files[1].language, "unknown");
        assert_eq!(files[1].stub_reason(), Some(StubReason::Binary));

        assert_eq!(files[2].language, "markdown");
        assert_eq!(files[2].stub_reason(), Some(StubReason::NoGrammar));
        assert_eq!(files[2].loc, 3);

        assert_eq!(files[3].language, "python");
        assert!(files[3].stub_reason().is_none());

        assert_eq!(files[4].language, "unparseable");
        assert_eq!(files[4].stub_reason(), Some(StubReason::Unparseable));

        assert_eq!(files[5].language, "unknown");
        assert_eq!(files[5].stub_reason(), Some(StubReason::UnknownLanguage));

        assert_eq!(files[6].language, "rust");
        assert_eq!(files[6].stub_reason(), Some(StubReason::Unreadable));
    }

    #[test]
    fn oversized_blobs_are_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let entries = blob_entries(&repo, &[("big.rs", b"fn a() {}\nfn b() {}\n"), ("big.bin", &[0u8; 64])]);

        let file = parse_blob(&repo, &entries[0], 4);
        assert_eq!(file.language, "rust");
        assert_eq!(file.loc, 0);
        assert_eq!(file.stub_reason(), Some(StubReason::TooLarge));

        let file = parse_blob(&repo, &entries[1], 4);
        assert_eq!(file.language, "unknown");
        assert_eq!(file.stub_reason(), Some(StubReason::TooLarge));
    }

    #[test]
    fn head_content_wins_over_the_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export function f(x) {\n  return x;\n}\n").unwrap();
        std::fs::write(dir.path().join("b.ts"), "export const b = 1;\n").unwrap();
        {
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("src/a.ts")).unwrap();
            index.add_path(Path::new("b.ts")).unwrap();
            let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
            let sig = git2::Signature::now("Ada", "ada@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[]).unwrap();
        }

        // Uncommitted edits and deletions must not leak into the analysis.
        std::fs::write(
            dir.path().join("src/a.ts"),
            "export function f(x) {\n  if (x) {}\n  if (!x) {}\n  return x;\n}\n",
        )
        .unwrap();
        std::fs::remove_file(dir.path().join("b.ts")).unwrap();

        let ignore = [Regex::new(r"^b\.ts$").unwrap()];
        let all = discover_files(&repo, dir.path(), &[]).unwrap();
        assert_eq!(all.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(), ["b.ts", "src/a.ts"]);
        assert_eq!(discover_files(&repo, dir.path(), &ignore).unwrap().len(), 1);

        let files = parse_files(&all, dir.path(), 1024, &ProgressBar::hidden());
        assert!(files.iter().all(|f| f.stub_reason().is_none()), "{files:?}");
        assert_eq!(files[1].loc, 3);
        let Structure::Parsed(functions) = &files[1].structure else {
            panic!("src/a.ts was not parsed");
        };
        assert_eq!(functions[0].branches, 0);
    }
}
