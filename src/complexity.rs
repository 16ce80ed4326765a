// src/complexity.rs

use crate::config::TierThresholds;
use crate::model::*;
use rayon::prelude::*;

/// McCabe: one path through the function plus one per branch point.
pub fn cyclomatic(span: &FunctionSpan) -> u32 {
    span.branches.saturating_add(1)
}

/// Lines spanned by the function, header and closing line included.
pub fn function_loc(span: &FunctionSpan) -> usize {
    span.end_line.saturating_sub(span.start_line) + 1
}

/// Pure function of the score; the same score always lands in the same tier.
pub fn tier(score: u32, thresholds: &TierThresholds) -> DifficultyTier {
    if score < thresholds.moderate {
        DifficultyTier::Trivial
    } else if score < thresholds.complex {
        DifficultyTier::Moderate
    } else if score < thresholds.extreme {
        DifficultyTier::Complex
    } else {
        DifficultyTier::Extreme
    }
}

pub fn analyze_file(file: &ParsedFile, thresholds: &TierThresholds) -> FileComplexity {
    let (functions, stub) = match &file.structure {
        Structure::Parsed(spans) => {
            let functions: Vec<FunctionComplexity> = spans
                .iter()
                .map(|span| FunctionComplexity {
                    name: span.name.clone(),
                    file: file.path.clone(),
                    start_line: span.start_line,
                    end_line: span.end_line,
                    loc: function_loc(span),
                    complexity: cyclomatic(span),
                    cognitive: span.cognitive,
                    nesting_depth: span.nesting_depth,
                })
                .collect();
            (functions, None)
        }
        Structure::Stub(reason) => (Vec::new(), Some(*reason)),
    };
    let complexity = functions.iter().fold(0u32, |acc, f| acc.saturating_add(f.complexity));
    let cognitive = functions.iter().fold(0u32, |acc, f| acc.saturating_add(f.cognitive));

    FileComplexity {
        path: file.path.clone(),
        language: file.language.clone(),
        complexity,
        cognitive,
        difficulty: tier(complexity, thresholds),
        stub,
        functions,
    }
}

/// Analyze every file in parallel, keeping input order.
pub fn analyze_all(files: &[ParsedFile], thresholds: &TierThresholds) -> Vec<FileComplexity> {
    files.par_iter().map(|file| analyze_file(file, thresholds)).collect()
}
