// Locating the input files and preparing their content.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::debug;
use snafu::prelude::*;

use crate::tally::*;

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Shell-style matching of a file name: `*` matches any sequence of
/// characters and `?` exactly one.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let n: Vec<char> = name.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut ni, mut pi) = (0, 0);
    // Position of the last star in the pattern, and of the name when it was met.
    let mut star: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            ni += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// The files of `directory` matching `pattern`, in lexicographic order of
/// their names. This order is the processing order of the batches.
pub fn find_batches(directory: &Path, pattern: &str) -> BTallyResult<Vec<PathBuf>> {
    let empty = || {
        Box::new(TallyError::EmptyInput {
            pattern: pattern.to_string(),
            directory: directory.display().to_string(),
        })
    };
    if !directory.is_dir() {
        return Err(empty());
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(directory)
        .context(OpeningFileSnafu {
            path: directory.display().to_string(),
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && matches_pattern(&simplify_file_name(p), pattern))
        .collect();
    paths.sort_by_key(|p| simplify_file_name(p));
    debug!("find_batches: {:?} {:?}: {:?}", directory, pattern, paths);
    if paths.is_empty() {
        return Err(empty());
    }
    Ok(paths)
}

/// Copies `input` to `output` without its `#` comment lines. Returns the
/// number of lines removed.
pub fn strip_comments<R: BufRead, W: Write>(input: R, mut output: W) -> std::io::Result<usize> {
    let mut removed = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim_start().starts_with('#') {
            removed += 1;
        } else {
            writeln!(output, "{}", line)?;
        }
    }
    output.flush()?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards() {
        assert!(matches_pattern("results_prod.csv", "results_prod*.csv"));
        assert!(matches_pattern("results_prod (3).csv", "results_prod*.csv"));
        assert!(matches_pattern("bloco_1.csv", "bloco_?.csv"));
        assert!(matches_pattern("anything", "*"));
        assert!(!matches_pattern("results_prod.txt", "results_prod*.csv"));
        assert!(!matches_pattern("bloco_12.csv", "bloco_?.csv"));
        assert!(!matches_pattern("other_results_prod.csv", "results_prod*.csv"));
    }

    #[test]
    fn batches_are_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["results_prod_b.csv", "notes.txt", "results_prod_a.csv"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        let found: Vec<String> = find_batches(dir.path(), "results_prod*.csv")
            .unwrap()
            .iter()
            .map(|p| simplify_file_name(p))
            .collect();
        assert_eq!(found, vec!["results_prod_a.csv", "results_prod_b.csv"]);
    }

    #[test]
    fn no_match_is_an_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let res = find_batches(dir.path(), "results_prod*.csv").map_err(|e| *e);
        assert!(matches!(res, Err(TallyError::EmptyInput { .. })));
        let missing = dir.path().join("missing");
        assert!(matches!(
            find_batches(&missing, "*").map_err(|e| *e),
            Err(TallyError::EmptyInput { .. })
        ));
    }

    #[test]
    fn comments_are_stripped() {
        let input = "# header\n# Columns below\nA,1\n  # indented\nB,2\n";
        let mut out: Vec<u8> = Vec::new();
        let removed = strip_comments(input.as_bytes(), &mut out).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "A,1\nB,2\n");
    }
}
