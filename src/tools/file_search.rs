//! File search tools: content search and filename search.
//!
//! Both functions are infallible by contract — every failure mode becomes a
//! returned message string, so the agent loop can always feed the result
//! back to the model as a tool turn.

use std::path::{Path, PathBuf};

use globset::Glob;
use regex::Regex;
use walkdir::WalkDir;

/// Search file contents for a pattern under `path`.
///
/// `pattern` is compiled as a regex and falls back to a literal-escaped
/// match when it isn't valid regex syntax. `file_pattern` is a filename glob
/// (`*.rs`, `config*`). Results are numbered lines of
/// `"<relative-path>:<line>:<content>"`, capped at `max_results`.
pub fn search_files(pattern: &str, path: &str, file_pattern: &str, max_results: usize) -> String {
    let root = resolve_dir(path);
    if !root.is_dir() {
        return format!("Error: '{path}' is not a valid directory.");
    }
    if pattern.trim().is_empty() {
        return "Error: Search pattern cannot be empty.".to_string();
    }

    let regex = match Regex::new(pattern) {
        Ok(re) => re,
        // Not valid regex syntax — match it literally instead.
        Err(_) => match Regex::new(&regex::escape(pattern)) {
            Ok(re) => re,
            Err(e) => return format!("Error during search: {e}"),
        },
    };

    let matcher = match Glob::new(file_pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => return format!("Error: invalid file pattern '{file_pattern}': {e}"),
    };

    let mut results: Vec<String> = Vec::new();

    'walk: for entry in WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !matcher.is_match(entry.file_name()) {
            continue;
        }

        // Skip files that can't be read as text.
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(_) => continue,
        };

        let relative = entry
            .path()
            .strip_prefix(&root)
            .unwrap_or(entry.path())
            .display()
            .to_string();

        for (line_idx, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                results.push(format!("{relative}:{}:{}", line_idx + 1, line.trim_end()));
                if results.len() >= max_results {
                    break 'walk;
                }
            }
        }
    }

    if results.is_empty() {
        return format!(
            "No matches found for pattern '{pattern}' in {}",
            root.display()
        );
    }

    let mut formatted = String::from("Search results:\n");
    for (i, result) in results.iter().enumerate() {
        formatted.push_str(&format!("{}. {result}\n", i + 1));
    }
    if results.len() >= max_results {
        formatted.push_str(&format!(
            "\n(Showing {max_results} results. Adjust max_results to see more.)"
        ));
    }
    formatted
}

/// Find files by filename glob under `path`.
///
/// Returns numbered absolute paths, capped at `max_results`.
pub fn find_files(name_pattern: &str, path: &str, max_results: usize) -> String {
    let root = resolve_dir(path);
    if !root.is_dir() {
        return format!("Error: '{path}' is not a valid directory.");
    }
    if name_pattern.trim().is_empty() {
        return "Error: File name pattern cannot be empty.".to_string();
    }

    let matcher = match Glob::new(name_pattern) {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => return format!("Error: invalid file pattern '{name_pattern}': {e}"),
    };

    let mut results: Vec<String> = Vec::new();
    for entry in WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
            results.push(entry.path().display().to_string());
            if results.len() >= max_results {
                break;
            }
        }
    }

    if results.is_empty() {
        return format!(
            "No files found matching '{name_pattern}' in {}",
            root.display()
        );
    }

    let mut formatted = String::from("Found files:\n");
    for (i, result) in results.iter().enumerate() {
        formatted.push_str(&format!("{}. {result}\n", i + 1));
    }
    if results.len() >= max_results {
        formatted.push_str(&format!(
            "\n(Showing {max_results} results. Adjust max_results to see more.)"
        ));
    }
    formatted
}

/// Expand a leading `~` to the user's home directory.
fn resolve_dir(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    Path::new(path).to_path_buf()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
