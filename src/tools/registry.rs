//! Tool registry: introspectable schemas plus dispatch.
//!
//! Declarations are exported in the function-schema format the runtime's
//! tool-calling interface consumes. Arguments arrive as loose JSON from the
//! model and are validated into typed structs at this boundary — malformed
//! arguments become a returned message, never a panic inside tool logic.

use serde::Deserialize;

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::file_search;

// ─── Argument Schemas ───────────────────────────────────────────────────────

fn default_path() -> String {
    ".".to_string()
}

fn default_file_pattern() -> String {
    "*".to_string()
}

fn default_max_results() -> usize {
    20
}

/// Validated arguments for `search_files`.
#[derive(Debug, Deserialize)]
struct SearchFilesArgs {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default = "default_file_pattern")]
    file_pattern: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

/// Validated arguments for `find_files`.
#[derive(Debug, Deserialize)]
struct FindFilesArgs {
    name_pattern: String,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

// ─── Registry ───────────────────────────────────────────────────────────────

/// The set of tools the model may call during an agent loop.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry;

impl ToolRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Tool declarations for the runtime's tool-calling interface.
    ///
    /// Introspectable independent of execution — the orchestrator sends
    /// these with every dispatch round.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: "search_files".to_string(),
                    description: "Search for text patterns in files within a directory. \
                        Useful for finding code, logs, or specific content in files."
                        .to_string(),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": {
                            "pattern": {
                                "type": "string",
                                "description": "Text or regex pattern to search for in files. \
                                    Example: 'fn main', 'error', 'TODO'"
                            },
                            "path": {
                                "type": "string",
                                "description": "Directory path to search in. Can be relative \
                                    or absolute. Defaults to the current directory."
                            },
                            "file_pattern": {
                                "type": "string",
                                "description": "File glob pattern to filter by (e.g., '*.rs', \
                                    '*.txt'). Defaults to '*' (all files)."
                            },
                            "max_results": {
                                "type": "integer",
                                "description": "Maximum number of results to return. \
                                    Defaults to 20."
                            }
                        },
                        "required": ["pattern"]
                    }),
                },
            },
            ToolDefinition {
                r#type: "function".to_string(),
                function: FunctionDefinition {
                    name: "find_files".to_string(),
                    description: "Find files by name pattern within a directory. Useful for \
                        locating specific files or exploring directory structure."
                        .to_string(),
                    parameters: serde_json::json!({
                        "type": "object",
                        "properties": {
                            "name_pattern": {
                                "type": "string",
                                "description": "Filename pattern to search for (supports \
                                    wildcards). Example: '*.rs', 'config*', 'test_*.txt'"
                            },
                            "path": {
                                "type": "string",
                                "description": "Directory path to search in. Can be relative \
                                    or absolute. Defaults to the current directory."
                            },
                            "max_results": {
                                "type": "integer",
                                "description": "Maximum number of results to return. \
                                    Defaults to 20."
                            }
                        },
                        "required": ["name_pattern"]
                    }),
                },
            },
        ]
    }

    /// Execute a tool by name. Never panics — unknown tools and malformed
    /// arguments come back as message strings.
    pub fn execute(&self, name: &str, arguments: &serde_json::Value) -> String {
        match name {
            "search_files" => {
                match serde_json::from_value::<SearchFilesArgs>(arguments.clone()) {
                    Ok(args) => file_search::search_files(
                        &args.pattern,
                        &args.path,
                        &args.file_pattern,
                        args.max_results,
                    ),
                    Err(e) => format!("Invalid arguments for search_files: {e}"),
                }
            }
            "find_files" => match serde_json::from_value::<FindFilesArgs>(arguments.clone()) {
                Ok(args) => {
                    file_search::find_files(&args.name_pattern, &args.path, args.max_results)
                }
                Err(e) => format!("Invalid arguments for find_files: {e}"),
            },
            _ => format!("Unknown tool: {name}"),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_declare_both_tools() {
        let registry = ToolRegistry::new();
        let defs = registry.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.function.name.as_str()).collect();
        assert_eq!(names, vec!["search_files", "find_files"]);
        for def in &defs {
            assert_eq!(def.r#type, "function");
            assert!(def.function.parameters["properties"].is_object());
        }
    }

    #[test]
    fn definitions_mark_required_fields() {
        let registry = ToolRegistry::new();
        let defs = registry.definitions();
        assert_eq!(defs[0].function.parameters["required"][0], "pattern");
        assert_eq!(defs[1].function.parameters["required"][0], "name_pattern");
    }

    #[test]
    fn execute_dispatches_search_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("note.txt"), "needle here\n").unwrap();

        let registry = ToolRegistry::new();
        let result = registry.execute(
            "search_files",
            &serde_json::json!({
                "pattern": "needle",
                "path": dir.path().display().to_string()
            }),
        );
        assert!(result.contains("note.txt:1:needle here"));
    }

    #[test]
    fn execute_dispatches_find_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.txt"), "x").unwrap();

        let registry = ToolRegistry::new();
        let result = registry.execute(
            "find_files",
            &serde_json::json!({
                "name_pattern": "*.txt",
                "path": dir.path().display().to_string()
            }),
        );
        assert!(result.contains("report.txt"));
    }

    #[test]
    fn execute_rejects_unknown_tool() {
        let registry = ToolRegistry::new();
        let result = registry.execute("launch_rocket", &serde_json::json!({}));
        assert_eq!(result, "Unknown tool: launch_rocket");
    }

    #[test]
    fn execute_reports_missing_required_argument() {
        let registry = ToolRegistry::new();
        let result = registry.execute("search_files", &serde_json::json!({"path": "."}));
        assert!(result.starts_with("Invalid arguments for search_files:"));
    }

    #[test]
    fn execute_applies_argument_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "only line\n").unwrap();

        let registry = ToolRegistry::new();
        // file_pattern and max_results omitted — defaults apply.
        let result = registry.execute(
            "search_files",
            &serde_json::json!({
                "pattern": "only",
                "path": dir.path().display().to_string()
            }),
        );
        assert!(result.contains("a.txt:1:only line"));
    }
}
