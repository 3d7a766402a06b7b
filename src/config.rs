//! Configuration defaults and persisted user settings.
//!
//! Settings live in a single JSON file merged over compiled-in defaults on
//! load. A missing file, an unreadable file, or invalid JSON silently yields
//! the defaults — the assistant must always be able to start.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ─── Defaults ───────────────────────────────────────────────────────────────

/// Default endpoint for the local model runtime.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default main text model.
pub const DEFAULT_MAIN_MODEL: &str = "qwen2.5:7b";

/// Default vision model for image turns.
pub const DEFAULT_VISION_MODEL: &str = "moondream:latest";

/// Default embedding model for the retrieval index.
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

/// Default system prompt seeded into every fresh conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Deskmate, a helpful desktop assistant. Assist the user and keep the \
conversation helpful, respectful, and accurate.

BEHAVIOR:
- Be concise and direct.
- Ask for clarification when a question is vague.
- Say so when you don't know something.

TOOLS:
- You can search file contents and find files by name. Use these tools when \
asked to locate files or look inside them.
- When you lack up-to-date information, suggest enabling web search.

FORMATTING:
- Use Markdown (headers, lists, bold).
- Use fenced code blocks with language identifiers.";

fn default_main_model() -> String {
    DEFAULT_MAIN_MODEL.to_string()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

// ─── Settings ───────────────────────────────────────────────────────────────

/// Persisted user settings.
///
/// Each field has a serde default, so a partial settings file merges
/// field-by-field over the compiled-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_main_model")]
    pub main_model: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            main_model: default_main_model(),
            vision_model: default_vision_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults on any failure.
    pub fn load(path: &Path) -> Settings {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Settings::default(),
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "invalid settings file — using defaults"
                );
                Settings::default()
            }
        }
    }

    /// Write settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}

/// The platform-standard settings file location.
///
/// Falls back to `~/.deskmate/settings.json` when no config directory can be
/// resolved.
pub fn default_settings_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deskmate")
    });
    base.join("deskmate").join("settings.json")
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let original = Settings {
            main_model: "llama3.1:8b".to_string(),
            vision_model: "llava:latest".to_string(),
            system_prompt: "You are a test assistant.".to_string(),
        };
        original.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded, original);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load(&dir.path().join("nope.json"));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn invalid_json_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not valid json").unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"main_model": "mistral:7b"}"#).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.main_model, "mistral:7b");
        assert_eq!(loaded.vision_model, DEFAULT_VISION_MODEL);
        assert_eq!(loaded.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("settings.json");
        Settings::default().save(&path).unwrap();
        assert!(path.exists());
    }
}
