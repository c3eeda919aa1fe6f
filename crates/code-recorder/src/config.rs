//! Recorder configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! `CODE_RECORDER_*` environment variables.
//!
//! ```toml
//! export_path = "${workspaceFolder}/code-recordings"
//! create_path_outside_workspace = false
//! add_to_gitignore = true
//! export_formats = ["SRT", "JSON"]
//! strict_replay = false
//! ```

use std::collections::HashMap;
use std::path::Path;

use edit_log::{ExportFormat, FaultPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, Result};

/// Default export path template.
pub const DEFAULT_EXPORT_PATH: &str = "${workspaceFolder}/code-recordings";

/// Environment variable prefix.
pub const DEFAULT_PREFIX: &str = "CODE_RECORDER";

/// Recorder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Destination directory template.
    pub export_path: String,
    /// Create the destination even when it lies outside the workspace.
    pub create_path_outside_workspace: bool,
    /// Add the destination to the workspace `.gitignore`.
    pub add_to_gitignore: bool,
    /// Formats produced when a session stops.
    pub export_formats: Vec<ExportFormat>,
    /// Abort the export on the first reconstruction fault.
    pub strict_replay: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            export_path: DEFAULT_EXPORT_PATH.to_string(),
            create_path_outside_workspace: false,
            add_to_gitignore: false,
            export_formats: vec![ExportFormat::Srt, ExportFormat::Json],
            strict_replay: false,
        }
    }
}

impl RecorderConfig {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::io_context(format!("reading config {}", path.display()), e)
        })?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RecorderError::config(e.to_string()))
    }

    /// Set the export path template.
    #[must_use]
    pub fn with_export_path(mut self, path: impl Into<String>) -> Self {
        self.export_path = path.into();
        self
    }

    /// Set the export formats.
    #[must_use]
    pub fn with_formats(mut self, formats: impl IntoIterator<Item = ExportFormat>) -> Self {
        self.export_formats = formats.into_iter().collect();
        self
    }

    /// Allow creating a destination outside the workspace.
    #[must_use]
    pub const fn with_create_outside_workspace(mut self, create: bool) -> Self {
        self.create_path_outside_workspace = create;
        self
    }

    /// Add the destination to `.gitignore`.
    #[must_use]
    pub const fn with_gitignore(mut self, add: bool) -> Self {
        self.add_to_gitignore = add;
        self
    }

    /// Abort exports on reconstruction faults.
    #[must_use]
    pub const fn with_strict_replay(mut self, strict: bool) -> Self {
        self.strict_replay = strict;
        self
    }

    /// Fault policy for replay.
    #[must_use]
    pub const fn fault_policy(&self) -> FaultPolicy {
        if self.strict_replay {
            FaultPolicy::Reject
        } else {
            FaultPolicy::Clamp
        }
    }

    /// Apply environment overrides.
    pub fn apply_env(mut self, env: &EnvConfig) -> Result<Self> {
        if let Some(path) = env.get(vars::EXPORT_PATH) {
            self.export_path = path;
        }
        if let Some(list) = env.get(vars::EXPORT_FORMATS) {
            self.export_formats = parse_formats(&list)?;
        }
        if let Some(create) = env.bool(vars::CREATE_PATH_OUTSIDE_WORKSPACE) {
            self.create_path_outside_workspace = create;
        }
        if let Some(add) = env.bool(vars::ADD_TO_GITIGNORE) {
            self.add_to_gitignore = add;
        }
        if let Some(strict) = env.bool(vars::STRICT_REPLAY) {
            self.strict_replay = strict;
        }
        Ok(self)
    }
}

/// Parse a comma-separated format list. Blank entries are ignored.
pub fn parse_formats(list: &str) -> Result<Vec<ExportFormat>> {
    let mut formats = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let format: ExportFormat = entry.parse().map_err(RecorderError::config)?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    Ok(formats)
}

/// Environment variable reader over a snapshot of variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    vars: HashMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_env(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Snapshot the process environment.
    #[must_use]
    pub fn from_env(prefix: impl Into<String>) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Build from explicit variables.
    #[must_use]
    pub fn from_vars(
        prefix: impl Into<String>,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            vars: vars.into_iter().collect(),
        }
    }

    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(&self.var_name(name)).cloned()
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Check if a variable is set.
    #[must_use]
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Recognized environment variables, without the prefix.
pub mod vars {
    /// Export path template.
    pub const EXPORT_PATH: &str = "EXPORT_PATH";
    /// Comma-separated export formats.
    pub const EXPORT_FORMATS: &str = "EXPORT_FORMATS";
    /// Create the destination outside the workspace.
    pub const CREATE_PATH_OUTSIDE_WORKSPACE: &str = "CREATE_PATH_OUTSIDE_WORKSPACE";
    /// Add the destination to `.gitignore`.
    pub const ADD_TO_GITIGNORE: &str = "ADD_TO_GITIGNORE";
    /// Abort exports on reconstruction faults.
    pub const STRICT_REPLAY: &str = "STRICT_REPLAY";
}
