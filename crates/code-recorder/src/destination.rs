//! Destination directory resolution.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("template variable pattern is a valid regex")
});

/// Values substituted into an export path template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars {
    /// Workspace root, if the host has one open.
    pub workspace: Option<PathBuf>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
}

impl TemplateVars {
    /// Variables for `workspace` with the home directory from the environment.
    #[must_use]
    pub fn for_workspace(workspace: Option<&Path>) -> Self {
        Self {
            workspace: workspace.map(Path::to_path_buf),
            home: home_dir(),
        }
    }
}

/// The current user's home directory.
#[must_use]
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Expand `${workspaceFolder}`, `${workspaceFolderBasename}` and `${userHome}`.
pub fn expand_template(template: &str, vars: &TemplateVars) -> Result<String> {
    let mut failure = None;
    let expanded = VARIABLE.replace_all(template, |caps: &Captures<'_>| {
        match lookup(&caps[1], vars) {
            Ok(value) => value,
            Err(err) => {
                failure.get_or_insert(err);
                String::new()
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(expanded.into_owned()),
    }
}

fn lookup(name: &str, vars: &TemplateVars) -> Result<String> {
    let workspace = || {
        vars.workspace.as_deref().ok_or_else(|| {
            RecorderError::no_destination(format!("${{{name}}} requires an open workspace"))
        })
    };
    match name {
        "workspaceFolder" => Ok(workspace()?.to_string_lossy().into_owned()),
        "workspaceFolderBasename" => Ok(workspace()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()),
        "userHome" => vars
            .home
            .as_deref()
            .map(|h| h.to_string_lossy().into_owned())
            .ok_or_else(|| RecorderError::config("${userHome} is not available")),
        other => Err(RecorderError::config(format!(
            "unknown variable ${{{other}}} in export path"
        ))),
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Resolve and prepare the directory session files are written to.
pub fn resolve(config: &RecorderConfig, vars: &TemplateVars) -> Result<PathBuf> {
    let expanded = expand_template(&config.export_path, vars)?;
    let mut path = PathBuf::from(expanded);
    if path.is_relative() {
        let Some(workspace) = vars.workspace.as_deref() else {
            return Err(RecorderError::no_destination(format!(
                "relative export path {} requires an open workspace",
                path.display()
            )));
        };
        path = workspace.join(path);
    }
    let path = normalize(&path);

    let workspace = vars
        .workspace
        .as_deref()
        .map(normalize)
        .filter(|w| path.starts_with(w));

    if !path.is_dir() {
        if workspace.is_none() && !config.create_path_outside_workspace {
            return Err(RecorderError::no_destination(format!(
                "{} does not exist",
                path.display()
            )));
        }
        fs::create_dir_all(&path).map_err(|e| {
            RecorderError::io_context(format!("creating {}", path.display()), e)
        })?;
        tracing::info!(path = %path.display(), "Created recording directory");
    }

    if config.add_to_gitignore {
        match workspace {
            Some(workspace) => {
                add_to_gitignore(&workspace, &path)?;
            }
            None => tracing::debug!(
                path = %path.display(),
                "Destination is outside the workspace; not adding to .gitignore"
            ),
        }
    }

    Ok(path)
}

/// Append `destination` to `<workspace>/.gitignore` unless already listed.
///
/// Returns whether an entry was added. Destinations that do not lie inside
/// the workspace are never listed.
pub fn add_to_gitignore(workspace: &Path, destination: &Path) -> Result<bool> {
    let destination = normalize(destination);
    let Ok(relative) = destination.strip_prefix(normalize(workspace)) else {
        return Ok(false);
    };
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        tracing::debug!(
            path = %destination.display(),
            "Not listing a path that leaves the workspace"
        );
        return Ok(false);
    }
    let entry = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if entry.is_empty() {
        return Ok(false);
    }

    let gitignore = workspace.join(".gitignore");
    let existing = match fs::read_to_string(&gitignore) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(RecorderError::io_context(
                format!("reading {}", gitignore.display()),
                e,
            ));
        }
    };

    let listed = existing.lines().any(|line| {
        let line = line.trim().trim_start_matches('/').trim_end_matches('/');
        line == entry
    });
    if listed {
        return Ok(false);
    }

    let mut content = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry);
    content.push('\n');

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&gitignore)
        .and_then(|mut file| file.write_all(content.as_bytes()))
        .map_err(|e| RecorderError::io_context(format!("updating {}", gitignore.display()), e))?;
    tracing::info!(entry = %entry, "Added recording directory to .gitignore");
    Ok(true)
}
