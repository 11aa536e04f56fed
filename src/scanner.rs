//! Script discovery across configured scan locations.
//!
//! A scan walks every enabled location that exists, picks out shell
//! scripts, parses each one's metadata, and returns the result sorted
//! case-insensitively by name. Hidden files and directories are skipped;
//! the `recursive` flag controls whether subdirectories are descended.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::metadata;
use crate::scripts::{Script, ScriptCatalog};

/// Shebang interpreters that mark a file as a shell script.
const SHELL_SHEBANGS: &[&str] = &[
    "#!/bin/bash",
    "#!/bin/sh",
    "#!/bin/zsh",
    "#!/usr/bin/env bash",
    "#!/usr/bin/env sh",
    "#!/usr/bin/env zsh",
];

/// How many leading bytes to inspect for a shebang.
const SHEBANG_PROBE_LEN: usize = 64;

/// A directory the scanner looks for scripts in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanLocation {
    pub id: Uuid,
    pub path: String,
    pub label: String,
    pub is_enabled: bool,
    pub recursive: bool,
}

impl ScanLocation {
    pub fn new(path: &str) -> Self {
        let label = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        ScanLocation {
            id: Uuid::new_v4(),
            path: path.to_string(),
            label,
            is_enabled: true,
            recursive: true,
        }
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.path).is_dir()
    }
}

/// Walk all enabled locations and build a fresh catalog.
///
/// Every script is re-parsed from scratch; callers holding state keyed by
/// script identity must re-associate it by path.
#[instrument(skip_all, fields(location_count = locations.len()))]
pub fn scan(locations: &[ScanLocation]) -> ScriptCatalog {
    let mut scripts: Vec<Script> = Vec::new();

    for location in locations.iter().filter(|l| l.is_enabled) {
        if !location.exists() {
            warn!(path = %location.path, "Scan location missing, skipping");
            continue;
        }
        scan_directory(Path::new(&location.path), location.recursive, &mut scripts);
    }

    scripts.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });

    debug!(script_count = scripts.len(), "Scan complete");
    ScriptCatalog::new(scripts)
}

/// Scan a single directory, outside of any configured location.
pub fn scan_directory_into_catalog(dir: &Path, recursive: bool) -> ScriptCatalog {
    let mut scripts = Vec::new();
    scan_directory(dir, recursive, &mut scripts);
    scripts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    ScriptCatalog::new(scripts)
}

fn scan_directory(dir: &Path, recursive: bool, out: &mut Vec<Script>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Could not read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if recursive {
                scan_directory(&path, recursive, out);
            }
        } else if file_type.is_file() && is_shell_script(&path) {
            out.push(metadata::parse_script(&path));
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// A file counts as a shell script if it has a `.sh` extension, or if it is
/// executable and its first bytes carry a recognized shell shebang.
pub fn is_shell_script(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) == Some("sh") {
        return true;
    }

    if !is_executable(path) {
        return false;
    }

    let mut header = [0u8; SHEBANG_PROBE_LEN];
    let n = match fs::File::open(path).and_then(|mut f| f.read(&mut header)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    let header = String::from_utf8_lossy(&header[..n]);

    SHELL_SHEBANGS
        .iter()
        .any(|shebang| header.starts_with(shebang))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

/// Expand a user-supplied location path (`~/scripts`) to an absolute one.
pub fn expand_location_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}
