//! Leading-comment metadata extraction for shell scripts.
//!
//! Scripts describe themselves in the comment block at the top of the file:
//!
//! ```bash
//! #!/bin/bash
//! # Description: Sync photos to the backup drive
//! # Usage: sync-photos.sh [options] <source>
//! # Options:
//! #   -n, --dry-run        Print actions without executing
//! #   -o, --output=DIR     Destination directory
//! # Arguments:
//! #   source               Directory to sync from
//! # Choices:
//! #   output: /mnt/a, /mnt/b
//! ```
//!
//! The block is consumed by a line scanner with explicit states (header,
//! options, arguments, choices) rather than free-floating pattern matching,
//! so a line is only ever interpreted in the context of the block it sits
//! in. Scanning stops at the first non-comment, non-blank line.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::scripts::{Script, ScriptArgument};

/// `-n, --dry-run Desc` / `-o, --output=DIR Desc` / `-f FILE Desc`.
/// Placeholders are ALL-CAPS tokens so flag descriptions starting with a
/// capitalized word don't get misread as value placeholders.
static SHORT_FLAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-[a-zA-Z])(?:,\s*(--[a-zA-Z][-a-zA-Z0-9]*))?(?:[= ]([A-Z][A-Z0-9_]*))?\s+(.+)$")
        .expect("invalid short-flag pattern")
});

/// `--verbose Desc` / `--output=DIR Desc`.
static LONG_FLAG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(--[a-zA-Z][-a-zA-Z0-9]*)(?:[= ]([A-Z][A-Z0-9_]*))?\s+(.+)$")
        .expect("invalid long-flag pattern")
});

/// `input Desc` / `<output> Desc`.
static POSITIONAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<?(\w+)>?\s+(.+)$").expect("invalid positional pattern"));

/// `format: json, yaml, text`.
static CHOICES_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][-A-Za-z0-9_]*)\s*:\s*(.+)$").expect("invalid choices pattern")
});

/// Which block of the comment header the scanner is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Header,
    Options,
    Arguments,
    Choices,
}

/// Parse a script file into a [`Script`]. An unreadable file still yields a
/// catalog entry, just with no metadata.
pub fn parse_script(path: &Path) -> Script {
    let mut script = Script::new(&path.to_string_lossy());

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read script, keeping bare entry");
            return script;
        }
    };

    let parsed = parse_header(&content);
    script.description = parsed.description;
    script.usage = parsed.usage;
    script.arguments = parsed.arguments;
    script
}

/// Metadata extracted from a script's leading comment block.
#[derive(Debug, Clone, Default)]
pub struct ParsedMetadata {
    pub description: String,
    pub usage: Option<String>,
    pub arguments: Vec<ScriptArgument>,
}

/// Scan the leading comment block of `content`.
pub fn parse_header(content: &str) -> ParsedMetadata {
    let mut meta = ParsedMetadata::default();
    let mut block = Block::Header;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("#!") {
            continue;
        }
        // First non-comment, non-blank line ends the header.
        if !trimmed.starts_with('#') && !trimmed.is_empty() {
            break;
        }

        let comment = trimmed.trim_start_matches('#').trim();
        let lowered = comment.to_ascii_lowercase();

        if let Some(rest) = keyword_value(comment, &lowered, "description:") {
            meta.description = rest.to_string();
            block = Block::Header;
        } else if let Some(rest) = keyword_value(comment, &lowered, "usage:") {
            meta.usage = Some(rest.to_string());
            block = Block::Header;
        } else if lowered == "options:" {
            block = Block::Options;
        } else if lowered == "arguments:" {
            block = Block::Arguments;
        } else if lowered == "choices:" {
            block = Block::Choices;
        } else {
            match block {
                Block::Header => {
                    // First free-form comment doubles as the description.
                    if meta.description.is_empty() && !comment.is_empty() {
                        meta.description = comment.to_string();
                    }
                }
                Block::Options => {
                    if let Some(arg) = parse_option_line(comment) {
                        meta.arguments.push(arg);
                    }
                }
                Block::Arguments => {
                    if let Some(arg) = parse_positional_line(comment) {
                        meta.arguments.push(arg);
                    }
                }
                Block::Choices => apply_choices_line(comment, &mut meta.arguments),
            }
        }
    }

    debug!(
        argument_count = meta.arguments.len(),
        has_usage = meta.usage.is_some(),
        "Parsed script header"
    );
    meta
}

fn keyword_value<'a>(comment: &'a str, lowered: &str, keyword: &str) -> Option<&'a str> {
    if lowered.starts_with(keyword) {
        Some(comment[keyword.len()..].trim())
    } else {
        None
    }
}

fn parse_option_line(line: &str) -> Option<ScriptArgument> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Some(caps) = SHORT_FLAG_LINE.captures(line) {
        let placeholder = caps.get(3).map(|m| m.as_str());
        return Some(ScriptArgument::flag(
            caps.get(1).map(|m| m.as_str()),
            caps.get(2).map(|m| m.as_str()),
            caps.get(4).map(|m| m.as_str()).unwrap_or(""),
            placeholder.is_some(),
            placeholder,
        ));
    }

    if let Some(caps) = LONG_FLAG_LINE.captures(line) {
        let placeholder = caps.get(2).map(|m| m.as_str());
        return Some(ScriptArgument::flag(
            None,
            caps.get(1).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()).unwrap_or(""),
            placeholder.is_some(),
            placeholder,
        ));
    }

    None
}

fn parse_positional_line(line: &str) -> Option<ScriptArgument> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    POSITIONAL_LINE.captures(line).map(|caps| {
        ScriptArgument::positional(
            caps.get(1).map(|m| m.as_str()).unwrap_or(""),
            caps.get(2).map(|m| m.as_str()).unwrap_or(""),
        )
    })
}

/// Attach an exclusive choice list to a previously-declared argument. The
/// key matches an option's long flag (without the dashes) or any argument's
/// placeholder, case-insensitively.
fn apply_choices_line(line: &str, arguments: &mut [ScriptArgument]) {
    let Some(caps) = CHOICES_LINE.captures(line.trim()) else {
        return;
    };
    let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let values: Vec<String> = caps
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or("")
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return;
    }

    let target = arguments.iter_mut().find(|arg| {
        arg.long_flag
            .as_deref()
            .and_then(|f| f.strip_prefix("--"))
            .is_some_and(|f| f.eq_ignore_ascii_case(key))
            || arg
                .placeholder
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(key))
    });

    match target {
        Some(arg) => arg.choices = Some(values),
        None => debug!(key = key, "Choices line matched no declared argument"),
    }
}
