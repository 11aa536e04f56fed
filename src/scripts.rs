//! Script and argument models plus the path-keyed catalog.
//!
//! A [`Script`] is an immutable snapshot of one shell script on disk: its
//! path, display name, and the typed argument list parsed from the leading
//! comment block. Scripts are re-created wholesale on every rescan; nothing
//! is merged with prior instances, so any state keyed by script identity
//! must instead be re-associated by path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One declared flag or positional argument of a script.
///
/// The declaration fields (`short_flag` through `choices`) come from the
/// metadata parser and never change after parsing. `is_enabled` and `value`
/// are runtime state toggled by the caller before a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptArgument {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_flag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long_flag: Option<String>,
    pub description: String,
    pub requires_value: bool,
    pub is_positional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Fixed value set for exclusive-selection arguments. When present,
    /// enablement is derived from `value` being non-empty; the `is_enabled`
    /// field is ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,

    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub value: String,
}

impl ScriptArgument {
    pub fn flag(
        short_flag: Option<&str>,
        long_flag: Option<&str>,
        description: &str,
        requires_value: bool,
        placeholder: Option<&str>,
    ) -> Self {
        ScriptArgument {
            id: Uuid::new_v4(),
            short_flag: short_flag.map(str::to_string),
            long_flag: long_flag.map(str::to_string),
            description: description.to_string(),
            requires_value,
            is_positional: false,
            placeholder: placeholder.map(str::to_string),
            choices: None,
            is_enabled: false,
            value: String::new(),
        }
    }

    pub fn positional(name: &str, description: &str) -> Self {
        ScriptArgument {
            id: Uuid::new_v4(),
            short_flag: None,
            long_flag: None,
            description: description.to_string(),
            requires_value: true,
            is_positional: true,
            placeholder: Some(name.to_string()),
            choices: None,
            is_enabled: false,
            value: String::new(),
        }
    }

    /// The flag token emitted on the command line. Long form wins when both
    /// are declared.
    pub fn flag_for_command(&self) -> Option<&str> {
        self.long_flag
            .as_deref()
            .or(self.short_flag.as_deref())
    }

    /// Human-facing label: `-f, --file`, `--file`, `-f`, or the placeholder.
    pub fn display_name(&self) -> String {
        match (&self.short_flag, &self.long_flag) {
            (Some(short), Some(long)) => format!("{}, {}", short, long),
            (None, Some(long)) => long.clone(),
            (Some(short), None) => short.clone(),
            (None, None) => self
                .placeholder
                .clone()
                .unwrap_or_else(|| "argument".to_string()),
        }
    }

    /// Effective enablement. Choice arguments are exclusive-selection: they
    /// count as enabled exactly when a choice has been picked.
    pub fn effective_enabled(&self) -> bool {
        if self.choices.is_some() {
            !self.value.is_empty()
        } else {
            self.is_enabled
        }
    }
}

/// An immutable parsed script. Identified by `id` in memory but keyed by
/// `path` everywhere that survives a rescan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub id: Uuid,
    pub path: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    pub arguments: Vec<ScriptArgument>,
}

impl Script {
    pub fn new(path: &str) -> Self {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Script {
            id: Uuid::new_v4(),
            path: path.to_string(),
            name,
            description: String::new(),
            usage: None,
            arguments: Vec::new(),
        }
    }

    /// The script's containing directory, used as the working directory so
    /// relative paths inside the script resolve correctly.
    pub fn directory(&self) -> PathBuf {
        Path::new(&self.path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"))
    }

    pub fn exists(&self) -> bool {
        Path::new(&self.path).exists()
    }
}

/// The live set of known scripts, keyed by exact filesystem path.
///
/// Replaced wholesale on rescan. Chain steps resolve against this by path
/// at run time, which can fail if a script was moved or deleted since the
/// step was configured.
#[derive(Debug, Clone, Default)]
pub struct ScriptCatalog {
    by_path: HashMap<String, Script>,
    ordered: Vec<String>,
}

impl ScriptCatalog {
    pub fn new(scripts: Vec<Script>) -> Self {
        let ordered = scripts.iter().map(|s| s.path.clone()).collect();
        let by_path = scripts.into_iter().map(|s| (s.path.clone(), s)).collect();
        ScriptCatalog { by_path, ordered }
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Script> {
        self.by_path.get(path)
    }

    /// Scripts in scan order (the scanner sorts by name).
    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.ordered.iter().filter_map(|p| self.by_path.get(p))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_variants() {
        let both = ScriptArgument::flag(Some("-v"), Some("--verbose"), "Verbose", false, None);
        assert_eq!(both.display_name(), "-v, --verbose");

        let long_only = ScriptArgument::flag(None, Some("--force"), "Force", false, None);
        assert_eq!(long_only.display_name(), "--force");

        let short_only = ScriptArgument::flag(Some("-q"), None, "Quiet", false, None);
        assert_eq!(short_only.display_name(), "-q");

        let positional = ScriptArgument::positional("input", "Input file");
        assert_eq!(positional.display_name(), "input");
    }

    #[test]
    fn test_flag_for_command_prefers_long() {
        let arg = ScriptArgument::flag(Some("-o"), Some("--output"), "Output", true, Some("FILE"));
        assert_eq!(arg.flag_for_command(), Some("--output"));

        let short = ScriptArgument::flag(Some("-o"), None, "Output", true, Some("FILE"));
        assert_eq!(short.flag_for_command(), Some("-o"));
    }

    #[test]
    fn test_choice_argument_derives_enablement_from_value() {
        let mut arg = ScriptArgument::flag(None, Some("--format"), "Format", true, Some("FORMAT"));
        arg.choices = Some(vec!["json".to_string(), "text".to_string()]);

        // Toggling is_enabled directly has no effect for choice arguments
        arg.is_enabled = true;
        assert!(!arg.effective_enabled());

        arg.value = "json".to_string();
        assert!(arg.effective_enabled());
    }

    #[test]
    fn test_script_directory() {
        let script = Script::new("/home/user/bin/deploy.sh");
        assert_eq!(script.directory(), PathBuf::from("/home/user/bin"));
        assert_eq!(script.name, "deploy.sh");
    }

    #[test]
    fn test_catalog_lookup_is_exact_path() {
        let a = Script::new("/scripts/a.sh");
        let b = Script::new("/scripts/b.sh");
        let catalog = ScriptCatalog::new(vec![a, b]);

        assert!(catalog.find_by_path("/scripts/a.sh").is_some());
        assert!(catalog.find_by_path("/scripts/A.sh").is_none());
        assert!(catalog.find_by_path("a.sh").is_none());
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_catalog_iter_preserves_order() {
        let scripts = vec![
            Script::new("/s/alpha.sh"),
            Script::new("/s/beta.sh"),
            Script::new("/s/gamma.sh"),
        ];
        let catalog = ScriptCatalog::new(scripts);
        let names: Vec<&str> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.sh", "beta.sh", "gamma.sh"]);
    }
}
