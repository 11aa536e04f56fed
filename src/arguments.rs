//! Argument materialization: turning declared + override argument state
//! into concrete command-line tokens.
//!
//! Shared by the single-run and chain-run paths. Everything here is pure;
//! the executor decides whether the tokens become a real argv
//! ([`materialize`]) or a composed shell string
//! ([`compose_command_line`]).

use std::collections::{HashMap, HashSet};

use crate::chains::ScriptChainStep;
use crate::scripts::{Script, ScriptArgument};

/// Produce the argument vector for an execution.
///
/// Enabled flag arguments come first: the flag token alone when no value is
/// required, flag + value as two tokens when a value is required and
/// present. A value-requiring flag with an empty value contributes nothing;
/// empty values are never passed. Enabled positionals with non-empty values
/// follow, in declared order.
pub fn materialize(arguments: &[ScriptArgument]) -> Vec<String> {
    let mut tokens = Vec::new();

    for arg in arguments
        .iter()
        .filter(|a| a.effective_enabled() && !a.is_positional)
    {
        let Some(flag) = arg.flag_for_command() else {
            continue;
        };
        if arg.requires_value {
            if !arg.value.is_empty() {
                tokens.push(flag.to_string());
                tokens.push(arg.value.clone());
            }
        } else {
            tokens.push(flag.to_string());
        }
    }

    for arg in arguments
        .iter()
        .filter(|a| a.effective_enabled() && a.is_positional)
    {
        if !arg.value.is_empty() {
            tokens.push(arg.value.clone());
        }
    }

    tokens
}

/// Compose the single shell command string for `sh -c` style invocation.
///
/// The script path and every value token are wrapped in double quotes with
/// no embedded-quote escaping. This preserves the ability to use shell
/// metacharacters in argument values at the caller's own risk, and is a
/// documented limitation of shell-string mode, not something to patch
/// here; the argv-based invocation path is the safe default.
pub fn compose_command_line(script_path: &str, arguments: &[ScriptArgument]) -> String {
    let mut command = format!("\"{}\"", script_path);

    for arg in arguments
        .iter()
        .filter(|a| a.effective_enabled() && !a.is_positional)
    {
        let Some(flag) = arg.flag_for_command() else {
            continue;
        };
        if arg.requires_value {
            if !arg.value.is_empty() {
                command.push_str(&format!(" {} \"{}\"", flag, arg.value));
            }
        } else {
            command.push_str(&format!(" {}", flag));
        }
    }

    for arg in arguments
        .iter()
        .filter(|a| a.effective_enabled() && a.is_positional)
    {
        if !arg.value.is_empty() {
            command.push_str(&format!(" \"{}\"", arg.value));
        }
    }

    command
}

/// Apply a chain step's overrides onto a script's declared arguments,
/// yielding the runtime argument set for that step.
///
/// The script's definitions are never mutated; the step only decides which
/// arguments are enabled and what values they carry.
pub fn apply_step_overrides(script: &Script, step: &ScriptChainStep) -> Vec<ScriptArgument> {
    script
        .arguments
        .iter()
        .map(|declared| {
            let mut arg = declared.clone();
            let key = arg.id.to_string();
            if step.enabled_flags.contains(&key) {
                arg.is_enabled = true;
                if let Some(value) = step.arguments.get(&key) {
                    arg.value = value.clone();
                }
            }
            arg
        })
        .collect()
}

/// Derive the override representation back out of a runtime argument set.
///
/// Inverse of [`apply_step_overrides`]: the value map only holds entries
/// for enabled arguments with non-empty values, so applying and deriving
/// round-trips exactly.
pub fn overrides_from_arguments(
    arguments: &[ScriptArgument],
) -> (HashMap<String, String>, HashSet<String>) {
    let mut values = HashMap::new();
    let mut enabled = HashSet::new();

    for arg in arguments.iter().filter(|a| a.is_enabled) {
        let key = arg.id.to_string();
        if !arg.value.is_empty() {
            values.insert(key.clone(), arg.value.clone());
        }
        enabled.insert(key);
    }

    (values, enabled)
}

/// The string form used for run-history display: `"--flag value"`,
/// `"--flag"`. Flags only; positionals are not recorded in history.
pub fn history_strings(arguments: &[ScriptArgument]) -> Vec<String> {
    arguments
        .iter()
        .filter(|a| a.effective_enabled())
        .filter_map(|arg| {
            let flag = arg.flag_for_command()?;
            if arg.requires_value {
                if arg.value.is_empty() {
                    None
                } else {
                    Some(format!("{} {}", flag, arg.value))
                }
            } else {
                Some(flag.to_string())
            }
        })
        .collect()
}
