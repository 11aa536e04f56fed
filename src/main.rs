//! Command-line interface for the scriptlet runner.

use std::io::Write as _;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use scriptlet_runner::chain_runner::ChainRunner;
use scriptlet_runner::chains::{ScriptChain, ScriptChainStep};
use scriptlet_runner::executor::{ExecutionOutcome, Invocation, ScriptExecutor};
use scriptlet_runner::history::RunHistory;
use scriptlet_runner::logging;
use scriptlet_runner::output::RunEvent;
use scriptlet_runner::process_registry::PROCESS_REGISTRY;
use scriptlet_runner::scanner::{self, ScanLocation};
use scriptlet_runner::scripts::{Script, ScriptArgument, ScriptCatalog};
use scriptlet_runner::search;
use scriptlet_runner::store::{keys, BlobStore};

#[derive(Parser)]
#[command(
    name = "scriptlet-runner",
    about = "Run shell scripts individually or as ordered chains",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rescan all locations and list what was found
    Scan,
    /// List known scripts, optionally fuzzy-filtered
    List {
        /// Fuzzy filter over names and descriptions
        #[arg(long)]
        filter: Option<String>,
    },
    /// Show a script's metadata and declared arguments
    Show { script: String },
    /// Run one script and stream its output
    Run {
        /// Script name or path
        script: String,
        /// Enable a flag by name, e.g. --enable verbose
        #[arg(long = "enable", value_name = "FLAG")]
        enable: Vec<String>,
        /// Enable a value argument, e.g. --set env=staging
        #[arg(long = "set", value_name = "FLAG=VALUE")]
        set: Vec<String>,
        /// Compose one shell command string instead of direct argv
        /// invocation (legacy behavior; values are only naively quoted)
        #[arg(long)]
        shell_string: bool,
    },
    /// Manage and run chains
    #[command(subcommand)]
    Chain(ChainCommands),
    /// Show or clear the run history
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Manage scan locations
    #[command(subcommand)]
    Locations(LocationCommands),
}

#[derive(Subcommand)]
enum ChainCommands {
    /// List saved chains
    List,
    /// Show a chain's steps
    Show { name: String },
    /// Create a chain from an ordered list of script names
    Create {
        name: String,
        /// Scripts, in step order
        scripts: Vec<String>,
        /// Let every step continue past failures
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Delete a chain
    Remove { name: String },
    /// Run a chain and stream its transcript
    Run {
        name: String,
        #[arg(long)]
        shell_string: bool,
    },
}

#[derive(Subcommand)]
enum LocationCommands {
    /// List configured scan locations
    List,
    /// Add a directory to scan
    Add {
        path: String,
        /// Do not descend into subdirectories
        #[arg(long)]
        flat: bool,
    },
    /// Remove a location by path or label
    Remove { path: String },
}

fn main() -> Result<()> {
    let _guard = logging::init();
    PROCESS_REGISTRY.cleanup_orphans();

    let cli = Cli::parse();
    let mut store = BlobStore::new();
    store.load().context("Could not load settings")?;

    match cli.command {
        Commands::Scan => cmd_scan(&store),
        Commands::List { filter } => cmd_list(&store, filter.as_deref()),
        Commands::Show { script } => cmd_show(&store, &script),
        Commands::Run {
            script,
            enable,
            set,
            shell_string,
        } => cmd_run(&mut store, &script, &enable, &set, shell_string),
        Commands::Chain(command) => cmd_chain(&mut store, command),
        Commands::History { clear } => cmd_history(&mut store, clear),
        Commands::Locations(command) => cmd_locations(&mut store, command),
    }
}

fn scan_locations(store: &BlobStore) -> Vec<ScanLocation> {
    store
        .get::<Vec<ScanLocation>>(keys::SCAN_LOCATIONS)
        .unwrap_or_default()
        .unwrap_or_default()
}

fn load_catalog(store: &BlobStore) -> ScriptCatalog {
    let locations = scan_locations(store);
    if locations.is_empty() {
        eprintln!("No scan locations configured. Add one with: scriptlet-runner locations add <dir>");
    }
    scanner::scan(&locations)
}

fn resolve_script<'a>(catalog: &'a ScriptCatalog, wanted: &str) -> Result<&'a Script> {
    if let Some(script) = catalog.find_by_path(wanted) {
        return Ok(script);
    }
    let mut by_name = catalog.iter().filter(|s| s.name == wanted);
    match (by_name.next(), by_name.next()) {
        (Some(script), None) => Ok(script),
        (Some(_), Some(_)) => bail!("Script name '{}' is ambiguous; use the full path", wanted),
        (None, _) => bail!("No script named '{}' in the catalog", wanted),
    }
}

fn cmd_scan(store: &BlobStore) -> Result<()> {
    let catalog = load_catalog(store);
    println!("Found {} script(s)", catalog.len());
    for script in catalog.iter() {
        println!("  {}  ({})", script.name, script.path);
    }
    Ok(())
}

fn cmd_list(store: &BlobStore, filter: Option<&str>) -> Result<()> {
    let catalog = load_catalog(store);
    for matched in search::filter_catalog(&catalog, filter.unwrap_or("")) {
        let script = matched.script;
        if script.description.is_empty() {
            println!("{}", script.name);
        } else {
            println!("{}  -  {}", script.name, script.description);
        }
    }
    Ok(())
}

fn cmd_show(store: &BlobStore, wanted: &str) -> Result<()> {
    let catalog = load_catalog(store);
    let script = resolve_script(&catalog, wanted)?;

    println!("{}", script.name);
    println!("  path: {}", script.path);
    if !script.description.is_empty() {
        println!("  description: {}", script.description);
    }
    if let Some(usage) = &script.usage {
        println!("  usage: {}", usage);
    }
    if !script.arguments.is_empty() {
        println!("  arguments:");
        for arg in &script.arguments {
            let kind = if arg.is_positional {
                "positional"
            } else if arg.requires_value {
                "flag+value"
            } else {
                "flag"
            };
            print!("    {} [{}]  {}", arg.display_name(), kind, arg.description);
            if let Some(choices) = &arg.choices {
                print!("  (one of: {})", choices.join(", "));
            }
            println!();
        }
    }
    Ok(())
}

/// Match a CLI-provided name against a declared argument: `verbose` matches
/// `--verbose` or `-v`, and positionals match their placeholder.
fn find_argument<'a>(
    script_arguments: &'a mut [ScriptArgument],
    name: &str,
) -> Option<&'a mut ScriptArgument> {
    let bare = name.trim_start_matches('-');
    script_arguments.iter_mut().find(|arg| {
        arg.long_flag
            .as_deref()
            .is_some_and(|f| f.trim_start_matches('-') == bare)
            || arg.short_flag
                .as_deref()
                .is_some_and(|f| f.trim_start_matches('-') == bare)
            || arg.placeholder
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(bare))
    })
}

fn apply_cli_arguments(
    script: &Script,
    enable: &[String],
    set: &[String],
) -> Result<Vec<ScriptArgument>> {
    let mut runtime = script.arguments.clone();

    for name in enable {
        let arg = find_argument(&mut runtime, name)
            .with_context(|| format!("'{}' does not declare an argument '{}'", script.name, name))?;
        arg.is_enabled = true;
    }

    for pair in set {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("--set expects FLAG=VALUE, got '{}'", pair))?;
        let arg = find_argument(&mut runtime, name)
            .with_context(|| format!("'{}' does not declare an argument '{}'", script.name, name))?;
        if let Some(choices) = &arg.choices {
            if !choices.iter().any(|c| c == value) {
                bail!(
                    "'{}' only accepts one of: {}",
                    name,
                    choices.join(", ")
                );
            }
        }
        arg.is_enabled = true;
        arg.value = value.to_string();
    }

    Ok(runtime)
}

fn cmd_run(
    store: &mut BlobStore,
    wanted: &str,
    enable: &[String],
    set: &[String],
    shell_string: bool,
) -> Result<()> {
    let catalog = load_catalog(store);
    let script = resolve_script(&catalog, wanted)?.clone();
    let runtime_arguments = apply_cli_arguments(&script, enable, set)?;
    let invocation = if shell_string {
        Invocation::ShellString
    } else {
        Invocation::Direct
    };

    let mut history = RunHistory::load(store);
    history.record(&script.path, &script.name, &runtime_arguments);
    history.persist(store)?;
    store.save()?;

    let executor = ScriptExecutor::new();
    let rx = executor.events().subscribe();
    executor
        .start(&script, &runtime_arguments, invocation)
        .context("Could not start execution")?;

    let mut outcome = ExecutionOutcome::Exited(0);
    for event in rx {
        match event {
            RunEvent::OutputAppended { chunk } => {
                print!("{}", chunk);
                std::io::stdout().flush().ok();
            }
            RunEvent::Finished { outcome: finished } => {
                outcome = finished;
                break;
            }
            _ => {}
        }
    }

    history.record_exit_code(outcome.exit_code());
    history.persist(store)?;
    store.save()?;

    match outcome {
        ExecutionOutcome::Exited(0) => Ok(()),
        ExecutionOutcome::Exited(code) => std::process::exit(code.clamp(1, 255)),
        ExecutionOutcome::LaunchFailed(reason) => {
            bail!("Launch failure: {}", reason)
        }
    }
}

fn saved_chains(store: &BlobStore) -> Vec<ScriptChain> {
    store
        .get::<Vec<ScriptChain>>(keys::SAVED_CHAINS)
        .unwrap_or_default()
        .unwrap_or_default()
}

fn cmd_chain(store: &mut BlobStore, command: ChainCommands) -> Result<()> {
    match command {
        ChainCommands::List => {
            for chain in saved_chains(store) {
                println!(
                    "{}  ({} step(s), created {})",
                    chain.name,
                    chain.step_count(),
                    chain.created_at.format("%Y-%m-%d")
                );
            }
            Ok(())
        }
        ChainCommands::Show { name } => {
            let chains = saved_chains(store);
            let chain = chains
                .iter()
                .find(|c| c.name == name)
                .with_context(|| format!("No chain named '{}'", name))?;
            println!("{}", chain.name);
            if !chain.description.is_empty() {
                println!("  {}", chain.description);
            }
            for (i, step) in chain.steps.iter().enumerate() {
                println!(
                    "  {}. {}{}",
                    i + 1,
                    step.script_name,
                    if step.continue_on_error {
                        "  (continue on error)"
                    } else {
                        ""
                    }
                );
            }
            Ok(())
        }
        ChainCommands::Create {
            name,
            scripts,
            continue_on_error,
        } => {
            if scripts.is_empty() {
                bail!("A chain needs at least one script");
            }
            let catalog = load_catalog(store);
            let mut chain = ScriptChain::new(&name);
            for wanted in &scripts {
                let script = resolve_script(&catalog, wanted)?;
                let mut step = ScriptChainStep::new(&script.path, &script.name);
                step.continue_on_error = continue_on_error;
                chain.steps.push(step);
            }

            let mut chains = saved_chains(store);
            if chains.iter().any(|c| c.name == name) {
                bail!("A chain named '{}' already exists", name);
            }
            chains.push(chain);
            store.set(keys::SAVED_CHAINS, &chains)?;
            store.save()?;
            println!("Created chain '{}' with {} step(s)", name, scripts.len());
            Ok(())
        }
        ChainCommands::Remove { name } => {
            let mut chains = saved_chains(store);
            let before = chains.len();
            chains.retain(|c| c.name != name);
            if chains.len() == before {
                bail!("No chain named '{}'", name);
            }
            store.set(keys::SAVED_CHAINS, &chains)?;
            store.save()?;
            Ok(())
        }
        ChainCommands::Run { name, shell_string } => {
            let mut chains = saved_chains(store);
            let chain = chains
                .iter()
                .find(|c| c.name == name)
                .with_context(|| format!("No chain named '{}'", name))?
                .clone();
            let catalog = load_catalog(store);
            let invocation = if shell_string {
                Invocation::ShellString
            } else {
                Invocation::Direct
            };

            let runner = ChainRunner::with_invocation(invocation);
            let rx = runner.events().subscribe();
            runner.run(chain, catalog).context("Could not start chain")?;

            let mut success = false;
            for event in rx {
                match event {
                    RunEvent::OutputAppended { chunk } => {
                        print!("{}", chunk);
                        std::io::stdout().flush().ok();
                    }
                    RunEvent::ChainFinished {
                        success: finished_success,
                        ..
                    } => {
                        success = finished_success;
                        break;
                    }
                    _ => {}
                }
            }
            // Stamp the run after it fully ended
            if let Some(saved) = chains.iter_mut().find(|c| c.name == name) {
                saved.last_run_at = Some(chrono::Utc::now());
            }
            store.set(keys::SAVED_CHAINS, &chains)?;
            store.save()?;

            if success {
                Ok(())
            } else {
                std::process::exit(1);
            }
        }
    }
}

fn cmd_history(store: &mut BlobStore, clear: bool) -> Result<()> {
    let mut history = RunHistory::load(store);
    if clear {
        history.clear();
        history.persist(store)?;
        store.save()?;
        println!("History cleared");
        return Ok(());
    }
    for entry in history.entries() {
        let exit = entry
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        let args = if entry.arguments.is_empty() {
            String::new()
        } else {
            format!("  [{}]", entry.arguments.join(" "))
        };
        println!(
            "{}  exit={}  {}{}",
            entry.run_date.format("%Y-%m-%d %H:%M:%S"),
            exit,
            entry.script_name,
            args
        );
    }
    Ok(())
}

fn cmd_locations(store: &mut BlobStore, command: LocationCommands) -> Result<()> {
    let mut locations = scan_locations(store);
    match command {
        LocationCommands::List => {
            for location in &locations {
                println!(
                    "{}  ({}{}{})",
                    location.path,
                    location.label,
                    if location.recursive { ", recursive" } else { "" },
                    if location.is_enabled { "" } else { ", disabled" }
                );
            }
            Ok(())
        }
        LocationCommands::Add { path, flat } => {
            let expanded = scanner::expand_location_path(&path);
            if !expanded.is_dir() {
                bail!("'{}' is not a directory", expanded.display());
            }
            let mut location = ScanLocation::new(&expanded.to_string_lossy());
            location.recursive = !flat;
            if locations.iter().any(|l| l.path == location.path) {
                bail!("'{}' is already configured", location.path);
            }
            println!("Added {}", location.path);
            locations.push(location);
            store.set(keys::SCAN_LOCATIONS, &locations)?;
            store.save()?;
            Ok(())
        }
        LocationCommands::Remove { path } => {
            let expanded = scanner::expand_location_path(&path);
            let expanded = expanded.to_string_lossy();
            let before = locations.len();
            locations.retain(|l| l.path != expanded && l.label != path);
            if locations.len() == before {
                bail!("No location matches '{}'", path);
            }
            store.set(keys::SCAN_LOCATIONS, &locations)?;
            store.save()?;
            Ok(())
        }
    }
}
