use crate::{
    app::{App, ConfigOverrides, ImportKind, UpdateSummary, TICK_INTERVAL},
    catalog::{CatalogRoot, CatalogVisit, PresetId},
    coordinator::RequestState,
    resolver::ImportOutcome,
    status::Severity,
    store::{LocalPreset, CONFIGURATION_FILE},
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct GlobalOptions {
    format: Option<OutputFormat>,
    overrides: ConfigOverrides,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Browse,
    Installed,
    Import { ids: Vec<PresetId>, kind: ImportKind },
    Updates { apply: bool },
    Reset,
    Paths,
    Log { lines: usize },
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    let format = global.format.unwrap_or(OutputFormat::Text);
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("presetsync v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize(&global.overrides)?;
            run_command(&mut app, command, format)
        }
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut global = GlobalOptions::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        match flag {
            "--format" | "--server" | "--plugin" => {
                let Some(value) = inline.or_else(|| iter.next().cloned()) else {
                    bail!("{flag} requires a value");
                };
                match flag {
                    "--format" => {
                        let Some(parsed) = OutputFormat::parse(&value) else {
                            bail!("Unknown format: {value} (use 'text' or 'json')");
                        };
                        global.format = Some(parsed);
                    }
                    "--server" => global.overrides.server_url = Some(value),
                    _ => global.overrides.plugin_name = Some(value),
                }
            }
            _ => tokens.push(arg.to_string()),
        }
    }
    Ok((global, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "browse" => Ok(CliCommand::Browse),
        "installed" | "list" => Ok(CliCommand::Installed),
        "import" => Ok(CliCommand::Import {
            ids: parse_ids(rest)?,
            kind: ImportKind::Preset,
        }),
        "apply" => {
            let ids = parse_ids(rest)?;
            if ids.len() != 1 {
                bail!("apply takes exactly one configuration preset id");
            }
            Ok(CliCommand::Import {
                ids,
                kind: ImportKind::Configuration,
            })
        }
        "updates" => {
            let mut apply = false;
            for arg in rest {
                match arg.as_str() {
                    "--apply" | "-a" => apply = true,
                    other => bail!("Unknown updates option: {other}"),
                }
            }
            Ok(CliCommand::Updates { apply })
        }
        "reset" => Ok(CliCommand::Reset),
        "paths" => Ok(CliCommand::Paths),
        "log" => {
            let lines = match rest.first() {
                Some(value) => value
                    .parse::<usize>()
                    .map_err(|_| anyhow::anyhow!("Invalid line count: {value}"))?,
                None => 20,
            };
            Ok(CliCommand::Log { lines })
        }
        "help" | "--help" | "-h" => Ok(CliCommand::Help),
        "version" | "--version" | "-V" => Ok(CliCommand::Version),
        other => bail!("Unknown command: {other} (see 'presetsync help')"),
    }
}

fn parse_ids(args: &[String]) -> Result<Vec<PresetId>> {
    if args.is_empty() {
        bail!("at least one preset id is required");
    }
    args.iter()
        .map(|arg| {
            arg.parse::<PresetId>()
                .map_err(|_| anyhow::anyhow!("Invalid preset id: {arg}"))
        })
        .collect()
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Browse => browse(app, format),
        CliCommand::Installed => list_installed(app, format),
        CliCommand::Import { ids, kind } => import(app, &ids, kind, format),
        CliCommand::Updates { apply } => updates(app, apply, format),
        CliCommand::Reset => {
            if !app.reset_configuration() {
                bail!("{}", app.status.text());
            }
            print_status(app);
            Ok(())
        }
        CliCommand::Log { lines } => {
            let tail = app.session.log.tail_text(lines)?;
            if !tail.is_empty() {
                println!("{tail}");
            }
            Ok(())
        }
        CliCommand::Paths => {
            println!("Data dir: {}", app.data_dir.display());
            println!("Config: {}", app.data_dir.join("config.json").display());
            println!("Presets: {}", app.data_dir.join(CONFIGURATION_FILE).display());
            if let Some(path) = app.session.log.path() {
                println!("Log: {}", path.display());
            }
            println!("Server: {}", app.app_config.server_url);
            println!("Plugin: {}", app.app_config.plugin_name);
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

// Drives the cooperative loop until neither request kind is pending.
fn settle(app: &mut App) {
    loop {
        app.tick();
        if !app.catalog_state().is_pending() && !app.updates_state().is_pending() {
            return;
        }
        thread::sleep(TICK_INTERVAL);
    }
}

fn print_status(app: &App) {
    match app.status.severity() {
        Severity::Default | Severity::Success => println!("{}", app.status.text()),
        severity => eprintln!("{}: {}", severity.label(), app.status.text()),
    }
}

fn fetch_catalog(app: &mut App) -> Result<()> {
    app.discard_catalog();
    app.request_catalog();
    settle(app);
    match app.catalog_state() {
        RequestState::Succeeded(_) => Ok(()),
        RequestState::Faulted(err) => bail!("Catalog fetch failed: {err}"),
        RequestState::Idle | RequestState::Pending => bail!("Catalog fetch did not complete"),
    }
}

struct TreeLine {
    depth: usize,
    name: String,
    id: Option<PresetId>,
    version: Option<u32>,
    description: Option<String>,
}

fn catalog_lines(catalog: &CatalogRoot) -> Vec<TreeLine> {
    let mut lines = Vec::new();
    catalog.walk(&mut |visit| match visit {
        CatalogVisit::Category { node, depth } => lines.push(TreeLine {
            depth,
            name: node.name.clone(),
            id: None,
            version: None,
            description: None,
        }),
        CatalogVisit::Preset { preset, depth } => lines.push(TreeLine {
            depth,
            name: preset.name.clone(),
            id: Some(preset.id),
            version: Some(preset.version),
            description: preset.description.clone(),
        }),
    });
    lines
}

fn browse(app: &mut App, format: OutputFormat) -> Result<()> {
    fetch_catalog(app)?;
    let Some(catalog) = app.catalog() else {
        bail!("Catalog fetch did not complete");
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(catalog)?),
        OutputFormat::Text => {
            println!("{}", catalog.name);
            if !catalog.description.is_empty() {
                println!("{}", catalog.description);
            }
            for line in catalog_lines(catalog) {
                let indent = "  ".repeat(line.depth + 1);
                match (line.id, line.version) {
                    (Some(id), Some(version)) => {
                        let description = line
                            .description
                            .map(|text| format!(" - {text}"))
                            .unwrap_or_default();
                        println!("{indent}* {} (v{version}) [#{id}]{description}", line.name);
                    }
                    _ => println!("{indent}{}/", line.name),
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InstalledItem<'a> {
    position: usize,
    name: &'a str,
    id: Option<PresetId>,
    version: Option<u32>,
}

fn list_installed(app: &App, format: OutputFormat) -> Result<()> {
    let configuration = app.configuration();
    let items: Vec<InstalledItem> = configuration
        .presets
        .entries()
        .iter()
        .enumerate()
        .map(|(index, preset): (usize, &LocalPreset)| InstalledItem {
            position: index + 1,
            name: &preset.name,
            id: preset.id(),
            version: preset.version(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            println!(
                "Settings: settingOne={} settingTwo={} (version {})",
                configuration.setting_one, configuration.setting_two, configuration.version
            );
            if configuration.presets.is_empty() {
                println!("No presets installed");
                return Ok(());
            }
            println!("Presets: {}", configuration.presets.len());
            for (item, preset) in items.iter().zip(configuration.presets.entries()) {
                let id = item
                    .id
                    .map(|id| format!("#{id}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>3} {id:<6} {:<7} {}",
                    item.position,
                    preset.version_label(),
                    item.name
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ImportReport {
    id: PresetId,
    outcome: &'static str,
    message: String,
}

fn outcome_label(outcome: Option<ImportOutcome>) -> &'static str {
    match outcome {
        Some(ImportOutcome::Success) => "success",
        Some(ImportOutcome::Updated) => "updated",
        Some(ImportOutcome::AlreadyExists) => "already_exists",
        Some(ImportOutcome::Failure) => "failure",
        None => "not_found",
    }
}

fn import(
    app: &mut App,
    ids: &[PresetId],
    kind: ImportKind,
    format: OutputFormat,
) -> Result<()> {
    fetch_catalog(app)?;
    let mut reports = Vec::new();
    for &id in ids {
        let outcome = app.import_from_catalog(id, kind);
        let message = match outcome {
            Some(_) => app.status.text().to_string(),
            None => format!("Preset #{id} is not in the catalog"),
        };
        reports.push(ImportReport {
            id,
            outcome: outcome_label(outcome),
            message,
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                println!("#{:<5} {:<15} {}", report.id, report.outcome, report.message);
            }
        }
    }

    if reports
        .iter()
        .any(|report| matches!(report.outcome, "failure" | "not_found"))
    {
        bail!("some presets could not be imported");
    }
    Ok(())
}

#[derive(Serialize)]
struct UpdateItem {
    id: PresetId,
    name: String,
    local_version: Option<u32>,
    remote_version: u32,
}

#[derive(Serialize)]
struct UpdatesReport<'a> {
    updates: &'a [UpdateItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    applied: Option<UpdateSummary>,
}

fn updates_json(items: &[UpdateItem], applied: Option<UpdateSummary>) -> Result<String> {
    let report = UpdatesReport {
        updates: items,
        applied,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn updates(app: &mut App, apply: bool, format: OutputFormat) -> Result<()> {
    app.discard_updates();
    app.request_updates();
    if matches!(app.updates_state(), RequestState::Idle) {
        print_status(app);
        return Ok(());
    }
    settle(app);
    if let RequestState::Faulted(err) = app.updates_state() {
        bail!("Update check failed: {err}");
    }

    let store = &app.configuration().presets;
    let items: Vec<UpdateItem> = app
        .pending_updates()
        .into_iter()
        .map(|remote| UpdateItem {
            id: remote.id,
            name: remote.name.clone(),
            local_version: store.find(remote.id).and_then(LocalPreset::version),
            remote_version: remote.version,
        })
        .collect();

    if format == OutputFormat::Text {
        for item in &items {
            let local = item
                .local_version
                .map(|version| format!("v{version}"))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "#{:<5} {local} -> v{} {}",
                item.id, item.remote_version, item.name
            );
        }
    }

    let applied = (apply && !items.is_empty()).then(|| app.apply_updates());
    if format == OutputFormat::Json {
        println!("{}", updates_json(&items, applied)?);
    }
    if applied.is_some_and(|summary| summary.failed > 0) {
        bail!("{}", app.status.text());
    }
    if format == OutputFormat::Text {
        print_status(app);
    }
    Ok(())
}

fn print_help() {
    println!("presetsync v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  presetsync browse               Fetch and show the preset catalog");
    println!("  presetsync installed            List local presets");
    println!("  presetsync import <id...>       Import catalog presets into the preset list");
    println!("  presetsync apply <id>           Apply a catalog configuration preset");
    println!("  presetsync updates [--apply]    Check installed presets for newer versions");
    println!("  presetsync reset                Restore the default configuration");
    println!("  presetsync paths                Show data paths and server settings");
    println!("  presetsync log [lines]          Show the end of the activity log");
    println!();
    println!("Global options:");
    println!("  --format <json|text>            Output format");
    println!("  --server <url>                  Catalog API base URL for this run");
    println!("  --plugin <name>                 Plugin name to query for this run");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
}
