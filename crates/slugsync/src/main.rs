use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use slugsync_core::config::load_config;
use slugsync_core::engine::{BatchSummary, RenameResult, StepStatus, mapping_total, process_step};
use slugsync_core::mappings::{
    MappingParseReport, load_mapping_text, parse_mappings_detailed, save_mapping_text,
};
use slugsync_core::migrate::{pending_migration_count, run_migrations};
use slugsync_core::runtime::{
    INIT_POLICY_MESSAGE, PathOverrides, ResolvedPaths, resolve_paths,
};
use slugsync_core::store::{self, MAPPINGS_SETTING_KEY, open_ready_store, open_store};

const MAPPING_TEMPLATE: &str = "# One mapping per line: current-slug,desired-slug\n# Lines starting with '#' are ignored.\n";

#[derive(Debug, Parser)]
#[command(
    name = "slugsync",
    version,
    about = "Rename content-item slugs and rewrite stored links in one pass"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Path to the content store database")]
    db: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Path to the site config TOML")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    db: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            db: cli.db.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the store schema and seed a mapping template")]
    Init,
    #[command(about = "Show store paths, item counts, and mapping totals")]
    Status,
    #[command(about = "List planned renames and skipped mapping lines")]
    Plan,
    #[command(about = "Inspect or replace the persisted mapping text")]
    Mappings(MappingsArgs),
    #[command(about = "Process every mapping, one step at a time")]
    Run(RunArgs),
    #[command(about = "Process a single mapping index")]
    Step(StepArgs),
}

#[derive(Debug, Args)]
struct MappingsArgs {
    #[command(subcommand)]
    command: MappingsSubcommand,
}

#[derive(Debug, Subcommand)]
enum MappingsSubcommand {
    #[command(about = "Print the persisted raw mapping text")]
    Show,
    #[command(about = "Persist mapping text from --file, --text, or stdin")]
    Set(SetMappingsArgs),
}

#[derive(Debug, Args)]
struct SetMappingsArgs {
    #[arg(long, value_name = "PATH", conflicts_with = "text", help = "Read mapping text from a file")]
    file: Option<PathBuf>,
    #[arg(long, value_name = "TEXT", help = "Use this mapping text directly")]
    text: Option<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long, help = "Confirm you have a current database backup")]
    yes: bool,
    #[arg(long, value_name = "INDEX", help = "Resume from this mapping index")]
    from_index: Option<usize>,
    #[arg(long, help = "Print one JSON line per step result")]
    json: bool,
}

#[derive(Debug, Args)]
struct StepArgs {
    index: usize,
    #[arg(long, help = "Print the step result as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init) => run_init(&runtime),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Plan) => run_plan(&runtime),
        Some(Commands::Mappings(MappingsArgs { command })) => match command {
            MappingsSubcommand::Show => run_mappings_show(&runtime),
            MappingsSubcommand::Set(args) => run_mappings_set(&runtime, args),
        },
        Some(Commands::Run(args)) => run_batch(&runtime, args),
        Some(Commands::Step(args)) => run_single_step(&runtime, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let report = run_migrations(&paths.db_path)?;
    let connection = open_store(&paths.db_path)?;

    let existing = store::get_setting(&connection, MAPPINGS_SETTING_KEY)?.unwrap_or_default();
    let seeded = if existing.trim().is_empty() {
        save_mapping_text(&connection, MAPPING_TEMPLATE)?;
        true
    } else {
        false
    };

    println!("initialized slug store");
    println!("db_path: {} ({})", normalize_path(&paths.db_path), paths.db_source.as_str());
    for migration in &report.applied {
        println!("applied: v{:03}_{}", migration.version, migration.name);
    }
    println!("schema_version: {}", report.current_version);
    println!("seeded_mapping_template: {}", format_flag(seeded));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let config = load_config(&paths.config_path)?;

    println!("store status");
    println!("db_path: {} ({})", normalize_path(&paths.db_path), paths.db_source.as_str());
    println!(
        "config_path: {} ({})",
        normalize_path(&paths.config_path),
        paths.config_source.as_str()
    );
    println!("config_exists: {}", format_flag(paths.config_path.exists()));
    println!("db_exists: {}", format_flag(paths.db_path.exists()));

    if paths.db_path.exists() {
        let pending = pending_migration_count(&paths.db_path)?;
        println!("migrations.pending: {pending}");
        // Item and mapping queries need the full schema in place.
        if pending == 0 {
            let connection = open_store(&paths.db_path)?;
            let counts = store::item_counts_by_kind(&connection)?;
            if counts.is_empty() {
                println!("items: <none>");
            } else {
                for (kind, count) in &counts {
                    println!("items.{kind}: {count}");
                }
            }
            let report = parse_mappings_detailed(&load_mapping_text(&connection)?);
            println!("mappings.total: {}", report.mappings.len());
            println!("mappings.skipped_lines: {}", report.skipped.len());
        }
    }

    println!("site.base_url: {}", config.base_url());
    println!("site.article_path: {}", config.article_path_owned());
    println!("policy: {INIT_POLICY_MESSAGE}");
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_plan(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let connection = open_ready_store(&paths.db_path)?;
    let report = parse_mappings_detailed(&load_mapping_text(&connection)?);

    println!("planned slug changes");
    println!("mappings.total: {}", report.mappings.len());
    if report.mappings.is_empty() {
        println!("mappings: <none> (save some with `slugsync mappings set`)");
    } else {
        for (position, mapping) in report.mappings.iter().enumerate() {
            println!("{}. {} -> {}", position + 1, mapping.from_slug, mapping.to_slug);
        }
    }
    print_skipped_lines(&report);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_mappings_show(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let connection = open_ready_store(&paths.db_path)?;
    let text = load_mapping_text(&connection)?;

    if text.is_empty() {
        println!("mappings: <none>");
    } else {
        println!("{text}");
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_mappings_set(runtime: &RuntimeOptions, args: SetMappingsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let connection = open_ready_store(&paths.db_path)?;

    let raw = if let Some(path) = args.file {
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?
    } else if let Some(text) = args.text {
        text
    } else {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read mapping text from stdin")?;
        buffer
    };

    let stored = save_mapping_text(&connection, &raw)?;
    let report = parse_mappings_detailed(&stored);

    println!("saved mapping text");
    println!(
        "lines.stored: {}",
        if stored.is_empty() { 0 } else { stored.lines().count() }
    );
    println!("mappings.total: {}", report.mappings.len());
    println!("mappings.skipped_lines: {}", report.skipped.len());
    print_skipped_lines(&report);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_batch(runtime: &RuntimeOptions, args: RunArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let config = load_config(&paths.config_path)?;
    let mut connection = open_ready_store(&paths.db_path)?;

    let total = mapping_total(&connection)?;
    if total == 0 {
        bail!("no mappings configured; save some with `slugsync mappings set`");
    }
    if !args.yes {
        bail!(
            "slug sync rewrites slugs and stored links across the whole store.\nTake a database backup, then re-run with --yes."
        );
    }

    let start = args.from_index.unwrap_or(0);
    if !args.json {
        println!("processing {total} mappings from index {start}");
    }

    let mut summary = BatchSummary::new(total);
    let mut index = start;

    while index < total {
        match process_step(&mut connection, &config, index) {
            Ok(result) if result.status == StepStatus::AllDone => {
                if args.json {
                    println!("{}", serde_json::to_string(&result)?);
                }
                break;
            }
            Ok(result) => {
                if args.json {
                    println!("{}", serde_json::to_string(&result)?);
                } else {
                    println!("{}", format_step_line(&result));
                }
                summary.record(result.status);
            }
            Err(error) => {
                if args.json {
                    println!(
                        "{}",
                        serde_json::json!({ "index": index, "error": format!("{error:#}") })
                    );
                } else {
                    println!("step {index} failed: {error:#}");
                }
                summary.record_failure();
            }
        }
        let processed = index + 1;
        if !args.json {
            println!("processed {processed} of {total} ({}%)", processed * 100 / total);
        }
        index += 1;
    }

    // Under --json every stdout line stays a JSON object.
    if args.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("completed all slug updates");
        println!("updated: {}", summary.updated);
        println!("not_found: {}", summary.not_found);
        println!("failed: {}", summary.failed);
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn run_single_step(runtime: &RuntimeOptions, args: StepArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime);
    let config = load_config(&paths.config_path)?;
    let mut connection = open_ready_store(&paths.db_path)?;

    let result = process_step(&mut connection, &config, args.index)?;

    if args.json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{}", format_step_line(&result));
        if result.status == StepStatus::AllDone {
            println!(
                "index {} is past the end of the mapping list ({} mappings)",
                result.index, result.total
            );
        }
        if let (Some(old_url), Some(new_url)) = (&result.old_url, &result.new_url) {
            println!("old_url: {old_url}");
            println!("new_url: {new_url}");
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    Ok(())
}

fn format_step_line(result: &RenameResult) -> String {
    let mut line = format!(
        "[{}/{}] {}",
        result.index + 1,
        result.total,
        result.status.as_str()
    );
    if let (Some(from_slug), Some(to_slug)) = (&result.from_slug, &result.to_slug) {
        line.push_str(&format!(" (slug {from_slug} -> {to_slug})"));
    }
    if let Some(item_id) = result.item_id {
        line.push_str(&format!(" [item {item_id}]"));
    }
    if result.status == StepStatus::Updated {
        line.push_str(&format!(
            " [content: {}, layout: {}, menu: {}]",
            result.changes.content_replacements,
            result.changes.meta_replacements,
            result.changes.menu_replacements
        ));
    }
    line
}

fn print_skipped_lines(report: &MappingParseReport) {
    if report.skipped.is_empty() {
        return;
    }
    println!("skipped lines:");
    for line in &report.skipped {
        println!("  line {}: {:?} ({})", line.line_number, line.content, line.reason.as_str());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> ResolvedPaths {
    dotenvy::dotenv().ok();

    let overrides = PathOverrides {
        db: runtime.db.clone(),
        config: runtime.config.clone(),
    };
    resolve_paths(&overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn status_succeeds_on_an_unmigrated_database() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("store.db");
        // A database file without any schema applied yet.
        open_store(&db_path).expect("create bare database");

        let runtime = RuntimeOptions {
            db: Some(db_path),
            config: Some(temp.path().join("slugsync.toml")),
            diagnostics: false,
        };
        run_status(&runtime).expect("status on unmigrated store");
    }
}
