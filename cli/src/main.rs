use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use schema_ledger_core::MigrationStatus;
use schema_ledger_engine::{
    FailurePolicy, MigrationConfig, MigrationExecutor, MigrationGenerator, Operation,
    OrphanPolicy, RunReport, Template, VersionLedger,
};
use schema_ledger_sqlite::SqliteConnection;
use tracing_subscriber::EnvFilter;

/// Output format for `status`.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum CliOutputFormat {
    #[default]
    Table,
    Json,
}

/// Script skeletons selectable from the command line.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum CliTemplate {
    #[default]
    Default,
    CreateTable,
    AlterTable,
    DataMigration,
}

impl From<CliTemplate> for Template {
    fn from(template: CliTemplate) -> Self {
        match template {
            CliTemplate::Default => Self::Default,
            CliTemplate::CreateTable => Self::CreateTable,
            CliTemplate::AlterTable => Self::AlterTable,
            CliTemplate::DataMigration => Self::DataMigration,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "schema-ledger")]
#[command(about = "Versioned schema migrations for SQLite databases")]
struct Cli {
    /// Log engine events at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the ledger table if it does not exist.
    Init(TargetArgs),
    /// Apply pending migrations as one batch.
    Migrate(MigrateArgs),
    /// Revert the most recent batches.
    Rollback(RollbackArgs),
    /// Revert every applied migration.
    Reset(ResetArgs),
    /// Reset, then migrate everything again.
    Refresh(ResetArgs),
    /// List pending, applied and orphaned migrations.
    Status(StatusArgs),
    /// Generate a new migration script.
    Make(MakeArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Migrations directory. Overrides the configuration file.
    #[arg(long)]
    dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Ledger table name. Overrides the configuration file.
    #[arg(long)]
    table: Option<String>,
    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Apply at most this many migrations.
    #[arg(long)]
    steps: Option<usize>,
    /// Revert this run's earlier migrations when one fails.
    #[arg(long)]
    compensate: bool,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Number of batches to revert.
    #[arg(long, default_value_t = 1)]
    steps: usize,
}

#[derive(Debug, Args)]
struct ResetArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Fail instead of skipping ledger rows whose script is gone.
    #[arg(long)]
    abort_on_orphan: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[command(flatten)]
    target: TargetArgs,
    /// Output format.
    #[arg(long, value_enum, default_value_t = CliOutputFormat::Table)]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct MakeArgs {
    /// Migration name, e.g. "create users".
    name: String,
    /// Description written into the script header.
    #[arg(long)]
    description: Option<String>,
    /// Skeleton to start from.
    #[arg(long, value_enum, default_value_t = CliTemplate::Default)]
    template: CliTemplate,
    #[command(flatten)]
    config: ConfigArgs,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Init(args) => run_init(args),
        Command::Migrate(args) => run_migrate(args),
        Command::Rollback(args) => run_rollback(args),
        Command::Reset(args) => run_reset(args),
        Command::Refresh(args) => run_refresh(args),
        Command::Status(args) => run_status(args),
        Command::Make(args) => run_make(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// commands
// ---------------------------------------------------------------------------

fn run_init(args: TargetArgs) -> Result<(), String> {
    let config = resolve_config(&args.config, args.table.as_deref())?;
    let conn = open_database(&args)?;
    let mut ledger = VersionLedger::new(conn, config.ledger_table.clone())
        .map_err(|e| format!("Failed to initialize ledger: {e}"))?;
    let created = ledger
        .ensure_ledger()
        .map_err(|e| format!("Failed to create ledger: {e}"))?;
    if created {
        println!(
            "Created ledger table '{}' in '{}'.",
            config.ledger_table,
            args.db.display()
        );
    } else {
        println!(
            "Ledger table '{}' already exists in '{}'.",
            config.ledger_table,
            args.db.display()
        );
    }
    Ok(())
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let mut config = resolve_config(&args.target.config, args.target.table.as_deref())?;
    if args.compensate {
        config.failure_policy = FailurePolicy::Compensate;
    }
    let mut executor = open_executor(&args.target, config)?;
    finish_report(executor.migrate(args.steps))
}

fn run_rollback(args: RollbackArgs) -> Result<(), String> {
    let config = resolve_config(&args.target.config, args.target.table.as_deref())?;
    let mut executor = open_executor(&args.target, config)?;
    finish_report(executor.rollback(Some(args.steps)))
}

fn run_reset(args: ResetArgs) -> Result<(), String> {
    let mut executor = open_reset_executor(&args)?;
    finish_report(executor.reset())
}

fn run_refresh(args: ResetArgs) -> Result<(), String> {
    let mut executor = open_reset_executor(&args)?;
    finish_report(executor.refresh())
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let config = resolve_config(&args.target.config, args.target.table.as_deref())?;
    let mut executor = open_executor(&args.target, config)?;
    let statuses = executor
        .status()
        .map_err(|e| format!("Failed to get migration status: {e}"))?;

    match args.format {
        CliOutputFormat::Table => print!("{}", format_status_table(&statuses)),
        CliOutputFormat::Json => {
            let json = serde_json::to_string_pretty(&statuses)
                .map_err(|e| format!("Failed to serialize status: {e}"))?;
            println!("{json}");
        }
    }
    Ok(())
}

fn run_make(args: MakeArgs) -> Result<(), String> {
    let config = resolve_config(&args.config, None)?;
    let generated = MigrationGenerator::from_config(&config)
        .generate(&args.name, args.description.as_deref(), args.template.into())
        .map_err(|e| format!("Failed to create migration: {e}"))?;
    println!("Created migration: {}", generated.path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Loads the configuration file, if any, and applies command-line overrides.
fn resolve_config(args: &ConfigArgs, table: Option<&str>) -> Result<MigrationConfig, String> {
    let mut config = match &args.config {
        Some(path) => MigrationConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => MigrationConfig::default(),
    };
    if let Some(dir) = &args.dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(table) = table {
        config.ledger_table = table.to_string();
    }
    config.validate().map_err(|e| format!("Invalid configuration: {e}"))?;
    Ok(config)
}

fn open_database(args: &TargetArgs) -> Result<SqliteConnection, String> {
    SqliteConnection::open(&args.db)
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))
}

fn open_executor(
    args: &TargetArgs,
    config: MigrationConfig,
) -> Result<MigrationExecutor<SqliteConnection>, String> {
    let conn = open_database(args)?;
    MigrationExecutor::open(conn, config).map_err(|e| format!("Failed to initialize migrations: {e}"))
}

fn open_reset_executor(args: &ResetArgs) -> Result<MigrationExecutor<SqliteConnection>, String> {
    let mut config = resolve_config(&args.target.config, args.target.table.as_deref())?;
    if args.abort_on_orphan {
        config.orphan_policy = OrphanPolicy::Abort;
    }
    open_executor(&args.target, config)
}

/// Prints what a run did; a failed run becomes the command's error.
fn finish_report(report: RunReport) -> Result<(), String> {
    for line in report_lines(&report) {
        println!("{line}");
    }
    if report.success {
        println!("{}", report.message);
        Ok(())
    } else {
        Err(report.message)
    }
}

fn report_lines(report: &RunReport) -> Vec<String> {
    let verb = match report.operation {
        Operation::Migrate | Operation::Refresh => "applied",
        Operation::Rollback | Operation::Reset => "reverted",
    };

    let mut lines = Vec::new();
    for script in &report.reverted {
        lines.push(format!("  reverted {} {}", script.version, script.name));
    }
    for script in &report.migrations {
        lines.push(format!("  {verb} {} {}", script.version, script.name));
    }
    for script in &report.compensated {
        lines.push(format!("  compensated {} {}", script.version, script.name));
    }
    for record in &report.skipped {
        lines.push(format!("  skipped orphan {} {}", record.version, record.name));
    }
    lines
}

fn format_status_table(statuses: &[MigrationStatus]) -> String {
    if statuses.is_empty() {
        return "No migrations found.\n".to_string();
    }

    let name_width = statuses
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!(
        "{:<14}  {:<name_width$}  {:<7}  {:>5}  APPLIED AT\n",
        "VERSION", "NAME", "STATE", "BATCH"
    );
    for status in statuses {
        let batch = status.batch.map(|b| b.to_string()).unwrap_or_default();
        let applied_at = status
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        out.push_str(
            format!(
                "{:<14}  {:<name_width$}  {:<7}  {:>5}  {applied_at}",
                status.version.as_str(),
                status.name,
                status.state.to_string(),
                batch
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_ledger_core::{MigrationScript, Version};

    fn config_args(config: Option<PathBuf>, dir: Option<&str>) -> ConfigArgs {
        ConfigArgs {
            config,
            dir: dir.map(PathBuf::from),
        }
    }

    fn script(version: &str, name: &str) -> MigrationScript {
        MigrationScript::new(
            Version::parse(version).unwrap(),
            name,
            format!("migrations/{version}_{name}.sql"),
        )
    }

    #[test]
    fn test_resolve_config_defaults() {
        let config = resolve_config(&config_args(None, None), None).unwrap();
        assert_eq!(config, MigrationConfig::default());
    }

    #[test]
    fn test_resolve_config_flags_override_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema-ledger.yml");
        std::fs::write(
            &path,
            "migrations_dir: from_file\nledger_table: file_table\nfailure_policy: compensate\n",
        )
        .unwrap();

        let from_file = resolve_config(&config_args(Some(path.clone()), None), None).unwrap();
        assert_eq!(from_file.migrations_dir, PathBuf::from("from_file"));
        assert_eq!(from_file.ledger_table, "file_table");
        assert_eq!(from_file.failure_policy, FailurePolicy::Compensate);

        let overridden =
            resolve_config(&config_args(Some(path), Some("db/migrations")), Some("ledger")).unwrap();
        assert_eq!(overridden.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(overridden.ledger_table, "ledger");
        assert_eq!(overridden.failure_policy, FailurePolicy::Compensate);
    }

    #[test]
    fn test_resolve_config_rejects_bad_table() {
        let err = resolve_config(&config_args(None, None), Some("bad; DROP")).unwrap_err();
        assert!(err.starts_with("Invalid configuration"), "{err}");
    }

    #[test]
    fn test_status_table_lists_pending() {
        let statuses = vec![MigrationStatus::pending(&script("20240101000000", "create_users"))];
        let table = format_status_table(&statuses);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("VERSION"));
        assert_eq!(lines[1], "20240101000000  create_users  pending");
    }

    #[test]
    fn test_status_table_empty() {
        assert_eq!(format_status_table(&[]), "No migrations found.\n");
    }

    #[test]
    fn test_report_lines_label_direction() {
        let report = RunReport {
            operation: Operation::Refresh,
            success: true,
            message: "Refreshed 1 migrations".to_string(),
            migrations: vec![script("20240101000000", "create_users")],
            reverted: vec![script("20240101000000", "create_users")],
            batch: Some(1),
            skipped: Vec::new(),
            compensated: Vec::new(),
            failure: None,
        };
        assert_eq!(
            report_lines(&report),
            [
                "  reverted 20240101000000 create_users",
                "  applied 20240101000000 create_users"
            ]
        );
    }
}
