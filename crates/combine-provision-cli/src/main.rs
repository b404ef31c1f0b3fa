//! Combine environment provisioner CLI
//!
//! The `combine-provision` command brings a host (usually an image build)
//! to the state the Combine application expects.
//!
//! ## Commands
//!
//! - `run`: Execute every provisioning step in order, stopping at the first failure
//! - `plan`: Print the ordered steps and their commands without executing anything
//! - `sql`: Print the rendered database bootstrap script
//! - `bootstrap-db`: Run only the database bootstrap step

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use combine_db_bootstrap::render_script;
use combine_provisioner::{
    init_tracing, names, ProvisionConfig, ProvisionPlan, ProvisionReport, Provisioner,
    StepContext, StepStatus, SystemExecutor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "combine-provision")]
#[command(author = "Combine Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provision the Combine runtime environment", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, env = "COMBINE_PROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Application branch to check out
    #[arg(long, global = true, env = "COMBINE_BRANCH")]
    branch: Option<String>,

    /// Job-submission client (Livy) release
    #[arg(long, global = true, env = "LIVY_TAG")]
    livy_tag: Option<String>,

    /// Scala version of the Livy build
    #[arg(long, global = true, env = "SCALA_VERSION")]
    scala_version: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning procedure
    Run {
        /// Skip a step by name (repeatable)
        #[arg(long = "skip", value_name = "STEP")]
        skip: Vec<String>,

        /// Write the run report as JSON to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Show the ordered steps and their commands
    Plan,

    /// Print the database bootstrap script
    Sql,

    /// Run only the database bootstrap step
    BootstrapDb {
        /// Write the run report as JSON to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run { skip, report } => cmd_run(&config, skip, report.as_deref()).await,
        Commands::Plan => cmd_plan(&config),
        Commands::Sql => cmd_sql(&config),
        Commands::BootstrapDb { report } => cmd_bootstrap_db(&config, report.as_deref()).await,
    }
}

/// File (or defaults), then environment, then build-parameter flags.
fn load_config(cli: &Cli) -> Result<ProvisionConfig> {
    let config = ProvisionConfig::load(cli.config.as_deref())
        .context("Failed to load provisioning configuration")?
        .with_env_overrides();
    Ok(apply_build_overrides(
        config,
        cli.branch.clone(),
        cli.livy_tag.clone(),
        cli.scala_version.clone(),
    ))
}

fn apply_build_overrides(
    mut config: ProvisionConfig,
    branch: Option<String>,
    livy_tag: Option<String>,
    scala_version: Option<String>,
) -> ProvisionConfig {
    if let Some(branch) = branch {
        config.build.branch = branch;
    }
    if let Some(tag) = livy_tag {
        config.build.livy_tag = tag;
    }
    if let Some(scala) = scala_version {
        config.build.scala_version = scala;
    }
    config
}

async fn cmd_run(config: &ProvisionConfig, skip: Vec<String>, report: Option<&Path>) -> Result<()> {
    let plan = ProvisionPlan::from_config(config)
        .context("Invalid provisioning configuration")?
        .skip(skip)
        .context("Invalid --skip")?;
    execute(plan, report).await
}

async fn cmd_bootstrap_db(config: &ProvisionConfig, report: Option<&Path>) -> Result<()> {
    let plan = ProvisionPlan::from_config(config).context("Invalid provisioning configuration")?;
    let others = all_but(&plan.step_names(), names::BOOTSTRAP_DATABASE);
    let plan = plan.skip(others)?;
    execute(plan, report).await
}

/// Names in `steps` other than `keep`.
fn all_but(steps: &[String], keep: &str) -> Vec<String> {
    steps.iter().filter(|s| s.as_str() != keep).cloned().collect()
}

async fn execute(plan: ProvisionPlan, report_path: Option<&Path>) -> Result<()> {
    let provisioner = Provisioner::new(StepContext::new(Arc::new(SystemExecutor)));

    match provisioner.run(&plan).await {
        Ok(report) => {
            print_summary(&report);
            if let Some(path) = report_path {
                write_report(&report, path)?;
            }
            println!("\n✓ Environment provisioned");
            Ok(())
        }
        Err(e) => {
            // Keep the partial report; it names the failing step.
            if let Some(report) = e.report() {
                print_summary(report);
                if let Some(path) = report_path {
                    write_report(report, path)?;
                }
            }
            Err(e).context("Provisioning aborted")
        }
    }
}

fn print_summary(report: &ProvisionReport) {
    println!("Run ID: {}", report.run_id);
    println!("Plan: {}", &report.plan_digest[..12]);
    println!(
        "Status: {}",
        if report.success { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!();

    for step in &report.steps {
        let mark = match step.status {
            StepStatus::Applied => "✓",
            StepStatus::AlreadyPresent => "=",
            StepStatus::Skipped => "-",
            StepStatus::Failed => "✗",
            StepStatus::NotRun => " ",
        };
        println!(
            "  {} {} ({:?}, {}ms)",
            mark, step.name, step.status, step.duration_ms
        );
    }

    if let Some(failed) = &report.failed_step {
        println!();
        println!("Failed step: {}", failed);
        if let Some(step) = report.steps.iter().find(|s| &s.name == failed) {
            println!("{}", step.detail);
        }
    }
}

fn write_report(report: &ProvisionReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    info!(path = %path.display(), "Run report written");
    Ok(())
}

fn cmd_plan(config: &ProvisionConfig) -> Result<()> {
    let plan = ProvisionPlan::from_config(config).context("Invalid provisioning configuration")?;

    println!("Plan: {}", plan.digest());
    println!(
        "Build: branch={} livy={} scala={}",
        config.build.branch, config.build.livy_tag, config.build.scala_version
    );
    println!();

    for (i, step) in plan.steps().iter().enumerate() {
        println!("{:>2}. {}", i + 1, step.name());
        for line in step.describe() {
            println!("      {}", line);
        }
    }
    Ok(())
}

fn cmd_sql(config: &ProvisionConfig) -> Result<()> {
    config
        .database
        .credentials
        .validate()
        .context("Invalid database credentials")?;
    print!("{}", render_script(&config.database.credentials));
    Ok(())
}
