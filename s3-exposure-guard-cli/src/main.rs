//! `s3-exposure-guard`: audit S3 buckets for public exposure and apply reviewed remediations.

mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};
use s3_exposure_guard_core::config::{
    DEFAULT_BUCKET_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_OBJECT_CONCURRENCY, DEFAULT_PARTITION,
};
use s3_exposure_guard_core::{
    load_target_list, plan_remediation, AuditScope, ExposureGuardService, GuardConfig,
    PlannedAction, RemediationMode,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// At least one target failed
const EXIT_FAILED: u8 = 1;
/// Usage, configuration or target-list error, or a refused confirmation
const EXIT_REFUSED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "s3-exposure-guard", version)]
#[command(
    about = "Audit S3 buckets for public exposure and apply reviewed remediations",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// AWS region (falls back to the profile's region)
    #[arg(long, env = "S3_GUARD_REGION", global = true)]
    region: Option<String>,

    /// Named AWS profile
    #[arg(long, env = "AWS_PROFILE", global = true)]
    profile: Option<String>,

    /// Custom S3 endpoint, e.g. a local emulator (enables path-style addressing)
    #[arg(long, env = "S3_GUARD_ENDPOINT_URL", global = true)]
    endpoint_url: Option<String>,

    /// Total attempts per request, including retries
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, global = true)]
    max_attempts: u32,

    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs(), global = true)]
    connect_timeout_secs: u64,

    /// Buckets processed concurrently
    #[arg(long, default_value_t = DEFAULT_BUCKET_CONCURRENCY, global = true)]
    bucket_concurrency: usize,

    /// Object ACL reads in flight per bucket
    #[arg(long, default_value_t = DEFAULT_OBJECT_CONCURRENCY, global = true)]
    object_concurrency: usize,

    /// ARN partition used in the guard statement (aws, aws-cn, aws-us-gov)
    #[arg(long, default_value = DEFAULT_PARTITION, global = true)]
    partition: String,

    /// Directory for the per-run log file
    #[arg(long, env = "S3_GUARD_LOG_DIR", default_value = ".", global = true)]
    log_dir: PathBuf,

    /// Write the JSON summary (or plan, with --dry-run) to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify buckets as public or private and print the public ones
    Audit {
        /// Only audit the non-KEEP buckets of this target list
        #[arg(long)]
        targets: Option<PathBuf>,

        /// Skip per-object ACL reads (faster, may miss object-level exposure)
        #[arg(long)]
        skip_object_scan: bool,
    },
    /// Add the RestrictGetObject deny statement to RESTRICT buckets
    Restrict {
        /// Target list CSV with Name and Action columns
        targets: PathBuf,

        /// Also enable all four public access block flags
        #[arg(long)]
        block_public_access: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },
    /// Remove the RestrictGetObject statement from UNRESTRICT buckets
    Unrestrict {
        /// Target list CSV with Name and Action columns
        targets: PathBuf,

        #[command(flatten)]
        apply: ApplyArgs,
    },
    /// Delete DELETE buckets
    Delete {
        /// Target list CSV with Name and Action columns
        targets: PathBuf,

        /// Delete all current objects first
        #[arg(long)]
        purge_objects: bool,

        #[command(flatten)]
        apply: ApplyArgs,
    },
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Print the plan without calling AWS
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, short)]
    yes: bool,
}

impl GlobalArgs {
    fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            region: self.region.clone(),
            profile: self.profile.clone(),
            endpoint_url: self.endpoint_url.clone(),
            max_attempts: self.max_attempts,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            bucket_concurrency: self.bucket_concurrency,
            object_concurrency: self.object_concurrency,
            partition: self.partition.clone(),
            ..GuardConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if !atty::is(atty::Stream::Stderr) {
        colored::control::set_override(false);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(EXIT_REFUSED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let log_path = logging::init(&cli.global.log_dir, cli.global.verbose)?;
    info!("Logging to {}", log_path.display());

    let mut config = cli.global.guard_config();
    let report = cli.global.report.as_deref();

    match cli.command {
        Commands::Audit {
            targets,
            skip_object_scan,
        } => {
            config.scan_objects = !skip_object_scan;
            let scope = match targets {
                Some(path) => AuditScope::Targets(load_target_list(&path).await?),
                None => AuditScope::AllBuckets,
            };
            run_audit(config, scope, report).await
        }
        Commands::Restrict {
            targets,
            block_public_access,
            apply,
        } => {
            config.block_public_access_on_restrict = block_public_access;
            run_remediation(config, RemediationMode::Restrict, &targets, &apply, report).await
        }
        Commands::Unrestrict { targets, apply } => {
            run_remediation(config, RemediationMode::Unrestrict, &targets, &apply, report).await
        }
        Commands::Delete {
            targets,
            purge_objects,
            apply,
        } => {
            config.purge_objects_on_delete = purge_objects;
            run_remediation(config, RemediationMode::Delete, &targets, &apply, report).await
        }
    }
}

async fn run_audit(
    config: GuardConfig,
    scope: AuditScope,
    report: Option<&Path>,
) -> Result<ExitCode> {
    let service = ExposureGuardService::new(config).await?;
    let cancel = cancel_on_ctrl_c();

    let summary = service
        .audit(scope, &cancel)
        .await
        .context("audit could not start")?;
    output::print_audit(&summary);
    if let Some(path) = report {
        output::write_report(path, &summary)?;
    }

    Ok(exit_code(summary.has_failures()))
}

async fn run_remediation(
    config: GuardConfig,
    mode: RemediationMode,
    targets_path: &Path,
    apply: &ApplyArgs,
    report: Option<&Path>,
) -> Result<ExitCode> {
    let targets = load_target_list(targets_path).await?;
    let plan = plan_remediation(&targets, mode);
    output::print_plan(&plan);

    if apply.dry_run {
        eprintln!("{}", "Dry run: no changes made.".yellow());
        if let Some(path) = report {
            output::write_report(path, &plan)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let executions = plan
        .iter()
        .filter(|p| matches!(p, PlannedAction::Execute { .. }))
        .count();
    if executions == 0 {
        eprintln!("Nothing to do: no targets are marked for {:?}.", mode);
        return Ok(ExitCode::SUCCESS);
    }

    if !apply.yes {
        if !atty::is(atty::Stream::Stdin) {
            eprintln!(
                "{} refusing to change buckets without a terminal; re-run with --yes",
                "Refused:".red().bold()
            );
            return Ok(ExitCode::from(EXIT_REFUSED));
        }
        if !output::confirm(mode, executions)? {
            eprintln!("Aborted.");
            return Ok(ExitCode::from(EXIT_REFUSED));
        }
    }

    let service = ExposureGuardService::new(config).await?;
    let cancel = cancel_on_ctrl_c();
    let summary = service.apply_plan(&plan, &cancel).await;

    output::print_remediation(&summary);
    if let Some(path) = report {
        output::write_report(path, &summary)?;
    }

    Ok(exit_code(summary.has_failures()))
}

/// Cancel the returned token on the first Ctrl-C; work already finished is kept.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: finishing in-flight requests, not starting new ones");
            token.cancel();
        }
    });
    cancel
}

fn exit_code(has_failures: bool) -> ExitCode {
    if has_failures {
        ExitCode::from(EXIT_FAILED)
    } else {
        ExitCode::SUCCESS
    }
}
