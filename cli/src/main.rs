//! `tidyctl` — the clang-tidy refactor orchestrator CLI.
//!
//! Every subcommand resolves `--app` through the layered config, drives the
//! relevant core component, and exits with the component's code: 0 success,
//! 1 failure, 2 blocked by a manual task, 124 tidy-batch timeout.

mod collab;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tidyctl_core::TidyConfig;
use tidyctl_core::config::AppContext;
use tidyctl_core::flow::{
    BatchRunOptions, CleanOptions, FlowOptions, LoopOptions, clean, run_tidy_batch,
    run_tidy_close, run_tidy_flow, run_tidy_loop,
};
use tidyctl_core::invoker::{TidyInvoker, TidyRunOptions};
use tidyctl_core::refresh::{ProcessRefreshRunner, RefreshOptions, run_refresh};
use tidyctl_core::rename::{ApplyOptions, PlanOptions, RenameContext};
use tidyctl_core::tasks::partition_build_log;

use crate::collab::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "tidyctl", version, about = "Clang-tidy refactor orchestrator")]
struct Cli {
    /// Config file; defaults to ./tidyctl.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by every subcommand that targets one app.
#[derive(Debug, Args)]
struct AppArgs {
    /// Registered application name ([apps.<name>] in the config).
    #[arg(long)]
    app: String,

    /// Override the tidy build dir.
    #[arg(long, value_name = "DIR")]
    build_dir: Option<PathBuf>,

    /// CMake build profile (CMAKE_BUILD_TYPE) applied on configure.
    #[arg(long)]
    profile: Option<String>,

    /// Evict lingering build-tool processes before configure/build.
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_kill_build_procs")]
    kill_build_procs: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_kill_build_procs: bool,
}

impl AppArgs {
    /// Load the config with the flag overrides folded in, and resolve the
    /// app.
    fn resolve(&self, config_path: Option<&PathBuf>) -> anyhow::Result<(TidyConfig, AppContext)> {
        let mut config =
            TidyConfig::load(config_path.map(PathBuf::as_path)).context("loading config")?;
        if self.no_kill_build_procs {
            config.kill_build_procs = false;
        } else if self.kill_build_procs {
            config.kill_build_procs = true;
        }
        let app = config.resolve_app(&self.app, self.build_dir.as_deref())?;
        Ok((config, app))
    }

    /// `-DCMAKE_BUILD_TYPE=<profile>` when a profile was requested.
    fn profile_args(&self) -> Vec<String> {
        self.profile
            .iter()
            .map(|p| format!("-DCMAKE_BUILD_TYPE={p}"))
            .collect()
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the configure step of the build backend.
    Configure(ConfigureArgs),
    /// Run the build step, configuring first when needed.
    Build(BuildArgs),
    /// Full tidy pass plus task partition.
    Tidy(TidyArgs),
    /// Re-partition an existing build.log.
    TidySplit(TidySplitArgs),
    /// Drive the clang-tidy-fix target.
    TidyFix(TidyFixArgs),
    /// Consume tasks in id order: rename, archive, verify.
    TidyLoop(TidyLoopArgs),
    /// The outer prepare/rename/verify/loop/clean state machine.
    TidyFlow(TidyFlowArgs),
    /// Incremental refresh with full-pass cadence.
    TidyRefresh(TidyRefreshArgs),
    /// Verify + clean + refresh composite for one batch.
    TidyBatch(TidyBatchArgs),
    /// Final-full refresh, final verify, and the empty-tasks assertion.
    TidyClose(TidyCloseArgs),
    /// Archive task logs into tasks_done/.
    Clean(CleanArgs),
    /// Collect and persist rename candidates.
    RenamePlan(RenamePlanArgs),
    /// Apply planned renames through clangd.
    RenameApply(RenameApplyArgs),
    /// Audit rename outcomes on disk, without the LSP.
    RenameAudit(RenameAuditArgs),
}

#[derive(Debug, Args)]
struct ConfigureArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Configure for a tidy build (exports compile commands, enables the
    /// tidy targets).
    #[arg(long)]
    tidy: bool,

    /// Extra CMake arguments, shell-quoted in one string.
    #[arg(long, value_name = "ARGS")]
    cmake_args: Option<String>,

    /// Raw arguments after `--`, appended to the configure invocation.
    #[arg(last = true)]
    extra_args: Vec<String>,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[command(flatten)]
    app: AppArgs,

    #[arg(long)]
    tidy: bool,

    #[arg(long, value_name = "ARGS")]
    cmake_args: Option<String>,

    #[arg(last = true)]
    extra_args: Vec<String>,
}

#[derive(Debug, Args)]
struct TidyArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Parallel build jobs.
    #[arg(long, short = 'j')]
    jobs: Option<u32>,

    /// Section-parse workers; 0 means min(8, CPU count).
    #[arg(long)]
    parse_workers: Option<usize>,

    /// Build the app-scoped tidy_all_<app> target instead of the global
    /// tidy target.
    #[arg(long)]
    app_target: bool,

    /// Continue past per-file tidy failures (default).
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_keep_going")]
    keep_going: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_keep_going: bool,
}

#[derive(Debug, Args)]
struct TidySplitArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Per-task cap on raw diagnostic lines.
    #[arg(long)]
    max_lines: Option<usize>,

    /// Per-task cap on diagnostic count.
    #[arg(long)]
    max_diags: Option<usize>,

    /// Tasks per batch directory.
    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    parse_workers: Option<usize>,
}

#[derive(Debug, Args)]
struct TidyFixArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Bound the fix pass to this step count.
    #[arg(long)]
    limit: Option<u32>,

    #[arg(long, short = 'j')]
    jobs: Option<u32>,

    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_keep_going")]
    keep_going: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_keep_going: bool,
}

#[derive(Debug, Args)]
struct TidyLoopArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Max tasks to process this run.
    #[arg(long, conflicts_with = "all")]
    n: Option<usize>,

    /// Process every task.
    #[arg(long)]
    all: bool,

    /// Verify after every this many archived tasks.
    #[arg(long)]
    test_every: Option<usize>,

    /// Only print the final summary.
    #[arg(long)]
    concise: bool,
}

#[derive(Debug, Args)]
struct TidyFlowArgs {
    #[command(flatten)]
    app: AppArgs,

    #[arg(long, conflicts_with = "all")]
    n: Option<usize>,

    #[arg(long)]
    all: bool,

    #[arg(long)]
    test_every: Option<usize>,

    /// Reuse the previous run's checkpoints and any existing tasks.
    #[arg(long)]
    resume: bool,

    /// Run the clang-tidy-fix pre-pass before the full tidy.
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_tidy_fix")]
    with_tidy_fix: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_tidy_fix: bool,
}

#[derive(Debug, Args)]
struct TidyRefreshArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Batch to refresh for; accepts `3`, `003`, or `batch_003`.
    #[arg(long)]
    batch_id: Option<String>,

    /// Override the full-pass cadence.
    #[arg(long)]
    full_every: Option<u32>,

    /// Compile-unit expansion around touched files.
    #[arg(long, value_parser = ["none", "dir", "module"])]
    neighbor_scope: Option<String>,

    /// Force a full pass regardless of cadence.
    #[arg(long)]
    force_full: bool,

    /// Closing full pass (tolerates a missing batch directory).
    #[arg(long)]
    final_full: bool,

    /// Print the selection plan and exit without running tidy.
    #[arg(long)]
    dry_run: bool,

    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_keep_going")]
    keep_going: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_keep_going: bool,
}

#[derive(Debug, Args)]
struct TidyBatchArgs {
    #[command(flatten)]
    app: AppArgs,

    #[arg(long)]
    batch_id: String,

    /// Refuse to archive unless the latest verify result is green.
    #[arg(long)]
    strict_clean: bool,

    #[arg(long)]
    full_every: Option<u32>,

    /// Run the verify stage first (default).
    #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_run_verify")]
    run_verify: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_run_verify: bool,

    /// Wall-clock budget in seconds; exceeded returns 124.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct TidyCloseArgs {
    #[command(flatten)]
    app: AppArgs,
}

#[derive(Debug, Args)]
struct CleanArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Refuse to archive unless the latest verify result is green.
    #[arg(long)]
    strict: bool,

    /// Restrict to one batch.
    #[arg(long)]
    batch_id: Option<String>,

    /// Restrict to explicit task ids.
    #[arg(value_name = "TASK_ID")]
    task_ids: Vec<usize>,
}

#[derive(Debug, Args)]
struct RenamePlanArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Truncate the plan to this many candidates.
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Run a full tidy pass first to refresh the tasks.
    #[arg(long)]
    run_tidy: bool,
}

#[derive(Debug, Args)]
struct RenameApplyArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Stop after this many candidates.
    #[arg(long)]
    limit: Option<usize>,

    /// Preview only; write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero when any candidate failed.
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Args)]
struct RenameAuditArgs {
    #[command(flatten)]
    app: AppArgs,

    /// Exit non-zero when any candidate is not resolved.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tidyctl: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TIDYCTL_LOG")
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let Cli {
        config: config_path,
        command,
    } = cli;
    match command {
        Command::Configure(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let invoker = TidyInvoker::new(&config, &app);
            let mut cmake_args = args.app.profile_args();
            cmake_args.extend(split_cmake_args(args.cmake_args.as_deref())?);
            cmake_args.extend(args.extra_args);
            Ok(invoker.configure(args.tidy, &cmake_args).await?)
        }
        Command::Build(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let invoker = TidyInvoker::new(&config, &app);
            let mut cmake_args = args.app.profile_args();
            cmake_args.extend(split_cmake_args(args.cmake_args.as_deref())?);
            cmake_args.extend(args.extra_args);
            let configure_code = invoker.ensure_configured(args.tidy, &cmake_args).await?;
            if configure_code != 0 {
                return Ok(configure_code);
            }
            Ok(invoker.build(None, None, false, None).await?)
        }
        Command::Tidy(args) => {
            let (mut config, app) = args.app.resolve(config_path.as_ref())?;
            if let Some(workers) = args.parse_workers {
                config.parse_workers = workers;
            }
            let invoker = TidyInvoker::new(&config, &app);
            let target = args
                .app_target
                .then(|| format!("{}_{}", tidyctl_core::invoker::TIDY_ALL_TARGET, app.name));
            let outcome = invoker
                .run_full_tidy(&TidyRunOptions {
                    jobs: args.jobs,
                    keep_going: flag_pair(args.keep_going, args.no_keep_going, true),
                    target,
                    cmake_args: args.app.profile_args(),
                })
                .await?;
            println!(
                "tidy: configure {:.1}s | build {:.1}s | parse {:.1}s | total {:.1}s",
                outcome.timings.configure_secs,
                outcome.timings.build_secs,
                outcome.timings.parse_secs,
                outcome.timings.total_secs
            );
            if let Some(stats) = &outcome.step_stats {
                print!("{}", stats.render());
            }
            if let Some(partition) = &outcome.partition {
                println!(
                    "tasks: {} in {} batches ({} files, {} diagnostics)",
                    partition.tasks, partition.batches, partition.files, partition.diagnostics
                );
            }
            Ok(outcome.exit_code)
        }
        Command::TidySplit(args) => {
            let (mut config, app) = args.app.resolve(config_path.as_ref())?;
            if let Some(v) = args.max_lines {
                config.max_lines = v;
            }
            if let Some(v) = args.max_diags {
                config.max_diags = v;
            }
            if let Some(v) = args.batch_size {
                config.batch_size = v;
            }
            if let Some(v) = args.parse_workers {
                config.parse_workers = v;
            }
            config.validate()?;
            let invoker = TidyInvoker::new(&config, &app);
            let stats = partition_build_log(
                &app.layout.build_log(),
                &app.layout.tasks_dir(),
                &invoker.partition_options(),
            )
            .await?;
            println!(
                "tasks: {} in {} batches ({} files, {} diagnostics)",
                stats.tasks, stats.batches, stats.files, stats.diagnostics
            );
            Ok(0)
        }
        Command::TidyFix(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let invoker = TidyInvoker::new(&config, &app);
            Ok(invoker
                .run_tidy_fix(args.limit, args.jobs, flag_pair(args.keep_going, args.no_keep_going, true))
                .await?)
        }
        Command::TidyLoop(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let mut orchestrator = Orchestrator::new(&config, &app);
            let outcome = run_tidy_loop(
                &config,
                &app,
                &mut orchestrator,
                &LoopOptions {
                    n: args.n,
                    all: args.all,
                    test_every: args.test_every.unwrap_or(config.test_every),
                    concise: args.concise,
                },
            )
            .await?;
            println!(
                "tidy-loop: archived {} task(s), {} pending{}",
                outcome.archived_task_ids.len(),
                outcome.pending_task_ids.len(),
                match outcome.blocked_task_id {
                    Some(id) => format!(", blocked on task_{id:03}"),
                    None => String::new(),
                }
            );
            Ok(outcome.exit_code)
        }
        Command::TidyFlow(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let mut orchestrator = Orchestrator::new(&config, &app);
            Ok(run_tidy_flow(
                &config,
                &app,
                &mut orchestrator,
                &FlowOptions {
                    n: args.n,
                    all: args.all,
                    test_every: args.test_every.unwrap_or(config.test_every),
                    resume: args.resume,
                    with_tidy_fix: flag_pair(args.with_tidy_fix, args.no_tidy_fix, false),
                },
            )
            .await?)
        }
        Command::TidyRefresh(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let mut runner = ProcessRefreshRunner::new(&config, &app);
            let opts = RefreshOptions {
                batch_id: args.batch_id,
                full_every: args.full_every,
                neighbor_scope: args.neighbor_scope,
                force_full: args.force_full,
                final_full: args.final_full,
                dry_run: args.dry_run,
                keep_going: flag_pair(args.keep_going, args.no_keep_going, true),
            };
            let (code, report) = run_refresh(&config, &app, &mut runner, &opts).await?;
            if args.dry_run {
                print!("{}", report.render_plan());
            } else if !report.full_reasons.is_empty() {
                println!("full pass ran: {}", report.full_reasons.join(", "));
            }
            Ok(code)
        }
        Command::TidyBatch(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let mut orchestrator = Orchestrator::new(&config, &app);
            orchestrator.full_every = args.full_every;
            Ok(run_tidy_batch(
                &config,
                &app,
                &mut orchestrator,
                &BatchRunOptions {
                    batch_id: args.batch_id,
                    strict_clean: args.strict_clean,
                    run_verify: flag_pair(args.run_verify, args.no_run_verify, true),
                    timeout: args.timeout.map(Duration::from_secs),
                },
            )
            .await?)
        }
        Command::TidyClose(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let mut orchestrator = Orchestrator::new(&config, &app);
            Ok(run_tidy_close(&config, &app, &mut orchestrator).await?)
        }
        Command::Clean(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let outcome = clean(
                &config,
                &app,
                &CleanOptions {
                    strict: args.strict,
                    batch_id: args.batch_id,
                    task_ids: args.task_ids,
                },
            )?;
            println!("clean: archived {} task(s)", outcome.archived_task_ids.len());
            Ok(0)
        }
        Command::RenamePlan(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            if args.run_tidy {
                let invoker = TidyInvoker::new(&config, &app);
                let outcome = invoker
                    .run_full_tidy(&TidyRunOptions {
                        keep_going: true,
                        ..Default::default()
                    })
                    .await?;
                if outcome.exit_code != 0 {
                    tracing::warn!(code = outcome.exit_code, "tidy pass failed, planning anyway");
                }
            }
            let ctx = RenameContext::from_app(&config, &app);
            let set = tidyctl_core::rename::plan(
                &ctx,
                &PlanOptions {
                    max_candidates: args.max_candidates,
                },
            )?;
            println!(
                "rename-plan: {} candidate(s) selected of {}{}",
                set.selected,
                set.total,
                if set.truncated { " (truncated)" } else { "" }
            );
            Ok(0)
        }
        Command::RenameApply(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let ctx = RenameContext::from_app(&config, &app);
            let mut client = collab::spawn_clangd(&config, &app)?;
            let apply_outcome = tidyctl_core::rename::apply(
                &ctx,
                &mut client,
                &ApplyOptions {
                    limit: args.limit,
                    dry_run: args.dry_run,
                    strict: args.strict,
                },
            )
            .await;
            client.shutdown().await?;
            let (code, report) = apply_outcome?;
            println!(
                "rename-apply: applied {} | skipped {} | failed {}",
                report.summary.applied, report.summary.skipped, report.summary.failed
            );
            Ok(code)
        }
        Command::RenameAudit(args) => {
            let (config, app) = args.app.resolve(config_path.as_ref())?;
            let ctx = RenameContext::from_app(&config, &app);
            let (code, report) = tidyctl_core::rename::audit(&ctx, args.strict)?;
            println!(
                "rename-audit: resolved {} | pending {} | missing {} | out of scope {}",
                report.summary.resolved,
                report.summary.pending,
                report.summary.missing_file,
                report.summary.out_of_scope
            );
            Ok(code)
        }
    }
}

/// Resolve a `--foo` / `--no-foo` pair against its default.
fn flag_pair(on: bool, off: bool, default: bool) -> bool {
    if off {
        false
    } else if on {
        true
    } else {
        default
    }
}

/// `--cmake-args "-DX=1 -DY=2"` splits shell-style.
fn split_cmake_args(raw: Option<&str>) -> anyhow::Result<Vec<String>> {
    match raw {
        None => Ok(Vec::new()),
        Some(text) => {
            shlex::split(text).ok_or_else(|| anyhow::anyhow!("unbalanced quoting in --cmake-args"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_parses_every_subcommand() {
        for argv in [
            vec!["tidyctl", "configure", "--app", "demo", "--tidy"],
            vec!["tidyctl", "build", "--app", "demo"],
            vec!["tidyctl", "tidy", "--app", "demo", "--jobs", "4", "--no-keep-going"],
            vec!["tidyctl", "tidy-split", "--app", "demo", "--max-diags", "3"],
            vec!["tidyctl", "tidy-fix", "--app", "demo", "--limit", "10"],
            vec!["tidyctl", "tidy-loop", "--app", "demo", "--n", "5"],
            vec!["tidyctl", "tidy-flow", "--app", "demo", "--all", "--resume"],
            vec![
                "tidyctl",
                "tidy-refresh",
                "--app",
                "demo",
                "--batch-id",
                "3",
                "--neighbor-scope",
                "module",
                "--dry-run",
            ],
            vec!["tidyctl", "tidy-batch", "--app", "demo", "--batch-id", "1"],
            vec!["tidyctl", "tidy-close", "--app", "demo"],
            vec!["tidyctl", "clean", "--app", "demo", "--strict", "3", "4"],
            vec!["tidyctl", "rename-plan", "--app", "demo", "--max-candidates", "50"],
            vec!["tidyctl", "rename-apply", "--app", "demo", "--dry-run", "--strict"],
            vec!["tidyctl", "rename-audit", "--app", "demo"],
        ] {
            Cli::try_parse_from(argv.iter().copied()).unwrap_or_else(|e| panic!("{argv:?}: {e}"));
        }
    }

    #[test]
    fn n_and_all_conflict() {
        assert!(
            Cli::try_parse_from(["tidyctl", "tidy-loop", "--app", "d", "--n", "2", "--all"])
                .is_err()
        );
    }

    #[test]
    fn cmake_args_split_shell_style() {
        assert_eq!(
            split_cmake_args(Some("-DX=1 \"-DY=a b\"")).unwrap(),
            vec!["-DX=1".to_string(), "-DY=a b".to_string()]
        );
        assert!(split_cmake_args(Some("\"unbalanced")).is_err());
        assert!(split_cmake_args(None).unwrap().is_empty());
    }
}
