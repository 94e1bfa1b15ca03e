//! Tidy invoker: make sure the tidy build dir is configured, drive the full
//! clang-tidy build through the native build system, record timings, and
//! hand the log to the partitioner.

use std::path::Path;
use std::time::Instant;

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;
use crate::ninja_log::{TidyStepStats, parse_ninja_log};
use crate::process::{RunSpec, kill_tree, run_streamed};
use crate::tasks::{PartitionOptions, PartitionStats, partition_build_log};

pub const TIDY_TARGET: &str = "tidy";
pub const TIDY_ALL_TARGET: &str = "tidy_all";
pub const TIDY_FIX_TARGET: &str = "tidy_fix";

/// CMake cache variable recording the header-filter the dir was configured
/// with; a mismatch means the cache is stale and configure must rerun.
const HEADER_FILTER_CACHE_VAR: &str = "TIDY_HEADER_FILTER";

#[derive(Debug, Clone, Default)]
pub struct TidyRunOptions {
    pub jobs: Option<u32>,
    pub keep_going: bool,
    /// Build target; defaults to [`TIDY_TARGET`].
    pub target: Option<String>,
    pub cmake_args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TidyTimings {
    pub configure_secs: f64,
    pub build_secs: f64,
    pub parse_secs: f64,
    pub total_secs: f64,
}

#[derive(Debug, Clone)]
pub struct TidyOutcome {
    pub exit_code: i32,
    pub timings: TidyTimings,
    pub step_stats: Option<TidyStepStats>,
    pub partition: Option<PartitionStats>,
}

pub struct TidyInvoker<'a> {
    config: &'a TidyConfig,
    app: &'a AppContext,
}

impl<'a> TidyInvoker<'a> {
    pub fn new(config: &'a TidyConfig, app: &'a AppContext) -> Self {
        Self { config, app }
    }

    /// True when the CMake cache exists and records the expected
    /// header-filter regex.
    pub fn is_configured(&self) -> bool {
        let cache = self.app.layout.cmake_cache();
        let Ok(text) = std::fs::read_to_string(&cache) else {
            return false;
        };
        text.lines().any(|line| {
            line.strip_prefix(HEADER_FILTER_CACHE_VAR)
                .and_then(|rest| rest.split_once('='))
                .is_some_and(|(_, value)| value == self.config.header_filter)
        })
    }

    /// Run the configure collaborator for the tidy build dir.
    pub async fn configure(&self, tidy: bool, cmake_args: &[String]) -> Result<i32> {
        match self.config.resolve_tool(&self.config.cmake_bin) {
            Some(resolved) => tracing::debug!(cmake = %resolved.display(), "resolved build tool"),
            None => tracing::warn!(tool = %self.config.cmake_bin, "build tool not found on PATH"),
        }
        if self.config.kill_build_procs {
            kill_tree(&self.config.build_proc_names).await;
        }

        let mut argv = vec![
            self.config.cmake_bin.clone(),
            "-S".to_string(),
            self.app.app_dir.display().to_string(),
            "-B".to_string(),
            self.app.layout.build_dir().display().to_string(),
            "-G".to_string(),
            "Ninja".to_string(),
            "-DCMAKE_EXPORT_COMPILE_COMMANDS=ON".to_string(),
            format!(
                "-D{HEADER_FILTER_CACHE_VAR}:STRING={}",
                self.config.header_filter
            ),
        ];
        if tidy {
            argv.push("-DTIDY_ENABLED=ON".to_string());
        }
        argv.extend(cmake_args.iter().cloned());

        let mut spec = RunSpec::new(argv);
        spec.env = self.config.toolchain_env();
        let outcome = run_streamed(&spec).await?;
        Ok(outcome.exit_code)
    }

    /// Configure only when the cache is missing or stale. Returns the
    /// configure exit code (0 when nothing ran).
    pub async fn ensure_configured(&self, tidy: bool, cmake_args: &[String]) -> Result<i32> {
        if self.is_configured() {
            return Ok(0);
        }
        tracing::info!(
            build_dir = %self.app.layout.build_dir().display(),
            "tidy build dir missing or stale, configuring"
        );
        self.configure(tidy, cmake_args).await
    }

    /// Run one build, streaming to `log_path` when given.
    pub async fn build(
        &self,
        target: Option<&str>,
        jobs: Option<u32>,
        keep_going: bool,
        log_path: Option<&Path>,
    ) -> Result<i32> {
        let mut argv = vec![
            self.config.cmake_bin.clone(),
            "--build".to_string(),
            self.app.layout.build_dir().display().to_string(),
        ];
        if let Some(target) = target {
            argv.push("--target".to_string());
            argv.push(target.to_string());
        }
        if let Some(jobs) = jobs {
            argv.push("--parallel".to_string());
            argv.push(jobs.to_string());
        }
        if keep_going {
            // `-k 0` tells ninja to continue past per-file tidy failures.
            argv.push("--".to_string());
            argv.push("-k".to_string());
            argv.push("0".to_string());
        }

        let mut spec = RunSpec::new(argv);
        spec.env = self.config.toolchain_env();
        spec.log_path = log_path.map(Path::to_path_buf);
        let outcome = run_streamed(&spec).await?;
        Ok(outcome.exit_code)
    }

    /// The full tidy pass: configure if needed, build the tidy target into
    /// `build.log`, read `.ninja_log` timings, then partition. A failed
    /// build still gets its log partitioned so partial progress lands in
    /// task files.
    pub async fn run_full_tidy(&self, opts: &TidyRunOptions) -> Result<TidyOutcome> {
        let started = Instant::now();

        let configure_started = Instant::now();
        let configure_code = self.ensure_configured(true, &opts.cmake_args).await?;
        let configure_secs = configure_started.elapsed().as_secs_f64();
        if configure_code != 0 {
            return Ok(TidyOutcome {
                exit_code: configure_code,
                timings: TidyTimings {
                    configure_secs,
                    total_secs: started.elapsed().as_secs_f64(),
                    ..Default::default()
                },
                step_stats: None,
                partition: None,
            });
        }

        let build_log = self.app.layout.build_log();
        // Fresh pass, fresh log: the runner appends.
        let _ = std::fs::remove_file(&build_log);

        let build_started = Instant::now();
        let target = opts.target.as_deref().unwrap_or(TIDY_TARGET);
        let build_code = self
            .build(Some(target), opts.jobs, opts.keep_going, Some(&build_log))
            .await?;
        let build_secs = build_started.elapsed().as_secs_f64();

        let step_stats = parse_ninja_log(&self.app.layout.ninja_log());

        let parse_started = Instant::now();
        let partition = if build_log.is_file() {
            Some(
                partition_build_log(
                    &build_log,
                    &self.app.layout.tasks_dir(),
                    &self.partition_options(),
                )
                .await?,
            )
        } else {
            None
        };
        let parse_secs = parse_started.elapsed().as_secs_f64();

        Ok(TidyOutcome {
            exit_code: build_code,
            timings: TidyTimings {
                configure_secs,
                build_secs,
                parse_secs,
                total_secs: started.elapsed().as_secs_f64(),
            },
            step_stats,
            partition,
        })
    }

    /// The clang-tidy-fix target, optionally bounded to a step limit.
    pub async fn run_tidy_fix(
        &self,
        limit: Option<u32>,
        jobs: Option<u32>,
        keep_going: bool,
    ) -> Result<i32> {
        self.ensure_configured(true, &[]).await?;
        let target = match limit {
            Some(limit) => format!("{TIDY_FIX_TARGET}_step_{limit}"),
            None => TIDY_FIX_TARGET.to_string(),
        };
        self.build(Some(&target), jobs, keep_going, None).await
    }

    pub fn partition_options(&self) -> PartitionOptions {
        PartitionOptions {
            max_lines: self.config.max_lines,
            max_diags: self.config.max_diags,
            batch_size: self.config.batch_size,
            parse_workers: self.config.parse_workers,
            base_dir: self.app.app_dir.clone(),
        }
    }
}
