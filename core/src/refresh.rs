//! Incremental tidy refresh after a batch closes, and the cadence that
//! escalates to a full pass.
//!
//! Given a just-archived batch, the engine collects the files it touched,
//! maps them to compile units through `compile_commands.json`, runs
//! clang-tidy over the result in bounded chunks, and decides whether a full
//! tidy pass is due: explicit flags, cadence, anomalies in the incremental
//! logs, or a high already-renamed ratio in the latest apply report.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::compile_db::CompileDb;
use crate::config::{AppContext, TidyConfig};
use crate::error::{OrchestratorError, Result};
use crate::pathkey;
use crate::paths::normalize_batch_name;
use crate::process::{RunSpec, run_streamed};
use crate::rename::ApplyReport;
use crate::state::{self, RefreshState};

pub const REASON_FORCE_FULL: &str = "force_full";
pub const REASON_FINAL_FULL: &str = "final_full";
pub const REASON_AUTO_NO_SUCH_FILE: &str = "auto_no_such_file";
pub const REASON_AUTO_GLOB_MISMATCH: &str = "auto_glob_mismatch";
pub const REASON_AUTO_HIGH_ALREADY_RENAMED: &str = "auto_high_already_renamed";

const TOKEN_NO_SUCH_FILE: &str = "no such file or directory";
const TOKEN_GLOB_MISMATCH: &str = "glob mismatch";

#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    /// Accepts `3`, `003`, or `batch_003`.
    pub batch_id: Option<String>,
    pub full_every: Option<u32>,
    pub neighbor_scope: Option<String>,
    pub force_full: bool,
    pub final_full: bool,
    pub dry_run: bool,
    pub keep_going: bool,
}

/// What one refresh run selected and decided. `render_plan` turns this into
/// the dry-run output.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub batch: String,
    pub touched_files: Vec<PathBuf>,
    pub resolved_units: Vec<PathBuf>,
    pub unresolved_files: usize,
    pub neighbor_scope: String,
    pub already_counted: bool,
    pub batches_since_full: u32,
    pub full_reasons: Vec<String>,
    pub incremental_exit: i32,
    pub full_exit: Option<i32>,
    pub dry_run: bool,
}

impl RefreshReport {
    pub fn render_plan(&self) -> String {
        let mut out = format!("refresh plan for {}\n", self.batch);
        out.push_str(&format!(
            "  touched files: {} ({} unresolved)\n",
            self.touched_files.len(),
            self.unresolved_files
        ));
        for file in &self.touched_files {
            out.push_str(&format!("    {}\n", file.display()));
        }
        out.push_str(&format!(
            "  compile units ({}, neighbor scope {}):\n",
            self.resolved_units.len(),
            self.neighbor_scope
        ));
        for unit in &self.resolved_units {
            out.push_str(&format!("    {}\n", unit.display()));
        }
        out.push_str(&format!(
            "  batches since full: {}{}\n",
            self.batches_since_full,
            if self.already_counted {
                " (batch already counted)"
            } else {
                ""
            }
        ));
        if self.full_reasons.is_empty() {
            out.push_str("  full pass: not due\n");
        } else {
            out.push_str(&format!("  full pass due: {}\n", self.full_reasons.join(", ")));
        }
        out
    }
}

/// The subprocess seam, so cadence and selection are testable without a
/// toolchain. The real implementation is [`ProcessRefreshRunner`].
#[async_trait]
pub trait RefreshRunner: Send {
    /// `clang-tidy -p <build_dir> <files...>`, streamed into `log_path`.
    async fn run_incremental(&mut self, files: &[PathBuf], log_path: &Path) -> Result<i32>;
    /// One full tidy pass (configure-if-stale + build + partition).
    async fn run_full(&mut self) -> Result<i32>;
    /// The configure collaborator, invoked once when
    /// `compile_commands.json` is missing.
    async fn configure(&mut self) -> Result<i32>;
}

pub struct ProcessRefreshRunner<'a> {
    config: &'a TidyConfig,
    app: &'a AppContext,
}

impl<'a> ProcessRefreshRunner<'a> {
    pub fn new(config: &'a TidyConfig, app: &'a AppContext) -> Self {
        Self { config, app }
    }
}

#[async_trait]
impl RefreshRunner for ProcessRefreshRunner<'_> {
    async fn run_incremental(&mut self, files: &[PathBuf], log_path: &Path) -> Result<i32> {
        let mut argv = vec![
            self.config.clang_tidy_bin.clone(),
            "-p".to_string(),
            self.app.layout.build_dir().display().to_string(),
        ];
        argv.extend(files.iter().map(|f| f.display().to_string()));
        let mut spec = RunSpec::new(argv);
        spec.env = self.config.toolchain_env();
        spec.log_path = Some(log_path.to_path_buf());
        Ok(run_streamed(&spec).await?.exit_code)
    }

    async fn run_full(&mut self) -> Result<i32> {
        let invoker = crate::invoker::TidyInvoker::new(self.config, self.app);
        let outcome = invoker
            .run_full_tidy(&crate::invoker::TidyRunOptions {
                keep_going: true,
                ..Default::default()
            })
            .await?;
        Ok(outcome.exit_code)
    }

    async fn configure(&mut self) -> Result<i32> {
        let invoker = crate::invoker::TidyInvoker::new(self.config, self.app);
        invoker.configure(true, &[]).await
    }
}

/// Run one refresh. Returns `(exit_code, report)`; the exit code is the full
/// pass's when one ran, else the worst incremental chunk's.
pub async fn run_refresh(
    config: &TidyConfig,
    app: &AppContext,
    runner: &mut dyn RefreshRunner,
    opts: &RefreshOptions,
) -> Result<(i32, RefreshReport)> {
    let state_path = app.layout.refresh_state();
    let mut refresh_state = RefreshState::load(&state_path);
    refresh_state.full_every = opts.full_every.unwrap_or(config.full_every);

    let batch = match &opts.batch_id {
        Some(raw) => normalize_batch_name(raw),
        None => refresh_state
            .last_batch
            .clone()
            .unwrap_or_else(|| "batch_000".to_string()),
    };
    let neighbor_scope = opts
        .neighbor_scope
        .clone()
        .unwrap_or_else(|| config.neighbor_scope.clone());

    let mut report = RefreshReport {
        batch: batch.clone(),
        neighbor_scope: neighbor_scope.clone(),
        dry_run: opts.dry_run,
        ..Default::default()
    };

    // 1. Touched files from the archived batch.
    let batch_dir = app.layout.tasks_done_dir().join(&batch);
    if !batch_dir.is_dir() && !opts.force_full && !opts.final_full {
        return Err(OrchestratorError::BatchNotFound(batch));
    }
    report.touched_files = collect_touched_files(&batch_dir, &app.app_dir);

    // 2-3. Compile-unit selection.
    if !report.touched_files.is_empty() {
        let db = load_compile_db(app, runner).await?;
        let (units, unresolved) = select_units(&db, &report.touched_files, &neighbor_scope);
        report.resolved_units = units;
        report.unresolved_files = unresolved;
    }

    // 4. Cadence registration, then the incremental chunks.
    report.already_counted = refresh_state.register_batch(&batch);
    report.batches_since_full = refresh_state.batches_since_full;

    let mut reasons: Vec<String> = Vec::new();
    if opts.force_full {
        reasons.push(REASON_FORCE_FULL.to_string());
    }
    if opts.final_full {
        reasons.push(REASON_FINAL_FULL.to_string());
    }
    if refresh_state.cadence_due() {
        reasons.push(format!("cadence_{}", refresh_state.batches_since_full));
    }
    if already_renamed_trigger(config, app, &refresh_state) {
        reasons.push(REASON_AUTO_HIGH_ALREADY_RENAMED.to_string());
    }

    if opts.dry_run {
        report.full_reasons = reasons;
        return Ok((0, report));
    }

    let chunk_size = config.refresh_chunk_size.max(1);
    let refresh_dir = app.layout.refresh_dir(&batch);
    let mut worst_exit = 0;
    let mut chunk_logs: Vec<PathBuf> = Vec::new();
    for (index, chunk) in report.resolved_units.chunks(chunk_size).enumerate() {
        let log_path = refresh_dir.join(format!("incremental_tidy_{:03}.log", index + 1));
        let code = runner.run_incremental(chunk, &log_path).await?;
        chunk_logs.push(log_path);
        if code != 0 {
            worst_exit = code;
            if !opts.keep_going {
                break;
            }
        }
    }
    report.incremental_exit = worst_exit;

    if worst_exit != 0 {
        reasons.extend(scan_chunk_anomalies(config, &chunk_logs));
    }
    report.full_reasons = reasons;

    // 5-6. Full pass when any reason fired.
    if !report.full_reasons.is_empty() {
        tracing::info!(reasons = ?report.full_reasons, "full tidy pass due");
        let full_code = runner.run_full().await?;
        report.full_exit = Some(full_code);
        refresh_state.mark_full(&batch, &report.full_reasons.join(","));
    }

    // 7. Persist, remembering the artifact mtimes we have now seen.
    refresh_state.last_seen_build_log_mtime_ns = state::mtime_ns(&app.layout.build_log());
    refresh_state.last_seen_rename_report_mtime_ns =
        state::mtime_ns(&app.layout.rename_apply_report_json());
    refresh_state.save(&state_path)?;

    let exit = report.full_exit.unwrap_or(report.incremental_exit);
    Ok((exit, report))
}

/// Source files a batch referenced: the leading `File:` header of each task
/// log plus the diagnostics' own file fields, deduplicated.
fn collect_touched_files(batch_dir: &Path, app_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut push = |path: PathBuf| {
        if seen.insert(pathkey::path_key(&path)) {
            files.push(path);
        }
    };

    let mut task_logs: Vec<PathBuf> = walkdir::WalkDir::new(batch_dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("task_") && name.ends_with(".log")
        })
        .map(|entry| entry.into_path())
        .collect();
    task_logs.sort();

    for task_log in task_logs {
        let Ok(content) = std::fs::read_to_string(&task_log) else {
            continue;
        };
        if let Some(header) = content
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("File: "))
        {
            push(pathkey::absolutize(Path::new(header.trim()), app_dir));
        }
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        for diag in crate::diagnostics::parse_diagnostics(&lines) {
            push(pathkey::absolutize(Path::new(&diag.file), app_dir));
        }
    }
    files
}

async fn load_compile_db(app: &AppContext, runner: &mut dyn RefreshRunner) -> Result<CompileDb> {
    let path = app.layout.compile_commands();
    match CompileDb::load(&path, &app.app_dir) {
        Ok(db) => Ok(db),
        Err(OrchestratorError::MissingCompileCommands(_)) => {
            tracing::warn!(path = %path.display(), "compile_commands.json missing, configuring once");
            runner.configure().await?;
            CompileDb::load(&path, &app.app_dir)
        }
        Err(other) => Err(other),
    }
}

/// Touched files -> compile units, plus the neighbor-scope expansion.
fn select_units(
    db: &CompileDb,
    touched: &[PathBuf],
    neighbor_scope: &str,
) -> (Vec<PathBuf>, usize) {
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut units: Vec<PathBuf> = Vec::new();
    let mut unresolved = 0usize;
    let mut add = |unit: &Path, units: &mut Vec<PathBuf>| {
        if seen.insert(pathkey::path_key(unit)) {
            units.push(unit.to_path_buf());
        }
    };

    for file in touched {
        let hits = db.resolve(file);
        if hits.is_empty() {
            unresolved += 1;
            continue;
        }
        for hit in hits {
            add(hit, &mut units);
        }
    }

    match neighbor_scope {
        "dir" => {
            let anchors: Vec<PathBuf> = touched.iter().cloned().chain(units.clone()).collect();
            for anchor in anchors {
                for neighbor in db.dir_neighbors(&anchor) {
                    add(neighbor, &mut units);
                }
            }
        }
        "module" => {
            let anchors: Vec<PathBuf> = touched.iter().cloned().chain(units.clone()).collect();
            for anchor in anchors {
                for neighbor in db.module_neighbors(&anchor) {
                    add(neighbor, &mut units);
                }
            }
        }
        _ => {}
    }

    units.sort_by_key(|unit| pathkey::path_key(unit));
    (units, unresolved)
}

/// Case-insensitive token scan over the chunk logs.
fn scan_chunk_anomalies(config: &TidyConfig, chunk_logs: &[PathBuf]) -> Vec<String> {
    let mut reasons = Vec::new();
    let mut saw_no_such_file = false;
    let mut saw_glob_mismatch = false;
    for log in chunk_logs {
        let Ok(text) = std::fs::read_to_string(log) else {
            continue;
        };
        let lower = text.to_lowercase();
        saw_no_such_file |= lower.contains(TOKEN_NO_SUCH_FILE);
        saw_glob_mismatch |= lower.contains(TOKEN_GLOB_MISMATCH);
    }
    if saw_no_such_file && config.auto_full_on_no_such_file {
        reasons.push(REASON_AUTO_NO_SUCH_FILE.to_string());
    }
    if saw_glob_mismatch && config.auto_full_on_glob_mismatch {
        reasons.push(REASON_AUTO_GLOB_MISMATCH.to_string());
    }
    reasons
}

/// True when the latest apply report is new since the last refresh and its
/// already-renamed ratio clears both thresholds.
fn already_renamed_trigger(config: &TidyConfig, app: &AppContext, state: &RefreshState) -> bool {
    let mtime = state::mtime_ns(&app.layout.rename_apply_report_json());
    if mtime.is_none() || mtime == state.last_seen_rename_report_mtime_ns {
        return false;
    }
    high_already_renamed(config, app)
}

/// The ratio check alone, on whatever apply report is on disk.
pub fn high_already_renamed(config: &TidyConfig, app: &AppContext) -> bool {
    let path = app.layout.rename_apply_report_json();
    let Ok(text) = std::fs::read_to_string(&path) else {
        return false;
    };
    let Ok(report) = serde_json::from_str::<ApplyReport>(&text) else {
        return false;
    };
    let total = report.results.len();
    if total == 0 {
        return false;
    }
    let already = report
        .results
        .iter()
        .filter(|r| r.reason.as_deref() == Some(crate::rename::REASON_ALREADY_RENAMED))
        .count();
    let ratio = already as f64 / total as f64;
    already >= config.already_renamed_min && ratio >= config.already_renamed_ratio
}
