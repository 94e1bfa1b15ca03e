//! Greedy partitioning of a build log into prioritized, size-bounded task
//! files grouped into batches.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use walkdir::WalkDir;

use super::score::task_score;
use super::{Task, TaskDraft};
use crate::diagnostics::{Diagnostic, NinjaSection, parse_diagnostics, split_sections};
use crate::error::{OrchestratorError, Result};
use crate::pathkey;
use crate::paths::{batch_dir_name, task_file_name};

#[derive(Debug, Clone)]
pub struct PartitionOptions {
    /// Per-task cap on raw diagnostic lines.
    pub max_lines: usize,
    /// Per-task cap on diagnostic count.
    pub max_diags: usize,
    /// Tasks per batch directory.
    pub batch_size: usize,
    /// Section-parse worker count; 0 means `min(8, CPU count)`.
    pub parse_workers: usize,
    /// Base for absolutizing relative diagnostic paths.
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub tasks: usize,
    pub batches: usize,
    pub files: usize,
    pub diagnostics: usize,
}

/// Partition `build.log` into `tasks/batch_NNN/task_MMM.log` files.
pub async fn partition_build_log(
    log_path: &Path,
    tasks_dir: &Path,
    opts: &PartitionOptions,
) -> Result<PartitionStats> {
    let bytes = std::fs::read(log_path).map_err(|source| OrchestratorError::FileRead {
        path: log_path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    partition_lines(lines, tasks_dir, opts).await
}

/// Partition already-read log lines. Section extraction fans out over a
/// bounded set of blocking workers; everything else stays on the caller.
pub async fn partition_lines(
    lines: Vec<String>,
    tasks_dir: &Path,
    opts: &PartitionOptions,
) -> Result<PartitionStats> {
    validate(opts)?;

    let sections = split_sections(&lines);
    let drafts = parse_sections(sections, opts).await;

    let tasks = assemble_tasks(drafts, opts);
    if tasks.is_empty() {
        purge_existing_tasks(tasks_dir)?;
        super::write_tasks_summary(tasks_dir, &tasks)?;
        return Ok(PartitionStats::default());
    }

    purge_existing_tasks(tasks_dir)?;

    let mut files: BTreeSet<String> = BTreeSet::new();
    let mut diagnostics = 0usize;
    let mut last_batch = 0usize;
    for task in &tasks {
        files.insert(pathkey::path_key(&task.file));
        diagnostics += task.diagnostics.len();

        let batch = task.id.div_ceil(opts.batch_size);
        last_batch = batch;
        let batch_dir = tasks_dir.join(batch_dir_name(batch));
        std::fs::create_dir_all(&batch_dir).map_err(|source| {
            OrchestratorError::DirectoryCreate {
                path: batch_dir.clone(),
                source,
            }
        })?;
        let path = batch_dir.join(task_file_name(task.id));
        std::fs::write(&path, &task.content).map_err(|source| OrchestratorError::FileWrite {
            path: path.clone(),
            source,
        })?;
    }

    super::write_tasks_summary(tasks_dir, &tasks)?;

    let stats = PartitionStats {
        tasks: tasks.len(),
        batches: last_batch,
        files: files.len(),
        diagnostics,
    };
    tracing::info!(
        tasks = stats.tasks,
        batches = stats.batches,
        files = stats.files,
        diagnostics = stats.diagnostics,
        "partitioned build log"
    );
    Ok(stats)
}

fn validate(opts: &PartitionOptions) -> Result<()> {
    if opts.max_lines == 0 || opts.max_diags == 0 || opts.batch_size == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "max_lines, max_diags and batch_size must all be >= 1".to_string(),
        ));
    }
    Ok(())
}

async fn parse_sections(sections: Vec<NinjaSection>, opts: &PartitionOptions) -> Vec<Vec<Diagnostic>> {
    let workers = if opts.parse_workers > 0 {
        opts.parse_workers
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(8)
    };

    if sections.len() <= 1 || workers <= 1 {
        return sections
            .iter()
            .map(|section| parse_diagnostics(&section.lines))
            .collect();
    }

    // Contiguous chunks keep section order reconstructible by chunk index.
    let chunk_len = sections.len().div_ceil(workers);
    let chunks: Vec<(usize, Vec<NinjaSection>)> = sections
        .chunks(chunk_len)
        .map(|chunk| chunk.to_vec())
        .enumerate()
        .collect();

    let mut join_set = JoinSet::new();
    for (index, chunk) in chunks {
        join_set.spawn_blocking(move || {
            let parsed: Vec<Vec<Diagnostic>> = chunk
                .iter()
                .map(|section| parse_diagnostics(&section.lines))
                .collect();
            (index, parsed)
        });
    }

    let mut by_chunk: Vec<(usize, Vec<Vec<Diagnostic>>)> = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(entry) => by_chunk.push(entry),
            Err(e) => tracing::warn!("section parse worker failed: {e}"),
        }
    }
    by_chunk.sort_by_key(|(index, _)| *index);
    by_chunk.into_iter().flat_map(|(_, parsed)| parsed).collect()
}

/// Greedy packing + scoring + global ordering + id assignment.
fn assemble_tasks(section_diags: Vec<Vec<Diagnostic>>, opts: &PartitionOptions) -> Vec<Task> {
    let mut drafts: Vec<TaskDraft> = Vec::new();
    for diags in section_diags {
        pack_section(diags, opts, &mut drafts);
    }

    let mut scored: Vec<Task> = drafts
        .into_iter()
        .map(|draft| {
            let content = render_task_content(&draft.file, &draft.diagnostics);
            let score = task_score(
                draft.diagnostics.iter().map(|d| d.check.as_str()),
                &draft.file,
                draft.diagnostics.len(),
            );
            Task {
                id: 0,
                file: draft.file,
                score,
                size: content.chars().count(),
                diagnostics: draft.diagnostics,
                content,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then_with(|| a.size.cmp(&b.size))
    });
    for (index, task) in scored.iter_mut().enumerate() {
        task.id = index + 1;
    }
    scored
}

/// Pack one ninja section (one compilation unit) into tasks. A new task
/// starts whenever the next diagnostic would exceed either cap.
fn pack_section(diags: Vec<Diagnostic>, opts: &PartitionOptions, out: &mut Vec<TaskDraft>) {
    let mut current: Vec<Diagnostic> = Vec::new();
    let mut current_lines = 0usize;

    for diag in diags {
        let diag_lines = diag.raw_lines.len();
        let over_count = current.len() + 1 > opts.max_diags;
        let over_lines = !current.is_empty() && current_lines + diag_lines > opts.max_lines;
        if over_count || over_lines {
            flush(&mut current, &mut current_lines, opts, out);
        }
        current_lines += diag_lines;
        current.push(diag);
    }
    flush(&mut current, &mut current_lines, opts, out);
}

fn flush(
    current: &mut Vec<Diagnostic>,
    current_lines: &mut usize,
    opts: &PartitionOptions,
    out: &mut Vec<TaskDraft>,
) {
    if current.is_empty() {
        return;
    }
    let file = pathkey::absolutize(Path::new(&current[0].file), &opts.base_dir);
    out.push(TaskDraft {
        file,
        diagnostics: std::mem::take(current),
    });
    *current_lines = 0;
}

/// Render the task-log content. The format is consumed back by the loop
/// controller and the refresh engine; keep it byte-stable.
pub fn render_task_content(file: &Path, diagnostics: &[Diagnostic]) -> String {
    let mut file_counts: Vec<(String, usize)> = Vec::new();
    let mut check_counts: Vec<(String, usize)> = Vec::new();
    for diag in diagnostics {
        let name = Path::new(&diag.file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| diag.file.clone());
        bump(&mut file_counts, name);
        bump(&mut check_counts, diag.check.clone());
    }

    let mut content = String::new();
    content.push_str(&format!("File: {}\n", file.display()));
    content.push_str(&"=".repeat(60));
    content.push('\n');
    content.push_str("=== SUMMARY ===\n");
    content.push_str(&format!("Files: {}\n", join_counts(&file_counts)));
    content.push_str(&format!("Types: {}\n", join_counts(&check_counts)));
    content.push_str("===============\n");
    content.push('\n');
    for diag in diagnostics {
        for raw in &diag.raw_lines {
            content.push_str(raw);
            content.push('\n');
        }
    }
    content
}

fn bump(counts: &mut Vec<(String, usize)>, key: String) {
    match counts.iter_mut().find(|(name, _)| *name == key) {
        Some((_, count)) => *count += 1,
        None => counts.push((key, 1)),
    }
}

fn join_counts(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{name}({count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remove every pre-existing `task_*.log` under the tasks dir, then drop any
/// `batch_*` directory that ended up empty.
fn purge_existing_tasks(tasks_dir: &Path) -> Result<()> {
    if !tasks_dir.exists() {
        std::fs::create_dir_all(tasks_dir).map_err(|source| OrchestratorError::DirectoryCreate {
            path: tasks_dir.to_path_buf(),
            source,
        })?;
        return Ok(());
    }

    for entry in WalkDir::new(tasks_dir).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with("task_") && name.ends_with(".log") {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), "failed to remove stale task: {e}");
            }
        }
    }

    remove_empty_batch_dirs(tasks_dir);
    Ok(())
}

/// Depth-first removal, deepest first, so parents become removable after
/// their children.
pub fn remove_empty_batch_dirs(tasks_dir: &Path) {
    let mut dirs: Vec<PathBuf> = WalkDir::new(tasks_dir)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("batch_")
        })
        .map(|entry| entry.into_path())
        .collect();
    dirs.sort();
    for dir in dirs.into_iter().rev() {
        // Fails (harmlessly) when non-empty.
        let _ = std::fs::remove_dir(&dir);
    }
}
