//! `clean`: archive task logs from `tasks/` into `tasks_done/`, preserving
//! relative paths, and drop batch directories that end up empty.

use crate::config::{AppContext, TidyConfig};
use crate::error::{OrchestratorError, Result};
use crate::paths::normalize_batch_name;
use crate::state::{BatchState, BatchStatePatch};
use crate::tasks::remove_empty_batch_dirs;
use crate::verify;

use super::{TaskEntry, list_tasks};

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Refuse to archive unless the latest verify result is green.
    pub strict: bool,
    /// Restrict to one batch; accepts `3`, `003`, or `batch_003`.
    pub batch_id: Option<String>,
    /// Restrict to explicit task ids. Wins over `batch_id`.
    pub task_ids: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    pub archived_task_ids: Vec<usize>,
}

pub fn clean(config: &TidyConfig, app: &AppContext, opts: &CleanOptions) -> Result<CleanOutcome> {
    if opts.strict {
        let green = verify::last_verify(app).is_some_and(|outcome| outcome.success);
        if !green {
            return Err(OrchestratorError::Other(
                "strict clean refused: latest verify result is missing or failed".to_string(),
            ));
        }
    }

    let tasks = list_tasks(&app.layout.tasks_dir(), &config.naming_check);
    let selected: Vec<TaskEntry> = if !opts.task_ids.is_empty() {
        tasks
            .into_iter()
            .filter(|task| opts.task_ids.contains(&task.id))
            .collect()
    } else if let Some(raw) = &opts.batch_id {
        let batch = normalize_batch_name(raw);
        tasks
            .into_iter()
            .filter(|task| task.rel.starts_with(&batch))
            .collect()
    } else {
        tasks
    };

    let archived_task_ids = archive_entries(app, &selected)?;
    if let Some(raw) = &opts.batch_id {
        BatchState::update_state(
            &app.layout.batch_state(),
            BatchStatePatch {
                batch_id: Some(normalize_batch_name(raw)),
                ..Default::default()
            },
        )?;
    }
    tracing::info!(archived = archived_task_ids.len(), "clean finished");
    Ok(CleanOutcome { archived_task_ids })
}

/// Move the given tasks into `tasks_done/` and record them in batch state.
/// Tasks are processed in input order.
pub(crate) fn archive_entries(app: &AppContext, entries: &[TaskEntry]) -> Result<Vec<usize>> {
    let done_dir = app.layout.tasks_done_dir();
    let mut archived: Vec<usize> = Vec::new();

    for entry in entries {
        let dest = done_dir.join(&entry.rel);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                OrchestratorError::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }
        std::fs::rename(&entry.path, &dest).map_err(|source| OrchestratorError::FileWrite {
            path: dest.clone(),
            source,
        })?;
        archived.push(entry.id);
    }

    remove_empty_batch_dirs(&app.layout.tasks_dir());

    if !archived.is_empty() {
        BatchState::update_state(
            &app.layout.batch_state(),
            BatchStatePatch {
                app: Some(app.name.clone()),
                cleaned_task_ids: Some(archived.clone()),
                last_clean_ok: Some(true),
                ..Default::default()
            },
        )?;
    }
    Ok(archived)
}
