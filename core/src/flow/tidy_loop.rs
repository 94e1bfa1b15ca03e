//! `tidy-loop`: consume tasks in ascending id order, renaming what the
//! pipeline can handle, archiving what is done, and stopping cold on the
//! first task that needs a human.

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;

use super::clean::archive_entries;
use super::{EXIT_BLOCKED, FlowCollaborators, TaskClass, list_tasks};

#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Max tasks to process; ignored when `all` is set.
    pub n: Option<usize>,
    pub all: bool,
    /// Verify after every this many archived tasks. 0 is treated as 1.
    pub test_every: usize,
    /// Suppress per-task progress events.
    pub concise: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoopOutcome {
    pub exit_code: i32,
    pub archived_task_ids: Vec<usize>,
    pub blocked_task_id: Option<usize>,
    /// Ids still sitting in `tasks/` when the loop ended.
    pub pending_task_ids: Vec<usize>,
    /// Exit of the rename pipeline, when it ran.
    pub rename_exit: Option<i32>,
}

pub async fn run_tidy_loop(
    config: &TidyConfig,
    app: &AppContext,
    collab: &mut dyn FlowCollaborators,
    opts: &LoopOptions,
) -> Result<LoopOutcome> {
    let tasks = list_tasks(&app.layout.tasks_dir(), &config.naming_check);
    let budget = if opts.all {
        tasks.len()
    } else {
        opts.n.unwrap_or(1)
    };
    let test_every = opts.test_every.max(1);

    let mut outcome = LoopOutcome::default();
    let mut ran_rename = false;
    let mut since_verify = 0usize;

    for task in tasks.iter().take(budget) {
        if !opts.concise {
            tracing::info!(id = task.id, class = ?task.class, "processing task");
        }
        match task.class {
            TaskClass::Manual => {
                tracing::warn!(id = task.id, "manual task, stopping loop");
                outcome.blocked_task_id = Some(task.id);
                outcome.exit_code = EXIT_BLOCKED;
                break;
            }
            TaskClass::RenameOnly => {
                if !ran_rename {
                    let code = collab.rename_pipeline().await?;
                    outcome.rename_exit = Some(code);
                    ran_rename = true;
                    if code != 0 {
                        outcome.exit_code = code;
                        break;
                    }
                }
            }
            TaskClass::Empty => {}
        }

        archive_entries(app, std::slice::from_ref(task))?;
        outcome.archived_task_ids.push(task.id);
        since_verify += 1;

        if since_verify == test_every {
            since_verify = 0;
            if !collab.verify().await? {
                outcome.exit_code = 1;
                break;
            }
        }
    }

    // A trailing partial group still gets verified.
    if outcome.exit_code == 0 && since_verify > 0 && !collab.verify().await? {
        outcome.exit_code = 1;
    }

    outcome.pending_task_ids = tasks
        .iter()
        .map(|task| task.id)
        .filter(|id| !outcome.archived_task_ids.contains(id))
        .collect();

    tracing::info!(
        archived = outcome.archived_task_ids.len(),
        pending = outcome.pending_task_ids.len(),
        exit = outcome.exit_code,
        "tidy-loop finished"
    );
    Ok(outcome)
}
