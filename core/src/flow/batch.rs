//! `tidy-batch` and `tidy-close`: composites over verify, clean, and
//! refresh. `tidy-batch` checkpoints each stage in `batch_state.json` so an
//! interrupted run resumes after the last one that finished.

use std::time::{Duration, Instant};

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;
use crate::paths::normalize_batch_name;
use crate::state::{BatchState, BatchStatePatch};

use super::clean::{CleanOptions, clean};
use super::{EXIT_TIMEOUT, FlowCollaborators, list_tasks};

/// Stage order; the checkpoint records the last completed one.
const BATCH_STAGES: &[&str] = &["verify", "clean", "refresh", "finalize"];

#[derive(Debug, Clone, Default)]
pub struct BatchRunOptions {
    /// Accepts `3`, `003`, or `batch_003`.
    pub batch_id: String,
    pub strict_clean: bool,
    pub run_verify: bool,
    /// Wall-clock budget; exceeded between stages returns 124.
    pub timeout: Option<Duration>,
}

pub async fn run_tidy_batch(
    config: &TidyConfig,
    app: &AppContext,
    collab: &mut dyn FlowCollaborators,
    opts: &BatchRunOptions,
) -> Result<i32> {
    let started = Instant::now();
    let state_path = app.layout.batch_state();
    let batch = normalize_batch_name(&opts.batch_id);

    let resume_after = BatchState::load(&state_path)
        .tidy_batch_checkpoint
        .and_then(|stage| BATCH_STAGES.iter().position(|s| *s == stage))
        .map(|index| index + 1)
        .unwrap_or(0);
    if resume_after > 0 {
        tracing::info!(
            stage = BATCH_STAGES[resume_after - 1],
            "resuming tidy-batch after checkpoint"
        );
    }

    for (index, stage) in BATCH_STAGES.iter().enumerate() {
        if index < resume_after {
            continue;
        }
        if let Some(timeout) = opts.timeout {
            if started.elapsed() >= timeout {
                tracing::warn!(stage, "tidy-batch timed out");
                return Ok(EXIT_TIMEOUT);
            }
        }

        match *stage {
            "verify" => {
                if opts.run_verify {
                    let green = collab.verify().await?;
                    BatchState::update_state(
                        &state_path,
                        BatchStatePatch {
                            app: Some(app.name.clone()),
                            last_verify_success: Some(green),
                            ..Default::default()
                        },
                    )?;
                    if !green {
                        fail(&state_path)?;
                        return Ok(1);
                    }
                }
            }
            "clean" => {
                clean(
                    config,
                    app,
                    &CleanOptions {
                        strict: opts.strict_clean,
                        batch_id: Some(batch.clone()),
                        task_ids: Vec::new(),
                    },
                )?;
            }
            "refresh" => {
                let code = collab.refresh(Some(&batch), false).await?;
                BatchState::update_state(
                    &state_path,
                    BatchStatePatch {
                        last_refresh_ok: Some(code == 0),
                        ..Default::default()
                    },
                )?;
                if code != 0 {
                    fail(&state_path)?;
                    return Ok(code);
                }
            }
            _ => {
                // finalize: mark success and clear the checkpoint trail.
                BatchState::update_state(
                    &state_path,
                    BatchStatePatch {
                        batch_id: Some(batch.clone()),
                        last_tidy_batch_ok: Some(true),
                        tidy_batch_checkpoint: Some(None),
                        ..Default::default()
                    },
                )?;
                continue;
            }
        }

        BatchState::update_state(
            &state_path,
            BatchStatePatch {
                tidy_batch_checkpoint: Some(Some((*stage).to_string())),
                ..Default::default()
            },
        )?;
    }

    Ok(0)
}

fn fail(state_path: &std::path::Path) -> Result<()> {
    BatchState::update_state(
        state_path,
        BatchStatePatch {
            last_tidy_batch_ok: Some(false),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// `tidy-close`: a final-full refresh, a final verify, and the assertion
/// that no tasks remain.
pub async fn run_tidy_close(
    config: &TidyConfig,
    app: &AppContext,
    collab: &mut dyn FlowCollaborators,
) -> Result<i32> {
    let refresh_code = collab.refresh(None, true).await?;
    if refresh_code != 0 {
        return Ok(refresh_code);
    }
    if !collab.verify().await? {
        return Ok(1);
    }
    let remaining = list_tasks(&app.layout.tasks_dir(), &config.naming_check);
    if remaining.is_empty() {
        tracing::info!("tidy-close: no tasks remain");
        Ok(0)
    } else {
        tracing::error!(
            remaining = remaining.len(),
            first = remaining[0].id,
            "tidy-close: tasks remain"
        );
        Ok(1)
    }
}
