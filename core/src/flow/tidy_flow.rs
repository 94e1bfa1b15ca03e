//! `tidy-flow`: the outer state machine. Five phases, each checkpointed in
//! `flow_state.json` so a `--resume` run picks up after the last green one:
//! prepare_tasks, rename, verify, loop, clean.

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;
use crate::refresh::high_already_renamed;
use crate::state::{FlowKnobs, FlowState};

use super::clean::archive_entries;
use super::tidy_loop::{LoopOptions, run_tidy_loop};
use super::{EXIT_BLOCKED, FlowCollaborators, TaskClass, TaskEntry, list_tasks};

#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    pub n: Option<usize>,
    pub all: bool,
    pub test_every: usize,
    /// Reuse the previous run's checkpoints and any existing tasks.
    pub resume: bool,
    /// Run the clang-tidy-fix pre-pass before the full tidy.
    pub with_tidy_fix: bool,
}

pub async fn run_tidy_flow(
    config: &TidyConfig,
    app: &AppContext,
    collab: &mut dyn FlowCollaborators,
    opts: &FlowOptions,
) -> Result<i32> {
    let state_path = app.layout.flow_state();
    let mut state = if opts.resume {
        FlowState::load(&state_path)
    } else {
        FlowState::default()
    };
    state.app = Some(app.name.clone());
    state.mode = "tidy-flow".to_string();
    state.status = "running".to_string();
    state.knobs = FlowKnobs {
        n: opts.n,
        all: opts.all,
        test_every: opts.test_every,
        resume: opts.resume,
        with_tidy_fix: opts.with_tidy_fix,
    };
    state.save(&state_path)?;

    // 1. prepare_tasks — regenerate tasks, unless resuming onto an existing
    // set.
    if !(opts.resume && state.phase_completed("prepare_tasks")) {
        let have_tasks = !list_tasks(&app.layout.tasks_dir(), &config.naming_check).is_empty();
        if opts.resume && have_tasks {
            state.checkpoint(&state_path, "prepare_tasks", "skipped", 0)?;
        } else {
            if opts.with_tidy_fix {
                let fix_code = collab.tidy_fix().await?;
                if fix_code != 0 {
                    tracing::warn!(code = fix_code, "tidy-fix pre-pass failed, continuing");
                }
            }
            // A red tidy build still partitions its log, so the phase
            // completes either way and the exit code is recorded.
            let code = collab.full_tidy().await?;
            state.checkpoint(&state_path, "prepare_tasks", "completed", code)?;
        }
    }

    // 2. rename.
    if !(opts.resume && state.phase_completed("rename")) {
        let code = collab.rename_pipeline().await?;
        if code == 0 && high_already_renamed(config, app) {
            tracing::info!("high already-renamed ratio, refreshing tasks with a full tidy");
            let full_code = collab.full_tidy().await?;
            if full_code != 0 {
                tracing::warn!(code = full_code, "mid-flow full tidy failed, continuing");
            }
        }
        let status = if code == 0 { "completed" } else { "failed" };
        state.checkpoint(&state_path, "rename", status, code)?;
        if code != 0 {
            return stop(&mut state, &state_path, code);
        }
    }

    // 3. verify.
    if !(opts.resume && state.phase_completed("verify")) {
        let green = collab.verify().await?;
        let status = if green { "completed" } else { "failed" };
        state.checkpoint(&state_path, "verify", status, i32::from(!green))?;
        if !green {
            return stop(&mut state, &state_path, 1);
        }
    }

    // 4. loop.
    if !(opts.resume && state.phase_completed("loop")) {
        let loop_opts = LoopOptions {
            n: opts.n,
            all: opts.all,
            test_every: opts.test_every,
            concise: true,
        };
        let outcome = run_tidy_loop(config, app, collab, &loop_opts).await?;
        state.pending_task_ids = outcome.pending_task_ids;
        state.blocked_task_id = outcome.blocked_task_id.map(|id| format!("{id:03}"));
        let status = match outcome.exit_code {
            0 => "completed",
            EXIT_BLOCKED => "blocked",
            _ => "failed",
        };
        state.checkpoint(&state_path, "loop", status, outcome.exit_code)?;
        if outcome.exit_code != 0 {
            return stop(&mut state, &state_path, outcome.exit_code);
        }
    }

    // 5. clean — archive residual empty tasks.
    if !(opts.resume && state.phase_completed("clean")) {
        let empties: Vec<TaskEntry> = list_tasks(&app.layout.tasks_dir(), &config.naming_check)
            .into_iter()
            .filter(|task| task.class == TaskClass::Empty)
            .collect();
        let cleaned = archive_entries(app, &empties)?;
        state.cleaned_empty_task_ids = cleaned;
        state.checkpoint(&state_path, "clean", "completed", 0)?;
    }

    let remaining = list_tasks(&app.layout.tasks_dir(), &config.naming_check);
    state.pending_task_ids = remaining.iter().map(|task| task.id).collect();
    if remaining.is_empty() {
        state.status = "completed".to_string();
        state.save(&state_path)?;
        Ok(0)
    } else {
        stop(&mut state, &state_path, EXIT_BLOCKED)
    }
}

fn stop(state: &mut FlowState, path: &std::path::Path, exit: i32) -> Result<i32> {
    state.status = "stopped".to_string();
    state.save(path)?;
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    /// Scripted collaborators; `full_tidy` can seed task files to mimic the
    /// partitioner regenerating `tasks/`.
    struct FakeCollaborators {
        app: AppContext,
        seed_on_full_tidy: Vec<(String, String, String)>,
        rename_exit: i32,
        verify_ok: bool,
        full_tidy_runs: usize,
        tidy_fix_runs: usize,
        rename_runs: usize,
        verify_runs: usize,
    }

    impl FakeCollaborators {
        fn new(app: &AppContext) -> Self {
            Self {
                app: app.clone(),
                seed_on_full_tidy: Vec::new(),
                rename_exit: 0,
                verify_ok: true,
                full_tidy_runs: 0,
                tidy_fix_runs: 0,
                rename_runs: 0,
                verify_runs: 0,
            }
        }
    }

    #[async_trait]
    impl FlowCollaborators for FakeCollaborators {
        async fn rename_pipeline(&mut self) -> Result<i32> {
            self.rename_runs += 1;
            Ok(self.rename_exit)
        }

        async fn verify(&mut self) -> Result<bool> {
            self.verify_runs += 1;
            Ok(self.verify_ok)
        }

        async fn full_tidy(&mut self) -> Result<i32> {
            self.full_tidy_runs += 1;
            for (batch, task, body) in &self.seed_on_full_tidy {
                let dir = self.app.layout.tasks_dir().join(batch);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join(task), body).unwrap();
            }
            Ok(0)
        }

        async fn tidy_fix(&mut self) -> Result<i32> {
            self.tidy_fix_runs += 1;
            Ok(0)
        }

        async fn refresh(&mut self, _batch_id: Option<&str>, _final_full: bool) -> Result<i32> {
            Ok(0)
        }
    }

    fn setup(tmp: &Path) -> (TidyConfig, AppContext) {
        let mut config = TidyConfig::default();
        config.apps.insert(
            "demo".to_string(),
            AppConfig {
                dir: tmp.join("app"),
                build_dir: None,
                verify_dir: None,
                extra_roots: Vec::new(),
            },
        );
        let app = config.resolve_app("demo", None).unwrap();
        (config, app)
    }

    #[tokio::test]
    async fn full_run_completes_with_empty_tasks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, app) = setup(tmp.path());
        let mut collab = FakeCollaborators::new(&app);
        collab.seed_on_full_tidy = vec![(
            "batch_001".to_string(),
            "task_001.log".to_string(),
            String::new(),
        )];

        let opts = FlowOptions {
            all: true,
            test_every: 5,
            with_tidy_fix: true,
            ..Default::default()
        };
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, 0);
        assert_eq!(collab.tidy_fix_runs, 1);
        assert_eq!(collab.full_tidy_runs, 1);
        assert_eq!(collab.rename_runs, 1);

        let state = FlowState::load(&app.layout.flow_state());
        assert_eq!(state.status, "completed");
        assert!(state.phase_completed("prepare_tasks"));
        assert!(state.phase_completed("loop"));
        assert!(state.pending_task_ids.is_empty());
    }

    #[tokio::test]
    async fn manual_task_stops_with_exit_2_and_records_blocked_id() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, app) = setup(tmp.path());
        let mut collab = FakeCollaborators::new(&app);
        collab.seed_on_full_tidy = vec![(
            "batch_001".to_string(),
            "task_001.log".to_string(),
            "/a.cpp:1:1: warning: moved twice [bugprone-use-after-move]\n".to_string(),
        )];

        let opts = FlowOptions {
            n: Some(5),
            test_every: 5,
            ..Default::default()
        };
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, EXIT_BLOCKED);

        let state = FlowState::load(&app.layout.flow_state());
        assert_eq!(state.status, "stopped");
        assert_eq!(state.blocked_task_id.as_deref(), Some("001"));
        assert_eq!(state.pending_task_ids, vec![1]);
    }

    #[tokio::test]
    async fn red_verify_stops_before_the_loop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, app) = setup(tmp.path());
        let mut collab = FakeCollaborators::new(&app);
        collab.verify_ok = false;

        let opts = FlowOptions::default();
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, 1);

        let state = FlowState::load(&app.layout.flow_state());
        assert_eq!(state.status, "stopped");
        assert!(!state.phase_completed("verify"));
        assert!(state.phases.get("loop").is_none());
    }

    #[tokio::test]
    async fn resume_skips_prepare_when_tasks_exist() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, app) = setup(tmp.path());
        let dir = app.layout.tasks_dir().join("batch_001");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("task_001.log"), "").unwrap();

        let mut collab = FakeCollaborators::new(&app);
        let opts = FlowOptions {
            all: true,
            test_every: 5,
            resume: true,
            ..Default::default()
        };
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, 0);
        assert_eq!(collab.full_tidy_runs, 0);

        let state = FlowState::load(&app.layout.flow_state());
        assert_eq!(state.phases.get("prepare_tasks").map(|p| p.status.as_str()), Some("skipped"));
    }

    #[tokio::test]
    async fn failed_rename_stops_and_is_retried_on_resume() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, app) = setup(tmp.path());
        let dir = app.layout.tasks_dir().join("batch_001");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("task_001.log"), "").unwrap();

        let mut collab = FakeCollaborators::new(&app);
        collab.rename_exit = 1;
        let opts = FlowOptions {
            all: true,
            test_every: 5,
            resume: true,
            ..Default::default()
        };
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, 1);

        // Resume after the fix: prepare_tasks stays skipped, rename reruns.
        let mut collab = FakeCollaborators::new(&app);
        let exit = run_tidy_flow(&config, &app, &mut collab, &opts).await.unwrap();
        assert_eq!(exit, 0);
        assert_eq!(collab.rename_runs, 1);
        assert_eq!(collab.full_tidy_runs, 0);
        assert_eq!(FlowState::load(&app.layout.flow_state()).status, "completed");
    }
}
