#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Cross-module lifecycle tests: build log -> tasks -> rename plan/apply/
//! audit, and loop -> clean -> refresh.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use tidyctl_core::config::{AppConfig, AppContext};
use tidyctl_core::flow::{self, FlowCollaborators, LoopOptions};
use tidyctl_core::refresh::{RefreshOptions, RefreshRunner, run_refresh};
use tidyctl_core::rename::{
    ApplyOptions, PlanOptions, RenameContext, RenameOutcome, Renamer, apply, audit, plan,
};
use tidyctl_core::state::{BatchState, RefreshState};
use tidyctl_core::tasks::{PartitionOptions, partition_build_log};
use tidyctl_core::{Result, TidyConfig};

fn demo_app(tmp: &Path) -> (TidyConfig, AppContext) {
    let app_dir = tmp.join("app");
    std::fs::create_dir_all(app_dir.join("src")).unwrap();
    let mut config = TidyConfig::default();
    config.full_every = 2;
    config.neighbor_scope = "none".to_string();
    config.apps.insert(
        "demo".to_string(),
        AppConfig {
            dir: app_dir,
            build_dir: None,
            verify_dir: None,
            extra_roots: Vec::new(),
        },
    );
    let app = config.resolve_app("demo", None).unwrap();
    (config, app)
}

/// Performs the edit the way clangd would: preview reports it, apply
/// rewrites the file.
struct FakeClangd;

#[async_trait]
impl Renamer for FakeClangd {
    async fn rename(
        &mut self,
        path: &Path,
        _line: u32,
        _col: u32,
        new_name: &str,
        dry_run: bool,
    ) -> Result<RenameOutcome> {
        let text = std::fs::read_to_string(path).unwrap();
        // The apply stage resolved the position onto old_name already; the
        // candidate file is the only edit site in these tests.
        let old_name = "old_count";
        let edit_count = text.matches(old_name).count();
        if !dry_run {
            std::fs::write(path, text.replace(old_name, new_name)).unwrap();
        }
        Ok(RenameOutcome {
            ok: true,
            edit_count,
            changed_files: vec![path.to_path_buf()],
            ..Default::default()
        })
    }
}

#[tokio::test]
async fn build_log_to_resolved_rename() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (config, app) = demo_app(tmp.path());

    let source = app.app_dir.join("src/widget.cpp");
    std::fs::write(&source, "int old_count = 0;\nold_count++;\n").unwrap();

    let log = format!(
        "[1/1] tidy_check_step_1\n\
         {0}:1:5: warning: invalid case style for variable 'old_count' [readability-identifier-naming]\n\
         \x20   1 | int old_count = 0;\n\
         \x20     |     ^\n\
         \x20     |     newCount\n",
        source.display()
    );
    std::fs::create_dir_all(app.layout.build_dir()).unwrap();
    std::fs::write(app.layout.build_log(), log).unwrap();

    let stats = partition_build_log(
        &app.layout.build_log(),
        &app.layout.tasks_dir(),
        &PartitionOptions {
            max_lines: 400,
            max_diags: 25,
            batch_size: 10,
            parse_workers: 1,
            base_dir: app.app_dir.clone(),
        },
    )
    .await
    .unwrap();
    assert_eq!(stats.tasks, 1);

    let ctx = RenameContext::from_app(&config, &app);
    let set = plan(&ctx, &PlanOptions::default()).unwrap();
    assert_eq!(set.selected, 1);
    assert_eq!(set.candidates[0].old_name, "old_count");
    assert_eq!(set.candidates[0].new_name, "newCount");

    let mut renamer = FakeClangd;
    let (exit, report) = apply(&ctx, &mut renamer, &ApplyOptions::default())
        .await
        .unwrap();
    assert_eq!(exit, 0);
    assert_eq!(report.results[0].status, "applied");
    assert_eq!(report.results[0].edit_count, 2);
    assert_eq!(
        std::fs::read_to_string(&source).unwrap(),
        "int newCount = 0;\nnewCount++;\n"
    );

    let (audit_exit, audit_report) = audit(&ctx, true).unwrap();
    assert_eq!(audit_exit, 0);
    assert_eq!(audit_report.results[0].status, "resolved");
    assert_eq!(audit_report.results[0].new_count, 2);
}

#[derive(Default)]
struct GreenCollaborators;

#[async_trait]
impl FlowCollaborators for GreenCollaborators {
    async fn rename_pipeline(&mut self) -> Result<i32> {
        Ok(0)
    }
    async fn verify(&mut self) -> Result<bool> {
        Ok(true)
    }
    async fn full_tidy(&mut self) -> Result<i32> {
        Ok(0)
    }
    async fn tidy_fix(&mut self) -> Result<i32> {
        Ok(0)
    }
    async fn refresh(&mut self, _batch_id: Option<&str>, _final_full: bool) -> Result<i32> {
        Ok(0)
    }
}

struct RecordingRunner {
    incremental_calls: Vec<Vec<PathBuf>>,
}

#[async_trait]
impl RefreshRunner for RecordingRunner {
    async fn run_incremental(&mut self, files: &[PathBuf], log_path: &Path) -> Result<i32> {
        self.incremental_calls.push(files.to_vec());
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        std::fs::write(log_path, "clean run\n").unwrap();
        Ok(0)
    }
    async fn run_full(&mut self) -> Result<i32> {
        Ok(0)
    }
    async fn configure(&mut self) -> Result<i32> {
        Ok(0)
    }
}

#[tokio::test]
async fn loop_archives_then_refresh_counts_the_batch() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (config, app) = demo_app(tmp.path());

    let unit = app.app_dir.join("src/a.cpp");
    std::fs::write(&unit, "int x;\n").unwrap();
    std::fs::create_dir_all(app.layout.build_dir()).unwrap();
    std::fs::write(
        app.layout.compile_commands(),
        format!(
            "[{{\"directory\": \"{}\", \"file\": \"{}\", \"command\": \"clang++ -c a.cpp\"}}]",
            app.app_dir.display(),
            unit.display()
        ),
    )
    .unwrap();

    let batch_dir = app.layout.tasks_dir().join("batch_001");
    std::fs::create_dir_all(&batch_dir).unwrap();
    std::fs::write(
        batch_dir.join("task_001.log"),
        format!(
            "File: {0}\n{1}\n=== SUMMARY ===\nFiles: a.cpp(1)\nTypes: modernize-use-auto(1)\n===============\n\n{0}:1:1: warning: w [modernize-use-auto]\n",
            unit.display(),
            "=".repeat(60)
        ),
    )
    .unwrap();

    // The task is neither empty nor rename-only, so drive it through clean
    // directly the way an operator resolving a manual task would.
    let mut collab = GreenCollaborators;
    let outcome = flow::run_tidy_loop(
        &config,
        &app,
        &mut collab,
        &LoopOptions {
            all: true,
            test_every: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome.exit_code, 2);
    assert_eq!(outcome.blocked_task_id, Some(1));

    let cleaned = flow::clean(
        &config,
        &app,
        &flow::CleanOptions {
            batch_id: Some("batch_001".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(cleaned.archived_task_ids, vec![1]);
    assert_eq!(
        BatchState::load(&app.layout.batch_state()).cleaned_task_ids,
        vec![1]
    );

    let mut runner = RecordingRunner {
        incremental_calls: Vec::new(),
    };
    let (exit, report) = run_refresh(
        &config,
        &app,
        &mut runner,
        &RefreshOptions {
            batch_id: Some("batch_001".to_string()),
            keep_going: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(exit, 0);
    assert_eq!(report.touched_files, vec![unit.clone()]);
    assert_eq!(report.resolved_units, vec![unit.clone()]);
    assert!(report.full_reasons.is_empty());
    assert_eq!(runner.incremental_calls, vec![vec![unit]]);
    assert!(
        app.layout
            .refresh_dir("batch_001")
            .join("incremental_tidy_001.log")
            .is_file()
    );

    let state = RefreshState::load(&app.layout.refresh_state());
    assert_eq!(state.batches_since_full, 1);
    assert_eq!(state.processed_batches, vec!["batch_001".to_string()]);
}
