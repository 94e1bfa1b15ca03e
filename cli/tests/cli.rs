//! Binary-level tests over the subcommands that run without a C++ toolchain:
//! partitioning, loop blocking, archiving, rename planning and auditing, and
//! the refresh dry-run.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

struct Sandbox {
    _tmp: tempfile::TempDir,
    config_path: PathBuf,
    app_dir: PathBuf,
    build_dir: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let tmp = tempfile::TempDir::new().unwrap();
        let app_dir = tmp.path().join("app");
        std::fs::create_dir_all(app_dir.join("src")).unwrap();
        let build_dir = app_dir.join("build_tidy");
        let config_path = tmp.path().join("tidyctl.toml");
        std::fs::write(
            &config_path,
            format!("[apps.demo]\ndir = \"{}\"\n", app_dir.display()),
        )
        .unwrap();
        Self {
            _tmp: tmp,
            config_path,
            app_dir,
            build_dir,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tidyctl").unwrap();
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    fn write_task(&self, batch: &str, task: &str, body: &str) {
        let dir = self.build_dir.join("tasks").join(batch);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(task), body).unwrap();
    }
}

fn naming_diag(file: &Path, line: u32, old: &str, new: &str) -> String {
    format!(
        "{}:{line}:5: warning: invalid case style for member '{old}' [readability-identifier-naming]\n    | {new}\n",
        file.display()
    )
}

#[test]
fn unknown_app_is_a_one_line_failure() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["tidy-split", "--app", "nope"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown app 'nope'"));
}

#[test]
fn invalid_partition_knobs_fail_fast() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["tidy-split", "--app", "demo", "--max-diags", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("max_diags"));
}

#[test]
fn tidy_split_partitions_an_existing_build_log() {
    let sandbox = Sandbox::new();
    let header = sandbox.app_dir.join("src/a.hpp");

    // Three ninja sections, four naming diagnostics each; max_diags=3 closes
    // a task after three, leaving a one-diagnostic tail per section.
    let mut log = String::new();
    for step in 1..=3 {
        log.push_str(&format!("[{step}/3] tidy_check_step_{step}\n"));
        for i in 0..4 {
            log.push_str(&naming_diag(&header, i + 1, &format!("bad_{i}"), &format!("good{i}")));
        }
    }
    std::fs::create_dir_all(&sandbox.build_dir).unwrap();
    std::fs::write(sandbox.build_dir.join("build.log"), log).unwrap();

    sandbox
        .cmd()
        .args([
            "tidy-split",
            "--app",
            "demo",
            "--max-lines",
            "100",
            "--max-diags",
            "3",
            "--batch-size",
            "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks: 6 in 3 batches"));

    let tasks = sandbox.build_dir.join("tasks");
    for (batch, task) in [(1, 1), (1, 2), (2, 3), (2, 4), (3, 5), (3, 6)] {
        assert!(
            tasks
                .join(format!("batch_{batch:03}"))
                .join(format!("task_{task:03}.log"))
                .is_file()
        );
    }
    let summary = std::fs::read_to_string(tasks.join("tasks_summary.md")).unwrap();
    assert!(summary.contains("Total tasks: 6"));
    let first = std::fs::read_to_string(tasks.join("batch_001/task_001.log")).unwrap();
    assert!(first.starts_with(&format!("File: {}", header.display())));
    assert!(first.contains(&"=".repeat(60)));
}

#[test]
fn tidy_loop_blocks_on_a_manual_task_with_exit_2() {
    let sandbox = Sandbox::new();
    sandbox.write_task(
        "batch_001",
        "task_001.log",
        "/src/a.cpp:3:3: warning: moved twice [bugprone-use-after-move]\n",
    );

    sandbox
        .cmd()
        .args(["tidy-loop", "--app", "demo", "--n", "5"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("blocked on task_001"));

    // Nothing was archived.
    assert!(
        sandbox
            .build_dir
            .join("tasks/batch_001/task_001.log")
            .is_file()
    );
    assert!(!sandbox.build_dir.join("tasks_done").exists());
}

#[test]
fn clean_archives_by_task_id_and_records_state() {
    let sandbox = Sandbox::new();
    sandbox.write_task("batch_001", "task_001.log", "");
    sandbox.write_task("batch_001", "task_002.log", "");

    sandbox
        .cmd()
        .args(["clean", "--app", "demo", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("archived 1 task(s)"));

    assert!(
        sandbox
            .build_dir
            .join("tasks_done/batch_001/task_001.log")
            .is_file()
    );
    assert!(
        sandbox
            .build_dir
            .join("tasks/batch_001/task_002.log")
            .is_file()
    );
    let state = std::fs::read_to_string(sandbox.build_dir.join("batch_state.json")).unwrap();
    assert!(state.contains("\"cleaned_task_ids\""));
    assert!(state.contains("\"last_clean_ok\": true"));
}

#[test]
fn clean_strict_refuses_without_a_green_verify() {
    let sandbox = Sandbox::new();
    sandbox.write_task("batch_001", "task_001.log", "");

    sandbox
        .cmd()
        .args(["clean", "--app", "demo", "--strict"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("strict clean refused"));
    assert!(
        sandbox
            .build_dir
            .join("tasks/batch_001/task_001.log")
            .is_file()
    );
}

#[test]
fn rename_plan_then_audit_without_an_lsp() {
    let sandbox = Sandbox::new();
    let pending = sandbox.app_dir.join("src/a.hpp");
    let resolved = sandbox.app_dir.join("src/b.cpp");
    std::fs::write(&pending, "int old_a = 0;\n").unwrap();
    std::fs::write(&resolved, "int newB = 0;\n").unwrap();

    sandbox.write_task(
        "batch_001",
        "task_001.log",
        &format!(
            "{}{}",
            naming_diag(&pending, 1, "old_a", "newA"),
            naming_diag(&resolved, 1, "old_b", "newB")
        ),
    );

    sandbox
        .cmd()
        .args(["rename-plan", "--app", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 candidate(s) selected of 2"));
    let rename_dir = sandbox.build_dir.join("rename");
    assert!(rename_dir.join("rename_candidates.json").is_file());
    assert!(rename_dir.join("rename_plan.md").is_file());

    // Non-strict audit reports without failing.
    sandbox
        .cmd()
        .args(["rename-audit", "--app", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resolved 1 | pending 1"));

    // Strict audit fails while old_a is still on disk.
    sandbox
        .cmd()
        .args(["rename-audit", "--app", "demo", "--strict"])
        .assert()
        .code(1);

    let report =
        std::fs::read_to_string(rename_dir.join("rename_audit_report.json")).unwrap();
    assert!(report.contains("\"status\": \"pending\""));
    assert!(report.contains("\"status\": \"resolved\""));
}

#[test]
fn tidy_refresh_dry_run_prints_the_selection_plan() {
    let sandbox = Sandbox::new();
    let unit = sandbox.app_dir.join("src/a.cpp");
    std::fs::create_dir_all(&sandbox.build_dir).unwrap();
    std::fs::write(
        sandbox.build_dir.join("compile_commands.json"),
        format!(
            "[{{\"directory\": \"{}\", \"file\": \"{}\", \"command\": \"clang++ -c a.cpp\"}}]",
            sandbox.app_dir.display(),
            unit.display()
        ),
    )
    .unwrap();

    let done = sandbox.build_dir.join("tasks_done/batch_001");
    std::fs::create_dir_all(&done).unwrap();
    std::fs::write(
        done.join("task_001.log"),
        format!("File: {}\n", unit.display()),
    )
    .unwrap();

    sandbox
        .cmd()
        .args([
            "tidy-refresh",
            "--app",
            "demo",
            "--batch-id",
            "1",
            "--dry-run",
        ])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("refresh plan for batch_001")
                .and(predicate::str::contains("src/a.cpp")),
        );

    // Dry run leaves no state behind.
    assert!(!sandbox.build_dir.join("refresh_state.json").exists());
}

#[test]
fn tidy_refresh_missing_batch_is_an_error() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["tidy-refresh", "--app", "demo", "--batch-id", "9"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("batch 'batch_009' not found"));
}
