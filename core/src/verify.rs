//! Verify collaborator: configure + build (non-tidy) + test suite.
//!
//! The result is persisted as `verify_result.json` in the tidy build dir so
//! `clean --strict` can refuse to archive after a red run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{AppContext, TidyConfig};
use crate::error::Result;
use crate::process::{RunSpec, kill_tree, run_streamed};
use crate::state;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOutcome {
    pub success: bool,
    pub exit_code: i32,
    /// Per-stage exit codes: configure, build, test.
    pub stages: BTreeMap<String, i32>,
    pub finished_at: Option<String>,
}

/// Configure (when needed) and build the verify dir, then run ctest.
/// Later stages are skipped once one fails; the outcome is written to
/// `verify_result.json` either way.
pub async fn run_verify(config: &TidyConfig, app: &AppContext) -> Result<VerifyOutcome> {
    let mut outcome = VerifyOutcome::default();

    if config.kill_build_procs {
        kill_tree(&config.build_proc_names).await;
    }

    let configure_code = if app.verify_dir.join("CMakeCache.txt").is_file() {
        0
    } else {
        let argv = vec![
            config.cmake_bin.clone(),
            "-S".to_string(),
            app.app_dir.display().to_string(),
            "-B".to_string(),
            app.verify_dir.display().to_string(),
            "-G".to_string(),
            "Ninja".to_string(),
        ];
        let mut spec = RunSpec::new(argv);
        spec.env = config.toolchain_env();
        run_streamed(&spec).await?.exit_code
    };
    outcome.stages.insert("configure".to_string(), configure_code);

    let build_code = if configure_code == 0 {
        let argv = vec![
            config.cmake_bin.clone(),
            "--build".to_string(),
            app.verify_dir.display().to_string(),
        ];
        let mut spec = RunSpec::new(argv);
        spec.env = config.toolchain_env();
        run_streamed(&spec).await?.exit_code
    } else {
        configure_code
    };
    if configure_code == 0 {
        outcome.stages.insert("build".to_string(), build_code);
    }

    let test_code = if configure_code == 0 && build_code == 0 {
        let argv = vec![
            "ctest".to_string(),
            "--test-dir".to_string(),
            app.verify_dir.display().to_string(),
            "--output-on-failure".to_string(),
        ];
        let mut spec = RunSpec::new(argv);
        spec.env = config.toolchain_env();
        let code = run_streamed(&spec).await?.exit_code;
        outcome.stages.insert("test".to_string(), code);
        code
    } else {
        build_code
    };

    outcome.exit_code = test_code;
    outcome.success = test_code == 0;
    outcome.finished_at = Some(state::now_utc());
    state::save_json(&app.layout.verify_result(), &outcome)?;
    Ok(outcome)
}

/// The latest persisted verify result, if any.
pub fn last_verify(app: &AppContext) -> Option<VerifyOutcome> {
    let path = app.layout.verify_result();
    if !path.is_file() {
        return None;
    }
    Some(state::load_or_default(&path))
}
