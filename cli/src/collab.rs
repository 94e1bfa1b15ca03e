//! Production wiring of the flow collaborators: real subprocesses, the real
//! clangd client.

use std::time::Duration;

use async_trait::async_trait;

use tidyctl_core::config::AppContext;
use tidyctl_core::flow::FlowCollaborators;
use tidyctl_core::invoker::{TidyInvoker, TidyRunOptions};
use tidyctl_core::refresh::{ProcessRefreshRunner, RefreshOptions, run_refresh};
use tidyctl_core::rename::{ApplyOptions, PlanOptions, RenameContext, apply, audit, plan};
use tidyctl_core::{Result, TidyConfig, verify};
use tidyctl_lsp_client::{ClangdClient, ClangdConfig};

pub struct Orchestrator<'a> {
    pub config: &'a TidyConfig,
    pub app: &'a AppContext,
    /// `--full-every` override threaded into refresh runs.
    pub full_every: Option<u32>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a TidyConfig, app: &'a AppContext) -> Self {
        Self {
            config,
            app,
            full_every: None,
        }
    }
}

#[async_trait]
impl FlowCollaborators for Orchestrator<'_> {
    async fn rename_pipeline(&mut self) -> Result<i32> {
        run_rename_pipeline(self.config, self.app).await
    }

    async fn verify(&mut self) -> Result<bool> {
        Ok(verify::run_verify(self.config, self.app).await?.success)
    }

    async fn full_tidy(&mut self) -> Result<i32> {
        let invoker = TidyInvoker::new(self.config, self.app);
        let outcome = invoker
            .run_full_tidy(&TidyRunOptions {
                keep_going: true,
                ..Default::default()
            })
            .await?;
        Ok(outcome.exit_code)
    }

    async fn tidy_fix(&mut self) -> Result<i32> {
        let invoker = TidyInvoker::new(self.config, self.app);
        invoker.run_tidy_fix(None, None, true).await
    }

    async fn refresh(&mut self, batch_id: Option<&str>, final_full: bool) -> Result<i32> {
        let mut runner = ProcessRefreshRunner::new(self.config, self.app);
        let opts = RefreshOptions {
            batch_id: batch_id.map(str::to_string),
            full_every: self.full_every,
            final_full,
            keep_going: true,
            ..Default::default()
        };
        let (code, _) = run_refresh(self.config, self.app, &mut runner, &opts).await?;
        Ok(code)
    }
}

/// plan, apply (strict) against a fresh clangd, then audit (strict). The
/// worst stage exit wins.
pub async fn run_rename_pipeline(config: &TidyConfig, app: &AppContext) -> Result<i32> {
    let ctx = RenameContext::from_app(config, app);
    plan(&ctx, &PlanOptions::default())?;

    let mut client = spawn_clangd(config, app)?;
    let apply_outcome = apply(
        &ctx,
        &mut client,
        &ApplyOptions {
            strict: true,
            ..Default::default()
        },
    )
    .await;
    client.shutdown().await?;
    let (apply_exit, _) = apply_outcome?;

    let (audit_exit, _) = audit(&ctx, true)?;
    Ok(apply_exit.max(audit_exit))
}

pub fn spawn_clangd(config: &TidyConfig, app: &AppContext) -> Result<ClangdClient> {
    let clangd = ClangdConfig {
        binary: config.clangd_bin.clone(),
        root_dir: app.app_dir.clone(),
        allowed_roots: app.allowed_roots.clone(),
        warmup: Duration::from_secs(config.clangd_warmup_secs),
        request_timeout: Duration::from_secs(config.lsp_timeout_secs),
        env: config.toolchain_env(),
        extra_args: vec![format!(
            "--compile-commands-dir={}",
            app.layout.build_dir().display()
        )],
    };
    Ok(ClangdClient::spawn(clangd)?)
}
