//! Layered configuration: hardcoded defaults, then `tidyctl.toml`, then
//! `TIDYCTL_*` environment overrides.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{OrchestratorError, Result};
use crate::paths::BuildLayout;

pub const DEFAULT_CONFIG_FILE: &str = "tidyctl.toml";

/// Knobs for one registered application.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Source root of the app; also the rename-scope root.
    pub dir: PathBuf,
    /// Tidy build dir; defaults to `<dir>/build_tidy`.
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
    /// Non-tidy build dir used by verify; defaults to `<dir>/build`.
    #[serde(default)]
    pub verify_dir: Option<PathBuf>,
    /// Extra rename-scope roots beyond `dir`.
    #[serde(default)]
    pub extra_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TidyConfig {
    pub apps: BTreeMap<String, AppConfig>,

    /// The identifier-naming check that drives the rename pipeline.
    pub naming_check: String,

    // Partitioning
    pub max_lines: usize,
    pub max_diags: usize,
    pub batch_size: usize,
    pub parse_workers: usize,

    // Refresh cadence
    pub full_every: u32,
    pub neighbor_scope: String,
    pub refresh_chunk_size: usize,
    pub auto_full_on_no_such_file: bool,
    pub auto_full_on_glob_mismatch: bool,
    pub already_renamed_ratio: f64,
    pub already_renamed_min: usize,

    // Rename policy
    pub skip_header_single_edit: bool,
    pub allowed_symbol_kinds: Vec<String>,
    pub risky_symbol_kinds: Vec<String>,
    pub clangd_warmup_secs: u64,
    pub lsp_timeout_secs: u64,

    // Loop
    pub test_every: usize,

    // Build backend
    pub header_filter: String,
    pub kill_build_procs: bool,
    pub build_proc_names: Vec<String>,
    pub cmake_bin: String,
    pub clang_tidy_bin: String,
    pub clangd_bin: String,
    pub toolchain_paths: Vec<PathBuf>,
}

impl Default for TidyConfig {
    fn default() -> Self {
        Self {
            apps: BTreeMap::new(),
            naming_check: "readability-identifier-naming".to_string(),
            max_lines: 400,
            max_diags: 25,
            batch_size: 10,
            parse_workers: 0,
            full_every: 5,
            neighbor_scope: "dir".to_string(),
            refresh_chunk_size: 40,
            auto_full_on_no_such_file: true,
            auto_full_on_glob_mismatch: true,
            already_renamed_ratio: 0.6,
            already_renamed_min: 20,
            skip_header_single_edit: true,
            allowed_symbol_kinds: [
                "function",
                "method",
                "member",
                "class member",
                "private member",
                "protected member",
                "parameter",
                "variable",
                "global variable",
                "constant",
                "enum constant",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            risky_symbol_kinds: [
                "function",
                "method",
                "member",
                "class member",
                "private member",
                "protected member",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            clangd_warmup_secs: 0,
            lsp_timeout_secs: 30,
            test_every: 5,
            header_filter: ".*".to_string(),
            kill_build_procs: true,
            build_proc_names: ["ninja", "cmake", "clang-tidy", "clangd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cmake_bin: "cmake".to_string(),
            clang_tidy_bin: "clang-tidy".to_string(),
            clangd_bin: "clangd".to_string(),
            toolchain_paths: Vec::new(),
        }
    }
}

impl TidyConfig {
    /// Load defaults, merge the TOML file (explicit path, else
    /// `./tidyctl.toml` when present), then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| OrchestratorError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u32>("TIDYCTL_FULL_EVERY") {
            self.full_every = v;
        }
        if let Some(v) = env_parse::<usize>("TIDYCTL_PARSE_WORKERS") {
            self.parse_workers = v;
        }
        if let Some(v) = env_parse::<usize>("TIDYCTL_MAX_LINES") {
            self.max_lines = v;
        }
        if let Some(v) = env_parse::<usize>("TIDYCTL_MAX_DIAGS") {
            self.max_diags = v;
        }
        if let Some(v) = env_parse::<usize>("TIDYCTL_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(v) = env_parse::<u64>("TIDYCTL_CLANGD_WARMUP_SECS") {
            self.clangd_warmup_secs = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_lines == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_lines must be >= 1".to_string(),
            ));
        }
        if self.max_diags == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_diags must be >= 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "batch_size must be >= 1".to_string(),
            ));
        }
        if !matches!(self.neighbor_scope.as_str(), "none" | "dir" | "module") {
            return Err(OrchestratorError::InvalidConfig(format!(
                "neighbor_scope must be none|dir|module, got '{}'",
                self.neighbor_scope
            )));
        }
        Ok(())
    }

    /// Effective parse worker count: 0 means `min(8, CPU count)`.
    pub fn effective_parse_workers(&self) -> usize {
        if self.parse_workers > 0 {
            return self.parse_workers;
        }
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        cpus.min(8).max(1)
    }

    /// Resolve `--app <name>` (+ optional `--build-dir` override) into paths.
    pub fn resolve_app(&self, name: &str, build_dir: Option<&Path>) -> Result<AppContext> {
        let app = self
            .apps
            .get(name)
            .ok_or_else(|| OrchestratorError::UnknownApp(name.to_string()))?;
        let app_dir = app.dir.clone();
        let build = build_dir
            .map(Path::to_path_buf)
            .or_else(|| app.build_dir.clone())
            .unwrap_or_else(|| app_dir.join("build_tidy"));
        let verify_dir = app
            .verify_dir
            .clone()
            .unwrap_or_else(|| app_dir.join("build"));

        let mut roots = vec![app_dir.clone()];
        roots.extend(app.extra_roots.iter().cloned());

        Ok(AppContext {
            name: name.to_string(),
            app_dir,
            verify_dir,
            allowed_roots: roots,
            layout: BuildLayout::new(build),
        })
    }

    /// Resolve a tool binary against the effective PATH, toolchain
    /// directories included. `None` when nothing matches (an absolute path
    /// that exists resolves to itself).
    pub fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        match self.toolchain_env().into_iter().next() {
            Some((_, path)) => which::which_in(name, Some(path), ".").ok(),
            None => which::which(name).ok(),
        }
    }

    /// Environment entries for spawned children: PATH with the configured
    /// toolchain directories prepended. Empty when nothing is configured.
    pub fn toolchain_env(&self) -> Vec<(String, String)> {
        if self.toolchain_paths.is_empty() {
            return Vec::new();
        }
        let current = env::var_os("PATH").unwrap_or_default();
        let mut paths: Vec<PathBuf> = self.toolchain_paths.clone();
        paths.extend(env::split_paths(&current));
        match env::join_paths(paths) {
            Ok(joined) => vec![("PATH".to_string(), joined.to_string_lossy().into_owned())],
            Err(_) => Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    env::var(var).ok().and_then(|v| v.parse().ok())
}

/// One resolved `--app`: source root, build layout, scope roots.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub name: String,
    pub app_dir: PathBuf,
    pub verify_dir: PathBuf,
    pub allowed_roots: Vec<PathBuf>,
    pub layout: BuildLayout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_validate() {
        TidyConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_knobs_rejected() {
        let mut config = TidyConfig::default();
        config.max_diags = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_diags"));
    }

    #[test]
    fn resolve_app_defaults_build_dirs() {
        let mut config = TidyConfig::default();
        config.apps.insert(
            "demo".to_string(),
            AppConfig {
                dir: PathBuf::from("/work/demo"),
                build_dir: None,
                verify_dir: None,
                extra_roots: vec![PathBuf::from("/work/shared")],
            },
        );

        let app = config.resolve_app("demo", None).unwrap();
        assert_eq!(app.layout.build_dir(), Path::new("/work/demo/build_tidy"));
        assert_eq!(app.verify_dir, PathBuf::from("/work/demo/build"));
        assert_eq!(app.allowed_roots.len(), 2);

        let overridden = config
            .resolve_app("demo", Some(Path::new("/tmp/bt")))
            .unwrap();
        assert_eq!(overridden.layout.build_dir(), Path::new("/tmp/bt"));
    }

    #[test]
    fn unknown_app_is_an_error() {
        let config = TidyConfig::default();
        assert!(matches!(
            config.resolve_app("nope", None),
            Err(OrchestratorError::UnknownApp(_))
        ));
    }

    #[test]
    fn toml_overrides_defaults() {
        let text = r#"
            max_diags = 7
            neighbor_scope = "module"

            [apps.demo]
            dir = "/srv/demo"
        "#;
        let config: TidyConfig = toml::from_str(text).unwrap();
        assert_eq!(config.max_diags, 7);
        assert_eq!(config.neighbor_scope, "module");
        assert_eq!(config.max_lines, 400);
        assert!(config.apps.contains_key("demo"));
    }
}
