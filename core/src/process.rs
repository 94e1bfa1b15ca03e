//! Subprocess runner: spawn a child with stdout and stderr merged, mirror
//! every line to the controlling terminal and (optionally) append it to a log
//! file, and hand back the exit code.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::error::{OrchestratorError, Result};

/// One subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Environment overrides layered on the inherited environment.
    pub env: Vec<(String, String)>,
    /// When set, every output line is appended here as well.
    pub log_path: Option<PathBuf>,
    /// Flush stdout and the log file every N lines. 0 is treated as 1.
    pub flush_every: usize,
}

impl RunSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            flush_every: 1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub duration: Duration,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn the child and stream its merged output until exit.
///
/// Output ordering between the two pipes is whatever the OS delivers; lines
/// themselves are never interleaved because each pipe is read line-wise.
/// Invalid UTF-8 is replaced, the raw bytes are not preserved here (the log
/// file receives the replaced text too).
pub async fn run_streamed(spec: &RunSpec) -> Result<RunOutcome> {
    let program = spec
        .argv
        .first()
        .ok_or_else(|| OrchestratorError::InvalidConfig("empty argv".to_string()))?;
    let started = Instant::now();

    let mut command = Command::new(program);
    command
        .args(&spec.argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    tracing::debug!(argv = ?spec.argv, "spawning child");
    let mut child = command.spawn().map_err(|source| OrchestratorError::Spawn {
        program: program.clone(),
        source,
    })?;

    let (tx, mut rx) = mpsc::channel::<String>(256);

    if let Some(stdout) = child.stdout.take() {
        spawn_line_reader(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_line_reader(stderr, tx);
    }

    let mut log_file = match &spec.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    OrchestratorError::DirectoryCreate {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| OrchestratorError::FileWrite {
                    path: path.clone(),
                    source,
                })?;
            Some(std::io::BufWriter::new(file))
        }
        None => None,
    };

    let flush_every = spec.flush_every.max(1);
    let mut stdout = std::io::stdout();
    let mut pending = 0usize;

    while let Some(line) = rx.recv().await {
        let _ = writeln!(stdout, "{line}");
        if let Some(log) = log_file.as_mut() {
            let _ = writeln!(log, "{line}");
        }
        pending += 1;
        if pending >= flush_every {
            let _ = stdout.flush();
            if let Some(log) = log_file.as_mut() {
                let _ = log.flush();
            }
            pending = 0;
        }
    }
    let _ = stdout.flush();
    if let Some(log) = log_file.as_mut() {
        let _ = log.flush();
    }

    let status = child.wait().await.map_err(|source| OrchestratorError::Spawn {
        program: program.clone(),
        source,
    })?;
    let exit_code = status.code().unwrap_or(-1);

    Ok(RunOutcome {
        exit_code,
        duration: started.elapsed(),
    })
}

fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!("pipe read ended: {e}");
                    break;
                }
            }
        }
    });
}

/// Terminate lingering build-tool processes by image name before a
/// configure/build cycle. "No such process" is not an error.
pub async fn kill_tree(names: &[String]) {
    for name in names {
        let argv: Vec<String> = if cfg!(windows) {
            vec![
                "taskkill".to_string(),
                "/F".to_string(),
                "/T".to_string(),
                "/IM".to_string(),
                format!("{name}.exe"),
            ]
        } else {
            vec!["pkill".to_string(), "-x".to_string(), name.clone()]
        };

        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).stdout(Stdio::null()).stderr(Stdio::null());
        match command.status().await {
            Ok(status) => {
                tracing::debug!(name = %name, code = ?status.code(), "kill_tree");
            }
            Err(e) => {
                tracing::debug!(name = %name, "kill_tree unavailable: {e}");
            }
        }
    }
}
