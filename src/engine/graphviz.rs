//! Graphviz process adapter
//!
//! Runs `dot` or `neato` with `-Tplain`, feeding the description on stdin.
//! The process is polled so a cancelled job kills it instead of waiting.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::debug;

use super::{CancelFlag, EngineKind, EngineOptions, LayoutEngine};
use crate::error::{LayoutError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct GraphvizEngine {
    dot_path: PathBuf,
    neato_path: PathBuf,
}

impl GraphvizEngine {
    pub fn new(dot_path: impl Into<PathBuf>, neato_path: impl Into<PathBuf>) -> Self {
        Self { dot_path: dot_path.into(), neato_path: neato_path.into() }
    }
}

impl LayoutEngine for GraphvizEngine {
    fn name(&self) -> &str {
        "graphviz"
    }

    fn layout(&self, description: &str, options: &EngineOptions) -> Result<String> {
        self.layout_cancellable(description, options, &CancelFlag::new())
    }

    fn layout_cancellable(&self, description: &str, options: &EngineOptions, cancel: &CancelFlag) -> Result<String> {
        let program = match options.engine {
            EngineKind::Dot => &self.dot_path,
            EngineKind::Neato => &self.neato_path,
        };
        if options.total_memory.is_some() {
            debug!("total_memory is not applicable to an external Graphviz process");
        }

        let mut command = Command::new(program);
        command.arg(format!("-T{}", options.format));
        let (status, stdout, stderr) = run_process(&mut command, description, cancel)
            .map_err(|e| match e {
                LayoutError::Engine(reason) => {
                    LayoutError::Engine(format!("{}: {}", program.display(), reason))
                }
                other => other,
            })?;

        if !status.success() {
            return Err(LayoutError::Engine(format!(
                "{} exited with {}: {}",
                program.display(),
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        String::from_utf8(stdout).map_err(|e| LayoutError::Engine(format!("engine output is not UTF-8: {}", e)))
    }
}

/// Child process killed on drop unless it has already exited
struct RunningChild(Child);

impl Drop for RunningChild {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    reader
        .join()
        .map_err(|_| LayoutError::Engine("output reader panicked".to_string()))?
        .map_err(Into::into)
}

/// Runs `command` with `input` on stdin until it exits or `cancel` is set.
fn run_process(command: &mut Command, input: &str, cancel: &CancelFlag) -> Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    if cancel.is_cancelled() {
        return Err(LayoutError::Cancelled);
    }

    let child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LayoutError::Engine(format!("failed to start: {}", e)))?;
    let mut child = RunningChild(child);

    let stdout = child.0.stdout.take().map(drain);
    let stderr = child.0.stderr.take().map(drain);

    // stdin is dropped at the end of this block so the engine sees EOF
    {
        let mut stdin = child
            .0
            .stdin
            .take()
            .ok_or_else(|| LayoutError::Engine("engine stdin unavailable".to_string()))?;
        stdin.write_all(input.as_bytes())?;
    }

    let status = loop {
        if cancel.is_cancelled() {
            debug!("Killing engine process {} of a cancelled job", child.0.id());
            return Err(LayoutError::Cancelled);
        }
        if let Some(status) = child.0.try_wait()? {
            break status;
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout.map(collect).transpose()?.unwrap_or_default();
    let stderr = stderr.map(collect).transpose()?.unwrap_or_default();
    Ok((status, stdout, stderr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Phase;
    use std::time::Instant;

    #[test]
    fn test_missing_binary_is_engine_error() {
        let engine = GraphvizEngine::new("/nonexistent/dot", "/nonexistent/neato");
        let err = engine
            .layout("digraph G {}\n", &EngineOptions::for_phase(Phase::DotOnly, None))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Engine(_)));
        assert!(!err.is_request_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_output_is_collected() {
        let mut command = Command::new("cat");
        let (status, stdout, _) = run_process(&mut command, "graph 1 2 3\nstop\n", &CancelFlag::new()).unwrap();
        assert!(status.success());
        assert_eq!(String::from_utf8(stdout).unwrap(), "graph 1 2 3\nstop\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_running_process() {
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let started = Instant::now();
        let mut command = Command::new("sleep");
        command.arg("30");
        let err = run_process(&mut command, "", &cancel).unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err, LayoutError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancelled_before_start_spawns_nothing() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let engine = GraphvizEngine::new("/nonexistent/dot", "/nonexistent/neato");
        let err = engine
            .layout_cancellable("digraph G {}\n", &EngineOptions::for_phase(Phase::DotOnly, None), &cancel)
            .unwrap_err();
        assert_eq!(err, LayoutError::Cancelled);
    }
}
