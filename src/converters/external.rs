//! External command-line tool invocation
//!
//! Tools run as child processes with piped output. The calling thread
//! blocks until the child exits or its time budget runs out, in which
//! case the child is killed.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::tools::{POLL_INTERVAL, VERSION_QUERY_TIMEOUT};
use crate::error::ConversionError;

/// Locations of the external converters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub usdcat: PathBuf,
    pub fbx2usd: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            usdcat: PathBuf::from("usdcat"),
            fbx2usd: PathBuf::from("fbx2usd"),
        }
    }
}

impl ToolPaths {
    /// Defaults overridden by `STAGEHAND_USDCAT` and `STAGEHAND_FBX2USD`
    pub fn from_env() -> Self {
        let mut paths = Self::default();
        if let Some(usdcat) = std::env::var_os("STAGEHAND_USDCAT") {
            paths.usdcat = PathBuf::from(usdcat);
        }
        if let Some(fbx2usd) = std::env::var_os("STAGEHAND_FBX2USD") {
            paths.fbx2usd = PathBuf::from(fbx2usd);
        }
        paths
    }
}

/// Captured output of a finished tool
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn collect_lines<R: Read + Send + 'static>(stream: Option<R>, name: String) -> Option<thread::JoinHandle<Vec<String>>> {
    stream.map(|stream| {
        thread::spawn(move || {
            BufReader::new(stream)
                .lines()
                .map_while(Result::ok)
                .inspect(|line| log::debug!("[{}] {}", name, line))
                .collect()
        })
    })
}

/// Runs `program` with `args`, succeeding only on exit status 0
pub fn run_tool(program: &Path, args: &[OsString], timeout: Duration) -> Result<ToolOutput, ConversionError> {
    let name = tool_name(program);
    log::info!("Running {} {:?}", program.display(), args);

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConversionError::ExternalToolMissing(name.clone()),
            _ => ConversionError::strategy(&name, format!("failed to start: {}", e)),
        })?;

    let stdout = collect_lines(child.stdout.take(), name.clone());
    let stderr = collect_lines(child.stderr.take(), name.clone());

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if started.elapsed() >= timeout => {
                if let Err(e) = child.kill() {
                    log::warn!("Failed to kill {}: {}", name, e);
                }
                if let Err(e) = child.wait() {
                    log::warn!("Failed to reap {}: {}", name, e);
                }
                return Err(ConversionError::ExternalToolTimeout {
                    tool: name,
                    seconds: timeout.as_secs(),
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(ConversionError::strategy(&name, format!("wait failed: {}", e))),
        }
    };

    let join = |handle: Option<thread::JoinHandle<Vec<String>>>| {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
            .join("\n")
    };
    let output = ToolOutput {
        stdout: join(stdout),
        stderr: join(stderr),
    };

    if status.success() {
        Ok(output)
    } else {
        let reason = match output.stderr.trim() {
            "" => format!("exited with {}", status),
            stderr => format!("exited with {}: {}", status, stderr),
        };
        Err(ConversionError::strategy(&name, reason))
    }
}

/// Checks a tool starts and answers `--version`
pub fn query_version(program: &Path) -> Result<String, ConversionError> {
    let output = run_tool(program, &[OsString::from("--version")], VERSION_QUERY_TIMEOUT)?;
    let version = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    Ok(version.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program() {
        let result = run_tool(
            Path::new("stagehand-no-such-tool"),
            &[],
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ConversionError::ExternalToolMissing(name)) if name == "stagehand-no-such-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_status_and_output() {
        let ok = run_tool(Path::new("sh"), &["-c".into(), "echo hello".into()], Duration::from_secs(10)).unwrap();
        assert_eq!(ok.stdout, "hello");

        let failed = run_tool(
            Path::new("sh"),
            &["-c".into(), "echo broken >&2; exit 3".into()],
            Duration::from_secs(10),
        );
        match failed {
            Err(ConversionError::StrategyFailed { strategy, reason }) => {
                assert_eq!(strategy, "sh");
                assert!(reason.contains("broken"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let result = run_tool(Path::new("sleep"), &["5".into()], Duration::from_millis(200));
        assert!(matches!(result, Err(ConversionError::ExternalToolTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_tool_paths_default() {
        let paths = ToolPaths::default();
        assert_eq!(paths.usdcat, PathBuf::from("usdcat"));
        assert_eq!(paths.fbx2usd, PathBuf::from("fbx2usd"));
    }
}
