use anyhow::{Context, Result};

use std::ffi::OsStr;
use std::{fs, time::Duration};
use subprocess::{ExitStatus, Popen, PopenConfig, Redirection};

/// Result of compiling and running one generated program.
pub struct RunResult {
    /// Compiler diagnostics when compilation failed, program output otherwise.
    pub output: String,
    /// `true` if the program successfully compiled.
    pub compilation: bool,
    /// `true` if the program terminated within the time limit.
    pub termination: bool,
    /// `true` if the program exited with status 0, i.e. its assertion held.
    pub exit_ok: bool,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.compilation && self.termination && self.exit_ok
    }
}

/// Run `argv` for a bounded number of seconds, returning its merged output
/// and its exit status, or `None` if it had to be killed.
fn bounded(argv: &[&OsStr], timeout: Duration) -> Result<(String, Option<ExitStatus>)> {
    let mut p = Popen::create(
        argv,
        PopenConfig {
            stdout: Redirection::Pipe,
            stderr: Redirection::Merge,
            ..Default::default()
        },
    )
    .with_context(|| format!("unable to start {:?}", argv[0]))?;

    let read = p.communicate_start(None).limit_time(timeout).read();
    let captured = match read {
        Ok((out, _)) => out,
        Err(err) => err.capture.0,
    };
    let output = String::from_utf8_lossy(&captured.unwrap_or_default()).into_owned();

    let status = match p.wait_timeout(Duration::from_millis(100))? {
        Some(status) => Some(status),
        None => {
            p.kill()?;
            p.wait()?;
            None
        }
    };
    Ok((output, status))
}

/// Compile `program` with `cc` and run the binary.
///
/// # Arguments
/// - `cc`: the C compiler to invoke, e.g. `cc` or `clang`
/// - `program`: the *raw C source*, not a file
/// - `timeout`: seconds allowed to each of the two steps; defaults to 5
pub fn run(cc: &str, program: &str, timeout: Option<u64>) -> Result<RunResult> {
    let timeout = Duration::from_secs(timeout.unwrap_or(5));
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("case.c");
    let binary = dir.path().join("case");
    fs::write(&source, program)?;

    let (diagnostics, status) = bounded(
        &[
            OsStr::new(cc),
            OsStr::new("-w"),
            OsStr::new("-o"),
            binary.as_os_str(),
            source.as_os_str(),
        ],
        timeout,
    )?;
    if !matches!(status, Some(ExitStatus::Exited(0))) {
        return Ok(RunResult {
            output: diagnostics,
            compilation: false,
            termination: status.is_some(),
            exit_ok: false,
        });
    }

    let (output, status) = bounded(&[binary.as_os_str()], timeout)?;
    Ok(RunResult {
        output,
        compilation: true,
        termination: status.is_some(),
        exit_ok: matches!(status, Some(ExitStatus::Exited(0))),
    })
}
