//! Excerpt extraction with ffmpeg.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use photocut_core::ExcerptRange;
use photocut_providers::BoxFuture;

/// Default transcoder program, looked up on `PATH`.
pub const FFMPEG: &str = "ffmpeg";

/// Quiet output, errors only.
const FFMPEG_DEFAULT_ARGS: [&str; 3] = ["-hide_banner", "-loglevel", "error"];

/// Errors from running the transcoder.
#[derive(Debug, Error)]
pub enum ExcerptError {
    /// The program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The program that was invoked.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The program ran but reported failure.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// The program that was invoked.
        program: String,
        /// Exit status of the process.
        status: ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// Produces an excerpt of a local video file.
pub trait Excerpter: Send + Sync {
    /// Writes the `range` window of `input` to `output`.
    ///
    /// Completes after the transcoder exits. On failure no partial output
    /// is left behind.
    fn cut<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        range: ExcerptRange,
    ) -> BoxFuture<'a, Result<(), ExcerptError>>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Self::new(FFMPEG)
    }
}

impl Ffmpeg {
    /// Uses the given program path or name.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the configured program.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Verifies that the program can be run.
    pub async fn check_available(&self) -> Result<(), ExcerptError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            return Err(self.failed(output.status, &output.stderr));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        debug!(
            program = %self.program.display(),
            version = version.lines().next().unwrap_or_default(),
            "transcoder available"
        );
        Ok(())
    }

    async fn run_cut(
        &self,
        input: &Path,
        output: &Path,
        range: ExcerptRange,
    ) -> Result<(), ExcerptError> {
        let args = cut_args(input, output, range);
        debug!(program = %self.program.display(), ?args, "running transcoder");

        // ffmpeg is killed if this future is dropped mid-cut.
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let failure = match result {
            Ok(out) if out.status.success() => return Ok(()),
            Ok(out) => self.failed(out.status, &out.stderr),
            Err(source) => self.spawn_error(source),
        };

        remove_partial(output).await;
        Err(failure)
    }

    fn spawn_error(&self, source: std::io::Error) -> ExcerptError {
        ExcerptError::Spawn {
            program: self.program.display().to_string(),
            source,
        }
    }

    fn failed(&self, status: ExitStatus, stderr: &[u8]) -> ExcerptError {
        ExcerptError::Failed {
            program: self.program.display().to_string(),
            status,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

impl Excerpter for Ffmpeg {
    fn cut<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        range: ExcerptRange,
    ) -> BoxFuture<'a, Result<(), ExcerptError>> {
        Box::pin(self.run_cut(input, output, range))
    }
}

/// Builds `-ss <start> -i <input> -t <duration> <output>` behind the default flags.
///
/// Seeking before `-i` makes ffmpeg jump straight to the start offset; the
/// container and codecs follow from the output file name.
pub fn cut_args(input: &Path, output: &Path, range: ExcerptRange) -> Vec<OsString> {
    let mut args: Vec<OsString> = FFMPEG_DEFAULT_ARGS.iter().map(OsString::from).collect();
    args.push("-y".into());
    args.push("-ss".into());
    args.push(range.start().to_string().into());
    args.push(OsStr::new("-i").to_owned());
    args.push(input.as_os_str().to_owned());
    args.push("-t".into());
    args.push(range.duration_secs().to_string().into());
    args.push(output.as_os_str().to_owned());
    args
}

async fn remove_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!(path = %output.display(), "removed partial excerpt"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %output.display(), error = %e, "failed to remove partial excerpt"),
    }
}
