//! Running subprocesses on behalf of a buildpack.

use crate::error::{generate_error_id, BuilderError};
use crate::log::Logger;
use crate::Env;
use crossbeam_utils::thread::ScopedJoinHandle;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{self, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use std::{mem, panic, thread};

const DIVIDER: &str =
    "--------------------------------------------------------------------------------";

/// Selects which part of a failed command's output ends up in the error message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageProducer {
    StdoutTail,
    StdoutHead,
    StderrTail,
    StderrHead,
    #[default]
    CombinedTail,
    CombinedHead,
}

impl MessageProducer {
    #[must_use]
    pub fn produce(self, output: &ExecOutput) -> String {
        match self {
            Self::StdoutTail => crate::builder_output::keep_tail(&output.stdout),
            Self::StdoutHead => crate::builder_output::keep_head(&output.stdout),
            Self::StderrTail => crate::builder_output::keep_tail(&output.stderr),
            Self::StderrHead => crate::builder_output::keep_head(&output.stderr),
            Self::CombinedTail => crate::builder_output::keep_tail(&output.combined),
            Self::CombinedHead => crate::builder_output::keep_head(&output.combined),
        }
    }
}

/// A command to run.
///
/// # Examples
/// ```
/// use gcpcnb::exec::{ExecParams, MessageProducer};
///
/// let params = ExecParams::new(["go", "build", "-o", "/layers/bin/main", "."])
///     .env("CGO_ENABLED", "0")
///     .user_attributed()
///     .message_producer(MessageProducer::StderrTail);
///
/// assert_eq!(params.readable_command(), "go build -o /layers/bin/main . (CGO_ENABLED=0)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecParams {
    pub cmd: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// A failure is the application's fault rather than the buildpack's.
    pub user_failure: bool,
    /// Time spent counts towards the user duration of the build.
    pub user_timing: bool,
    pub message_producer: MessageProducer,
}

impl ExecParams {
    pub fn new(cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn user_failure(mut self) -> Self {
        self.user_failure = true;
        self
    }

    #[must_use]
    pub fn user_timing(mut self) -> Self {
        self.user_timing = true;
        self
    }

    /// Both [`Self::user_failure`] and [`Self::user_timing`].
    #[must_use]
    pub fn user_attributed(self) -> Self {
        self.user_failure().user_timing()
    }

    #[must_use]
    pub fn message_producer(mut self, message_producer: MessageProducer) -> Self {
        self.message_producer = message_producer;
        self
    }

    #[must_use]
    pub fn readable_command(&self) -> String {
        let command = self.cmd.join(" ");
        if self.env.is_empty() {
            return command;
        }

        let env = self
            .env
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{command} ({env})")
    }
}

/// The captured output of a command, trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Stdout and stderr interleaved in the order they were written.
    pub combined: String,
}

/// Runs the command in `params` with `env` as the base environment.
///
/// Output is streamed to stderr while the command runs for user attributed commands, and for
/// every command when debug logging is enabled.
pub(crate) fn run(params: &ExecParams, env: &Env, logger: Logger) -> Result<ExecOutput, BuilderError> {
    let error_id = generate_error_id(&params.cmd);

    let Some(program) = params.cmd.first().filter(|program| !program.is_empty()) else {
        return Err(BuilderError::internal("no command provided").with_id(error_id));
    };

    let log = params.user_failure || logger.debug_enabled();
    let readable_command = params.readable_command();

    if log {
        logger.info(DIVIDER);
        logger.info(format!("Running {readable_command:?}"));
    }

    let start = Instant::now();

    let mut command = Command::new(program);
    command
        .args(&params.cmd[1..])
        .env_clear()
        .envs(env.iter())
        .envs(params.env.iter().map(|(name, value)| (OsString::from(name), OsString::from(value))));

    if let Some(dir) = &params.dir {
        command.current_dir(dir);
    }

    let combined = SharedBuffer::new(log);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let status = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .and_then(|child| {
            write_child_process_output(
                child,
                tee(&mut stdout, combined.clone()),
                tee(&mut stderr, combined.clone()),
            )
        })
        .and_then(|mut child| child.wait())
        .map_err(|error| {
            let hint = if error.kind() == io::ErrorKind::NotFound {
                ": ensure script does not have CR-LF line endings"
            } else {
                ""
            };
            BuilderError::internal(format!(
                "executing command {readable_command:?}: {error}{hint}"
            ))
            .with_id(error_id.clone())
        })?;

    if log {
        let mut truncated = readable_command.clone();
        if truncated.len() > 60 {
            let mut end = 60;
            while !truncated.is_char_boundary(end) {
                end -= 1;
            }
            truncated.truncate(end);
            truncated.push_str("...");
        }
        logger.info(format!("Done {truncated:?} ({:?})", start.elapsed()));
    }

    let output = ExecOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        combined: String::from_utf8_lossy(&combined.contents()).trim().to_string(),
    };

    if status.success() {
        return Ok(output);
    }

    let mut message = params.message_producer.produce(&output);
    if message.is_empty() {
        message = format!(
            "executing command {readable_command:?}: exit code {}",
            output.exit_code
        );
    }

    let error = if params.user_failure {
        BuilderError::user(message)
    } else {
        BuilderError::internal(message)
    };

    Err(error.with_id(error_id))
}

// Collects both output streams, optionally echoing them to stderr.
#[derive(Clone)]
struct SharedBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
    echo: bool,
}

impl SharedBuffer {
    fn new(echo: bool) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            echo,
        }
    }

    fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.echo {
            io::stderr().write_all(buf)?;
        }
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.echo {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

fn tee<A: Write, B: Write>(a: A, b: B) -> TeeWrite<A, B> {
    TeeWrite {
        inner_a: a,
        inner_b: b,
    }
}

struct TeeWrite<A: Write, B: Write> {
    inner_a: A,
    inner_b: B,
}

impl<A: Write, B: Write> Write for TeeWrite<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner_a.write_all(buf)?;
        self.inner_b.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_a.flush()?;
        self.inner_b.flush()
    }
}

// Both streams are copied on their own thread so that interleaved output stays interleaved.
fn write_child_process_output<OW: Write + Send, EW: Write + Send>(
    mut child: process::Child,
    mut stdout_writer: OW,
    mut stderr_writer: EW,
) -> io::Result<process::Child> {
    unwind_panic(crossbeam_utils::thread::scope(|scope| {
        let stdout_copy_thread = mem::take(&mut child.stdout)
            .map(|mut stdout| scope.spawn(move |_| io::copy(&mut stdout, &mut stdout_writer)));

        let stderr_copy_thread = mem::take(&mut child.stderr)
            .map(|mut stderr| scope.spawn(move |_| io::copy(&mut stderr, &mut stderr_writer)));

        let stdout_copy_result = stdout_copy_thread.map_or_else(|| Ok(0), join_and_unwind_panic);
        let stderr_copy_result = stderr_copy_thread.map_or_else(|| Ok(0), join_and_unwind_panic);

        stdout_copy_result.and(stderr_copy_result).map(|_| child)
    }))
}

fn join_and_unwind_panic<T>(handle: ScopedJoinHandle<T>) -> T {
    unwind_panic(handle.join())
}

fn unwind_panic<T>(result: thread::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic::resume_unwind(error),
    }
}
