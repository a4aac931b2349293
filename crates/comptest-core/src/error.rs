use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use comptest_pty::PtyError;

/// Why an expected piece of text never showed up.
#[derive(Debug)]
pub enum SyncCause {
    /// The bound for this step elapsed first.
    TimedOut(Duration),
    /// The shell's output stream ended.
    PeerClosed,
    /// Keystrokes could not be delivered.
    Write(PtyError),
}

/// An echo or prompt that the protocol relies on was not observed.
///
/// Fatal to the session: the driver no longer knows where the shell is.
#[derive(Debug)]
pub struct SyncError {
    pub expected: String,
    pub cause: SyncCause,
    /// Sanitized output captured while waiting.
    pub output: String,
}

impl SyncError {
    pub fn new(expected: impl Into<String>, cause: SyncCause, output: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            cause,
            output: output.into(),
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            SyncCause::TimedOut(after) => write!(
                f,
                "lost sync: {:?} not seen within {after:?} (output so far: {:?})",
                self.expected, self.output
            ),
            SyncCause::PeerClosed => write!(
                f,
                "lost sync: shell exited while waiting for {:?} (output so far: {:?})",
                self.expected, self.output
            ),
            SyncCause::Write(err) => write!(f, "lost sync: could not send input: {err}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            SyncCause::Write(err) => Some(err),
            _ => None,
        }
    }
}

/// Interrupt-and-resync recovery failed; the session must be discarded.
#[derive(Debug)]
pub struct BrokenError {
    pub reason: String,
    pub output: String,
}

impl BrokenError {
    pub fn new(reason: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for BrokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.output.is_empty() {
            write!(f, "session broken: {}", self.reason)
        } else {
            write!(f, "session broken: {} (output: {:?})", self.reason, self.output)
        }
    }
}

impl std::error::Error for BrokenError {}

/// No session could be produced.
#[derive(Debug)]
pub enum StartupError {
    InvalidConfig(String),
    InitFileMissing(PathBuf),
    Spawn(PtyError),
    /// The sentinel prompt never appeared after assigning `PS1`.
    PromptNotSeen(SyncError),
    /// An init file or command ran but left a failing status.
    InitFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },
    /// A bootstrap command did not resynchronize on the prompt.
    Sync { command: String, source: SyncError },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::InvalidConfig(msg) => write!(f, "invalid session config: {msg}"),
            StartupError::InitFileMissing(path) => {
                write!(f, "init file {} does not exist", path.display())
            }
            StartupError::Spawn(err) => write!(f, "could not start shell: {err}"),
            StartupError::PromptNotSeen(err) => write!(f, "shell prompt never appeared: {err}"),
            StartupError::InitFailed {
                command,
                status: Some(status),
                output,
            } => write!(f, "`{command}` exited with status {status}: {output}"),
            StartupError::InitFailed {
                command, output, ..
            } => write!(f, "`{command}` reported no exit status: {output}"),
            StartupError::Sync { command, source } => {
                write!(f, "bootstrap command `{command}` failed: {source}")
            }
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Spawn(err) => Some(err),
            StartupError::PromptNotSeen(err) => Some(err),
            StartupError::Sync { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PtyError> for StartupError {
    fn from(err: PtyError) -> Self {
        StartupError::Spawn(err)
    }
}

/// Error type of every [`Session`](crate::Session) operation once the
/// session is up. Bootstrap failures are [`StartupError`]s instead.
///
/// `Sync` and `Broken` leave the session unusable.
#[derive(Debug)]
pub enum SessionError {
    Sync(SyncError),
    Broken(BrokenError),
    /// The session was closed by the caller.
    Closed,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Sync(err) => write!(f, "{err}"),
            SessionError::Broken(err) => write!(f, "{err}"),
            SessionError::Closed => write!(f, "session is closed"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Sync(err) => Some(err),
            SessionError::Broken(err) => Some(err),
            SessionError::Closed => None,
        }
    }
}

impl From<SyncError> for SessionError {
    fn from(err: SyncError) -> Self {
        SessionError::Sync(err)
    }
}

impl From<BrokenError> for SessionError {
    fn from(err: BrokenError) -> Self {
        SessionError::Broken(err)
    }
}
