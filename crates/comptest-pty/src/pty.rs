use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

/// The terminal interrupt character (`^C`).
///
/// Writing it to the master side makes the line discipline raise SIGINT in
/// the foreground process group, which is how a pending input line is
/// abandoned without killing the shell.
pub const INTERRUPT: u8 = 0x03;

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    IoError(std::io::Error),
    /// The handle no longer has a live peer to talk to.
    Closed,
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::IoError(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::Closed => write!(f, "PTY is closed"),
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::IoError(err)
    }
}

/// Describes the process to start inside a new PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

impl SpawnOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            rows: 24,
            cols: 80,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn size(mut self, rows: u16, cols: u16) -> Self {
        self.rows = rows;
        self.cols = cols;
        self
    }

    fn command(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Owns a portable-pty child process, master pair, reader, and writer.
pub struct PtyHandle {
    // Held so the master side of the PTY stays open for the child's lifetime.
    _master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    exit_code: Option<u32>,
}

impl PtyHandle {
    /// Spawn a new PTY running the process described by `options`.
    pub fn spawn(options: &SpawnOptions) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(options.command())
            .map_err(|e| {
                PtyError::SpawnFailed(format!("failed to spawn {}: {e}", options.program))
            })?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        log::debug!(
            "spawned {} {:?} (pid {:?})",
            options.program,
            options.args,
            child.process_id()
        );

        Ok(Self {
            _master: pair.master,
            reader: Some(reader),
            writer,
            child,
            exit_code: None,
        })
    }

    /// Extract the PTY reader so it can be drained from a dedicated thread.
    ///
    /// Returns `None` if the reader was already taken.
    pub fn take_reader(&mut self) -> Option<Box<dyn Read + Send>> {
        self.reader.take()
    }

    /// Write bytes to the PTY master (keystrokes -> shell).
    pub fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Deliver the interrupt character to the foreground process.
    pub fn send_interrupt(&mut self) -> Result<(), PtyError> {
        self.write(&[INTERRUPT])
    }

    /// Check if the child process is still alive.
    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running.
    pub fn try_wait(&mut self) -> Option<u32> {
        if self.exit_code.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit_code = Some(status.exit_code());
            }
        }
        self.exit_code
    }

    /// Ask the child to leave by writing `goodbye`, then kill it if it is
    /// still around after `grace`.
    ///
    /// Never fails: a child that already exited, a closed PTY, or a failed
    /// kill are all logged and otherwise ignored. Returns the exit code when
    /// one could be collected.
    pub fn terminate(&mut self, goodbye: &[u8], grace: Duration) -> Option<u32> {
        if let Some(code) = self.try_wait() {
            return Some(code);
        }

        if let Err(e) = self.write(goodbye) {
            log::debug!("could not write to exiting PTY child: {e}");
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(code) = self.try_wait() {
                return Some(code);
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        log::debug!("PTY child ignored exit request for {grace:?}, killing it");
        if let Err(e) = self.child.kill() {
            log::debug!("kill failed (child probably gone): {e}");
        }
        match self.child.wait() {
            Ok(status) => {
                self.exit_code = Some(status.exit_code());
                self.exit_code
            }
            Err(e) => {
                log::debug!("could not reap PTY child: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn sh() -> SpawnOptions {
        SpawnOptions::new("/bin/sh").size(24, 80)
    }

    #[test]
    fn test_spawn_pty() {
        let handle = PtyHandle::spawn(&sh());
        assert!(handle.is_ok(), "Failed to spawn PTY: {:?}", handle.err());
        let mut handle = handle.unwrap();
        assert!(handle.is_alive());
        assert!(handle.take_reader().is_some());
        assert!(handle.take_reader().is_none());
    }

    #[test]
    fn test_spawn_missing_program() {
        let result = PtyHandle::spawn(&SpawnOptions::new("/definitely/not/a/shell"));
        assert!(matches!(result, Err(PtyError::SpawnFailed(_))));
    }

    #[test]
    fn test_spawn_options_builder() {
        let options = SpawnOptions::new("bash")
            .args(["--norc", "--noprofile"])
            .cwd("/tmp")
            .env("TERM", "dumb")
            .size(24, 240);

        assert_eq!(options.args, vec!["--norc", "--noprofile"]);
        assert_eq!(options.cwd, Some(PathBuf::from("/tmp")));
        assert_eq!(options.env, vec![("TERM".to_string(), "dumb".to_string())]);
        assert_eq!((options.rows, options.cols), (24, 240));
    }

    #[test]
    fn test_terminate_running_child() {
        let mut handle = PtyHandle::spawn(&sh()).unwrap();
        // Drain output so the child never blocks on a full PTY buffer.
        let mut reader = handle.take_reader().unwrap();
        let drain = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            while let Ok(n) = reader.read(&mut buf) {
                if n == 0 {
                    break;
                }
            }
        });

        let code = handle.terminate(b"exit 3\n", Duration::from_secs(3));
        assert_eq!(code, Some(3));
        assert!(!handle.is_alive());
        drop(handle);
        let _ = drain.join();
    }

    #[test]
    fn test_terminate_is_repeatable() {
        let mut handle = PtyHandle::spawn(&sh()).unwrap();
        let first = handle.terminate(b"exit 0\n", Duration::from_secs(3));
        assert!(first.is_some());

        // A second terminate must not fail even though the child is gone.
        let second = handle.terminate(b"exit 0\n", Duration::from_millis(100));
        assert_eq!(first, second);
    }

    #[test]
    fn test_terminate_kills_stubborn_child() {
        // `sleep` ignores the goodbye text entirely.
        let mut handle =
            PtyHandle::spawn(&SpawnOptions::new("sleep").args(["30"])).unwrap();
        let started = Instant::now();
        handle.terminate(b"exit\n", Duration::from_millis(200));
        assert!(!handle.is_alive());
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
