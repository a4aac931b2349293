use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StartupError;

/// Prompt written into `PS1`. Short, and unlikely to show up in a command
/// echo or in completion text.
pub const DEFAULT_PROMPT_SENTINEL: &str = "@/";

/// Readline variables applied with `bind "set ..."` during bootstrap.
pub const DEFAULT_READLINE_DIRECTIVES: &[&str] = &[
    // Paging would stop the listing before the prompt comes back.
    "page-completions off",
    // Never ask "Display all N possibilities?".
    "completion-query-items -1",
    // One candidate per line.
    "completion-display-width 0",
    // List on the first TAB instead of ringing the bell.
    "show-all-if-ambiguous on",
    "bell-style none",
    "colored-completion-prefix off",
    "colored-stats off",
    "enable-bracketed-paste off",
];

/// Everything needed to bring up a completion-test session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub shell: String,
    pub shell_args: Vec<String>,
    /// Defaults to the caller's current directory.
    pub working_dir: Option<PathBuf>,
    /// Sourced in order after readline setup.
    pub init_files: Vec<PathBuf>,
    /// Run in order after the init files.
    pub init_commands: Vec<String>,
    pub prompt_sentinel: String,
    pub term: String,
    pub rows: u16,
    pub cols: u16,
    /// Budget for the first prompt and for each bootstrap command.
    pub startup_timeout: Duration,
    /// Budget for echoes and prompts inside queries, and for resynchronizing
    /// after an interrupt.
    pub sync_timeout: Duration,
    /// How long `exit` gets before the shell is killed.
    pub close_timeout: Duration,
    /// Raw session bytes are appended here when set.
    pub transcript: Option<PathBuf>,
    pub readline_directives: Vec<String>,
    /// Fail bootstrap when an init file or command leaves a non-zero `$?`.
    pub check_init_status: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            shell_args: vec!["--norc".to_string(), "--noprofile".to_string()],
            working_dir: None,
            init_files: Vec::new(),
            init_commands: Vec::new(),
            prompt_sentinel: DEFAULT_PROMPT_SENTINEL.to_string(),
            term: "dumb".to_string(),
            rows: 24,
            cols: 240,
            startup_timeout: Duration::from_secs(10),
            sync_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(2),
            transcript: None,
            readline_directives: DEFAULT_READLINE_DIRECTIVES
                .iter()
                .map(|d| d.to_string())
                .collect(),
            check_init_status: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_init_file(mut self, path: impl AsRef<Path>) -> Self {
        self.init_files.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_init_command(mut self, command: impl Into<String>) -> Self {
        self.init_commands.push(command.into());
        self
    }

    pub fn with_prompt_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.prompt_sentinel = sentinel.into();
        self
    }

    pub fn with_transcript(mut self, path: impl AsRef<Path>) -> Self {
        self.transcript = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_check_init_status(mut self, check: bool) -> Self {
        self.check_init_status = check;
        self
    }

    /// Reject configurations that could never synchronize, before anything
    /// is spawned.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.prompt_sentinel.is_empty() {
            return Err(StartupError::InvalidConfig(
                "prompt sentinel must not be empty".to_string(),
            ));
        }
        if self.prompt_sentinel.contains(['\r', '\n']) {
            return Err(StartupError::InvalidConfig(
                "prompt sentinel must fit on one line".to_string(),
            ));
        }
        if self.shell.is_empty() {
            return Err(StartupError::InvalidConfig("shell must not be empty".to_string()));
        }
        if let Some(command) = self.init_commands.iter().find(|c| c.contains('\n')) {
            return Err(StartupError::InvalidConfig(format!(
                "init command spans several lines: {command:?}"
            )));
        }
        if let Some(missing) = self.init_files.iter().find(|f| !f.is_file()) {
            return Err(StartupError::InitFileMissing(missing.clone()));
        }
        Ok(())
    }

    /// The directory the shell starts in, made absolute and symlink-free.
    pub fn resolve_working_dir(&self) -> Result<PathBuf, StartupError> {
        let dir = match &self.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| {
                StartupError::InvalidConfig(format!("cannot determine current directory: {e}"))
            })?,
        };
        dir.canonicalize().map_err(|e| {
            StartupError::InvalidConfig(format!(
                "working directory {} is not usable: {e}",
                dir.display()
            ))
        })
    }
}
