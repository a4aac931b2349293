use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use comptest_core::{shell_quote, SessionConfig};

/// Where bash-completion's entry script usually lives, most specific first.
pub const BASH_COMPLETION_CANDIDATES: &[&str] = &[
    "/opt/homebrew/share/bash-completion/bash_completion",
    "/usr/local/share/bash-completion/bash_completion",
    "/usr/share/bash-completion/bash_completion",
];

#[derive(Parser, Debug)]
#[command(name = "comptest")]
#[command(version, about = "Ask a live interactive bash what TAB completes to", long_about = None)]
pub struct Cli {
    /// Command line to complete (TAB is pressed at its end)
    #[arg(value_name = "CMD")]
    pub cmd: String,

    /// Files to source before attempting completion
    #[arg(short = 'f', long = "init-files", value_name = "FILE", num_args = 1..)]
    pub init_files: Vec<PathBuf>,

    /// Commands to run before attempting completion (repeatable)
    #[arg(short = 'c', long = "init-command", value_name = "CMD")]
    pub init_commands: Vec<String>,

    /// Working directory to be in
    #[arg(short = 'd', value_name = "DIRECTORY")]
    pub directory: Option<PathBuf>,

    /// Load bash completion from the usual install locations
    #[arg(long = "load-bash-completion")]
    pub load_bash_completion: bool,

    /// Activate xtrace (set -x), written to the log file
    #[arg(short = 'x')]
    pub xtrace: bool,

    /// Log file for xtrace output [default: ~/.log.txt]
    #[arg(long = "log", value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Append the raw terminal session to this file
    #[arg(long = "transcript", value_name = "FILE")]
    pub transcript: Option<PathBuf>,

    /// Seconds to wait for the shell to settle after TAB
    #[arg(long = "timeout", value_name = "SECS", default_value = "1", value_parser = parse_timeout)]
    pub timeout: Duration,

    /// Shell to drive
    #[arg(long = "shell", value_name = "PATH", default_value = "bash")]
    pub shell: String,

    /// Succeed only if the candidates are exactly these
    #[arg(long = "expect", value_name = "CANDIDATE", num_args = 1.., conflicts_with = "expect_single")]
    pub expect: Option<Vec<String>>,

    /// Succeed only if TAB inserts exactly this text as the single completion
    #[arg(long = "expect-single", value_name = "TEXT")]
    pub expect_single: Option<String>,

    /// Print the result as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

/// Problems with the arguments that surface before a shell is started.
#[derive(Debug)]
pub enum CliError {
    BashCompletionNotFound(Vec<String>),
    NoHomeForLog,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::BashCompletionNotFound(candidates) => write!(
                f,
                "loading bash completion requested but none of {candidates:?} exist"
            ),
            CliError::NoHomeForLog => {
                write!(f, "-x needs --log because $HOME is not set")
            }
        }
    }
}

impl std::error::Error for CliError {}

impl Cli {
    /// Translate the arguments into a session configuration, searching
    /// `completion_candidates` when `--load-bash-completion` is given.
    pub fn session_config(&self, completion_candidates: &[&str]) -> Result<SessionConfig, CliError> {
        let mut config = SessionConfig::new().with_shell(&self.shell);
        if let Some(dir) = &self.directory {
            config = config.with_working_dir(dir);
        }
        if let Some(path) = &self.transcript {
            config = config.with_transcript(path);
        }

        for file in &self.init_files {
            config = config.with_init_file(file);
        }
        if self.load_bash_completion {
            let found = locate_bash_completion(completion_candidates).ok_or_else(|| {
                CliError::BashCompletionNotFound(
                    completion_candidates.iter().map(|c| c.to_string()).collect(),
                )
            })?;
            config = config.with_init_file(found);
        }

        if self.xtrace {
            let log = match &self.log {
                Some(log) => log.clone(),
                None => home_dir().ok_or(CliError::NoHomeForLog)?.join(".log.txt"),
            };
            let log = shell_quote(&log.to_string_lossy());
            config = config
                .with_init_command(format!("exec {{BASH_XTRACEFD}}>>{log}"))
                .with_init_command("set -x");
        }
        for command in &self.init_commands {
            config = config.with_init_command(command);
        }

        Ok(config)
    }
}

/// First existing path among `candidates`.
pub fn locate_bash_completion(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(Path::new)
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
}

fn parse_timeout(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|e| format!("not a number of seconds: {e}"))?;
    if secs <= 0.0 {
        return Err("timeout must be positive".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

/// Get the user's home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
