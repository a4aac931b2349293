//! Bringing a shell from "just spawned" to "idle at the sentinel prompt,
//! configured for parseable completion output".

use std::path::PathBuf;
use std::time::Duration;

use comptest_pty::{
    open_transcript, start_output_pump, OutputReceiver, PtyError, PtyHandle, SpawnOptions,
};
use log::{debug, info};

use crate::config::SessionConfig;
use crate::error::{StartupError, SyncError};
use crate::session::Session;
use crate::terminal::Terminal;

impl Session<PtyHandle> {
    /// Spawn the configured shell in a PTY and bootstrap it.
    pub async fn start(config: SessionConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let working_dir = config.resolve_working_dir()?;

        let options = SpawnOptions::new(&config.shell)
            .args(config.shell_args.iter().cloned())
            .cwd(&working_dir)
            .env("TERM", &config.term)
            .size(config.rows, config.cols);
        let mut pty = PtyHandle::spawn(&options)?;

        let transcript = match &config.transcript {
            Some(path) => Some(open_transcript(path)?),
            None => None,
        };
        let Some(reader) = pty.take_reader() else {
            return Err(StartupError::Spawn(PtyError::SpawnFailed(
                "PTY reader already taken".to_string(),
            )));
        };
        let output = start_output_pump("shell", reader, transcript)?;

        info!(
            "started {} in {} (TERM={})",
            config.shell,
            working_dir.display(),
            config.term
        );
        Session::establish(pty, output, &config, working_dir).await
    }
}

impl<T: Terminal> Session<T> {
    /// Bootstrap an already-running shell: install the sentinel prompt, turn
    /// off job control, configure readline, then source the init files and
    /// run the init commands, in that order.
    ///
    /// On failure the partially set up session is dropped, which closes the
    /// terminal.
    pub async fn establish(
        terminal: T,
        output: OutputReceiver,
        config: &SessionConfig,
        working_dir: PathBuf,
    ) -> Result<Self, StartupError> {
        let mut session = Session::new(
            terminal,
            output,
            config.prompt_sentinel.clone(),
            working_dir,
            config.sync_timeout,
            config.close_timeout,
        );

        session.install_prompt(config.startup_timeout).await?;
        session.setup("set +m", config.startup_timeout).await?;
        for directive in &config.readline_directives {
            let command = format!("bind \"set {directive}\"");
            session.setup(&command, config.startup_timeout).await?;
        }

        for file in &config.init_files {
            let command = format!("source {}", shell_quote(&file.to_string_lossy()));
            session.init(&command, config).await?;
        }
        for command in &config.init_commands {
            session.init(command, config).await?;
        }

        debug!("session ready at prompt {:?}", config.prompt_sentinel);
        Ok(session)
    }

    /// Set `PS1` to the sentinel and wait for the first sentinel prompt.
    ///
    /// Typed-ahead input may be echoed twice (once by the tty before readline
    /// starts, once by readline), so the prompt is only accepted at the start
    /// of a line.
    async fn install_prompt(&mut self, timeout: Duration) -> Result<(), StartupError> {
        let assignment = format!("PS1={}", shell_quote(self.prompt_sentinel()));
        debug!("installing prompt: {assignment}");
        self.send_line(&assignment)?;
        self.expect(&assignment, timeout)
            .await
            .map_err(StartupError::PromptNotSeen)?;
        let first_prompt = format!("\n{}", self.prompt_sentinel());
        self.expect(&first_prompt, timeout)
            .await
            .map_err(StartupError::PromptNotSeen)?;
        Ok(())
    }

    /// Configuration command: must come back to the prompt, output ignored.
    async fn setup(&mut self, command: &str, timeout: Duration) -> Result<(), StartupError> {
        self.exchange(command, timeout)
            .await
            .map(|_| ())
            .map_err(|source| sync_failure(command, source))
    }

    /// Init file or command: must come back to the prompt and, when
    /// configured, leave `$?` at zero.
    async fn init(&mut self, command: &str, config: &SessionConfig) -> Result<(), StartupError> {
        let output = self
            .exchange(command, config.startup_timeout)
            .await
            .map_err(|source| sync_failure(command, source))?;
        debug!("`{command}` -> {output:?}");

        if !config.check_init_status {
            return Ok(());
        }
        let status_output = self
            .exchange("echo $?", config.startup_timeout)
            .await
            .map_err(|source| sync_failure(command, source))?;
        let status = status_output
            .lines()
            .last()
            .and_then(|line| line.trim().parse::<i32>().ok());
        if status == Some(0) {
            Ok(())
        } else {
            Err(StartupError::InitFailed {
                command: command.to_string(),
                status,
                output,
            })
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), StartupError> {
        self.terminal_mut()
            .write(format!("{line}\n").as_bytes())
            .map_err(StartupError::Spawn)
    }
}

fn sync_failure(command: &str, source: SyncError) -> StartupError {
    StartupError::Sync {
        command: command.to_string(),
        source,
    }
}

/// Quote `text` as a single bash word.
pub fn shell_quote(text: &str) -> String {
    if !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+,:@%".contains(c))
    {
        return text.to_string();
    }
    format!("'{}'", text.replace('\'', r"'\''"))
}
