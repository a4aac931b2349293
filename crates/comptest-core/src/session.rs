use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use comptest_pty::{OutputReceiver, PtyHandle};
use log::{debug, warn};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::Instant;

use crate::error::{BrokenError, SessionError, SyncCause, SyncError};
use crate::expect::{Expecter, Match, ReadOutcome};
use crate::result::CompletionResult;
use crate::terminal::Terminal;

/// How long to wait for the prompt after `^C` before pressing it again.
/// Bash drops an interrupt that arrives mid-redisplay without redrawing.
const INTERRUPT_RETRY: Duration = Duration::from_millis(250);

/// Where a session is in its conversation with the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// At the prompt, ready for input.
    Idle,
    /// Input sent; waiting for the shell to echo it.
    AwaitingEcho,
    /// Echo seen; waiting for the prompt (or, for queries, for the timeout).
    AwaitingPromptOrTimeout,
    /// Interrupt sent; waiting for the prompt to come back.
    Interrupting,
    /// Synchronization was lost. Terminal state.
    Broken,
    /// Closed by the caller. Terminal state.
    Closed,
}

/// One interactive shell and the synchronization state of the conversation
/// with it.
///
/// Operations take `&mut self`: queries against one session are strictly
/// sequential. Run separate sessions to test in parallel.
pub struct Session<T: Terminal = PtyHandle> {
    terminal: T,
    expecter: Expecter,
    sentinel: String,
    working_dir: PathBuf,
    sync_timeout: Duration,
    close_timeout: Duration,
    state: SessionState,
}

impl<T: Terminal> Session<T> {
    /// Wrap a terminal whose output arrives on `output`. The session starts
    /// `Idle` with no prompt installed yet; [`Session::establish`] does that.
    pub(crate) fn new(
        terminal: T,
        output: OutputReceiver,
        sentinel: String,
        working_dir: PathBuf,
        sync_timeout: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            terminal,
            expecter: Expecter::new(output),
            sentinel,
            working_dir,
            sync_timeout,
            close_timeout,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompt_sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub(crate) fn terminal_mut(&mut self) -> &mut T {
        &mut self.terminal
    }

    /// Run `command` as a full line and return what it printed.
    ///
    /// Advances shell state (variables, directory, definitions) for every
    /// later call on this session.
    pub async fn run_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        self.ensure_idle()?;
        match self.exchange(command, timeout).await {
            Ok(output) => Ok(output),
            Err(err) => Err(self.lose_sync(err)),
        }
    }

    /// Type `input` followed by TAB and report what the shell offered.
    ///
    /// `timeout` bounds the wait for the prompt to come back after the echo.
    /// Running out of it is the normal way a single inline completion, or
    /// no completion at all, shows up, so it is not an error.
    pub async fn query_completions(
        &mut self,
        input: &str,
        timeout: Duration,
    ) -> Result<CompletionResult, SessionError> {
        self.ensure_idle()?;
        debug!("sending '{input}\\t'");
        self.send_keys(format!("{input}\t").as_bytes())?;
        self.await_echo(input).await?;

        self.set_state(SessionState::AwaitingPromptOrTimeout);
        let sentinel = self.sentinel.clone();
        let result = match self.expecter.read_until(&sentinel, timeout).await {
            ReadOutcome::Matched(Match { before, .. }) => {
                debug!("prompt came back, listing = {before:?}");
                CompletionResult::from_listing(input, &before)
            }
            ReadOutcome::TimedOut { pending } => {
                debug!("timeout reached, captured = {pending:?}");
                CompletionResult::from_inline(input, &pending)
            }
            ReadOutcome::Closed { pending } => {
                let err = SyncError::new(sentinel, SyncCause::PeerClosed, pending);
                return Err(self.lose_sync(err));
            }
        };

        self.resynchronize().await?;
        debug!("completion for {input:?}: {result:?}");
        Ok(result)
    }

    /// Strictly check that `input` + TAB produces exactly `expected` as a
    /// single inline completion.
    ///
    /// A line break before `expected` means a listing was shown instead; that
    /// is logged as a warning and reported as `false` rather than an error.
    pub async fn query_single_candidate(
        &mut self,
        input: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<bool, SessionError> {
        self.ensure_idle()?;
        debug!("sending '{input}\\t', expecting {expected:?}");
        self.send_keys(format!("{input}\t").as_bytes())?;
        self.await_echo(input).await?;

        self.set_state(SessionState::AwaitingPromptOrTimeout);
        let found = match self.expecter.read_until(expected, timeout).await {
            ReadOutcome::Matched(found) => found,
            ReadOutcome::TimedOut { .. } => {
                debug!("timeout reached waiting for {expected:?}");
                self.resynchronize().await?;
                return Ok(false);
            }
            ReadOutcome::Closed { pending } => {
                let err = SyncError::new(expected, SyncCause::PeerClosed, pending);
                return Err(self.lose_sync(err));
            }
        };

        debug!("before = {:?}", found.before);
        if found.before.contains('\n') {
            warn!(
                "line break between {input:?} and {expected:?}: more than one candidate was \
                 listed; either the expectation is wrong or this needs a multi-candidate check"
            );
            // A listing always ends with the prompt redrawn; let it arrive
            // so it cannot be mistaken for the one after the interrupt.
            let sentinel = self.sentinel.clone();
            if let ReadOutcome::Closed { pending } =
                self.expecter.read_until(&sentinel, timeout).await
            {
                let err = SyncError::new(sentinel, SyncCause::PeerClosed, pending);
                return Err(self.lose_sync(err));
            }
            self.resynchronize().await?;
            return Ok(false);
        }

        self.resynchronize().await?;
        debug!("expected = {expected:?}, completion = {:?}", found.matched);
        Ok(found.matched == expected)
    }

    /// Check that `input` + TAB offers exactly the `expected` candidates.
    pub async fn expect_multiple_candidates<I, S>(
        &mut self,
        input: &str,
        expected: I,
        timeout: Duration,
    ) -> Result<bool, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: BTreeSet<String> = expected.into_iter().map(Into::into).collect();
        let actual = self.query_completions(input, timeout).await?.candidates();
        if actual != expected {
            debug!(
                "expected - actual = {:?}, actual - expected = {:?}",
                expected.difference(&actual).collect::<Vec<_>>(),
                actual.difference(&expected).collect::<Vec<_>>()
            );
        }
        Ok(actual == expected)
    }

    /// Ask the shell to exit and reap it. Safe to call more than once and
    /// after the shell has already died.
    ///
    /// Waits up to `close_timeout` for the shell to leave. On a multi-thread
    /// runtime the wait is moved off the worker with `block_in_place`; on a
    /// current-thread runtime it blocks that thread.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        debug!("closing session in state {:?}", self.state);
        let grace = self.close_timeout;
        let terminal = &mut self.terminal;
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| terminal.close(grace))
            }
            _ => terminal.close(grace),
        }
        self.set_state(SessionState::Closed);
    }

    /// Send `command` + newline, wait for its echo, then for the prompt.
    /// Returns the output in between with line endings normalized.
    pub(crate) async fn exchange(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, SyncError> {
        debug!("cmd='{command}'");
        self.set_state(SessionState::AwaitingEcho);
        self.terminal
            .write(format!("{command}\n").as_bytes())
            .map_err(|e| SyncError::new(command, SyncCause::Write(e), ""))?;
        self.expect(command, timeout).await?;
        self.expect("\n", timeout).await?;

        self.set_state(SessionState::AwaitingPromptOrTimeout);
        let sentinel = self.sentinel.clone();
        let prompt = self.expect(&sentinel, timeout).await?;
        debug!("found prompt after command '{command}'");
        self.set_state(SessionState::Idle);
        Ok(normalize_output(&prompt.before))
    }

    /// Wait for `pattern`, turning anything but a match into a [`SyncError`].
    pub(crate) async fn expect(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<Match, SyncError> {
        match self.expecter.read_until(pattern, timeout).await {
            ReadOutcome::Matched(m) => Ok(m),
            ReadOutcome::TimedOut { pending } => Err(SyncError::new(
                pattern,
                SyncCause::TimedOut(timeout),
                pending,
            )),
            ReadOutcome::Closed { pending } => {
                Err(SyncError::new(pattern, SyncCause::PeerClosed, pending))
            }
        }
    }

    fn send_keys(&mut self, keys: &[u8]) -> Result<(), SessionError> {
        self.set_state(SessionState::AwaitingEcho);
        if let Err(e) = self.terminal.write(keys) {
            let err = SyncError::new(
                String::from_utf8_lossy(keys),
                SyncCause::Write(e),
                self.expecter.pending(),
            );
            return Err(self.lose_sync(err));
        }
        Ok(())
    }

    async fn await_echo(&mut self, input: &str) -> Result<(), SessionError> {
        let timeout = self.sync_timeout;
        match self.expect(input, timeout).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.lose_sync(err)),
        }
    }

    /// Abandon the pending input line with `^C` and wait for the prompt,
    /// pressing `^C` again every [`INTERRUPT_RETRY`] until `sync_timeout`
    /// runs out.
    async fn resynchronize(&mut self) -> Result<(), SessionError> {
        self.set_state(SessionState::Interrupting);
        // Anything read so far predates the interrupt; a prompt in it is stale.
        let stale = self.expecter.discard();
        if !stale.is_empty() {
            log::trace!("discarding before interrupt: {stale:?}");
        }

        let sentinel = self.sentinel.clone();
        let deadline = Instant::now() + self.sync_timeout;
        let mut attempts = 0u32;
        loop {
            if let Err(e) = self.terminal.send_interrupt() {
                let err = BrokenError::new(
                    format!("could not deliver interrupt: {e}"),
                    self.expecter.pending(),
                );
                return Err(self.break_session(err));
            }
            attempts += 1;

            let slice = deadline
                .saturating_duration_since(Instant::now())
                .min(INTERRUPT_RETRY);
            match self.expecter.read_until(&sentinel, slice).await {
                ReadOutcome::Matched(_) => {
                    if attempts > 1 {
                        debug!("prompt back after {attempts} interrupts");
                    }
                    self.set_state(SessionState::Idle);
                    return Ok(());
                }
                ReadOutcome::TimedOut { pending } => {
                    if Instant::now() >= deadline {
                        let err = BrokenError::new(
                            format!(
                                "prompt did not return within {:?} after {attempts} interrupts",
                                self.sync_timeout
                            ),
                            pending,
                        );
                        return Err(self.break_session(err));
                    }
                    debug!("no prompt {slice:?} after interrupt, sending another");
                }
                ReadOutcome::Closed { pending } => {
                    let err = BrokenError::new("shell exited during resynchronization", pending);
                    return Err(self.break_session(err));
                }
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Closed => Err(SessionError::Closed),
            state => Err(SessionError::Broken(BrokenError::new(
                format!("session is unusable (state {state:?}) after an earlier failure"),
                "",
            ))),
        }
    }

    fn lose_sync(&mut self, err: SyncError) -> SessionError {
        debug!("{err}");
        self.set_state(SessionState::Broken);
        SessionError::Sync(err)
    }

    fn break_session(&mut self, err: BrokenError) -> SessionError {
        debug!("{err}");
        self.set_state(SessionState::Broken);
        SessionError::Broken(err)
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            log::trace!("session state {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }
}

impl<T: Terminal> Drop for Session<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Strip the line break that precedes the prompt and unify `\r\n` to `\n`.
fn normalize_output(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
