//! A scripted stand-in for an interactive bash, used by the protocol tests.
//!
//! It echoes typed characters, runs "commands" from a lookup table on newline,
//! answers TAB from a completion table, and honours `PS1=` assignments and
//! `echo $?`. Everything it prints goes through the same channel type the PTY
//! pump produces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use comptest_pty::{OutputReceiver, PtyError};
use tokio::sync::mpsc;

use crate::terminal::Terminal;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Text inserted into the line; the prompt does not come back.
    Inline(String),
    /// Common prefix inserted, then a listing and a redrawn prompt.
    Listing {
        insert: String,
        candidates: Vec<String>,
    },
    /// Nothing happens.
    Nothing,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct Observed {
    pub written: Arc<Mutex<Vec<u8>>>,
    pub interrupts: Arc<Mutex<usize>>,
    pub closed: Arc<AtomicBool>,
}

impl Observed {
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }

    pub fn interrupt_count(&self) -> usize {
        *self.interrupts.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeShell {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    prompt: String,
    line: String,
    last_status: i32,
    commands: HashMap<String, (String, i32)>,
    completions: HashMap<String, Reply>,
    swallowed_interrupts: usize,
    exit_on: Option<String>,
    mute_on: Option<String>,
    muted: bool,
    close_delay: Duration,
    observed: Observed,
}

impl FakeShell {
    pub fn new() -> (Self, OutputReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompt = "bash-5.2$ ".to_string();
        let _ = tx.send(prompt.clone().into_bytes());
        let shell = Self {
            tx: Some(tx),
            prompt,
            line: String::new(),
            last_status: 0,
            commands: HashMap::new(),
            completions: HashMap::new(),
            swallowed_interrupts: 0,
            exit_on: None,
            mute_on: None,
            muted: false,
            close_delay: Duration::ZERO,
            observed: Observed::default(),
        };
        (shell, rx)
    }

    pub fn command(mut self, line: &str, output: &str, status: i32) -> Self {
        self.commands
            .insert(line.to_string(), (output.to_string(), status));
        self
    }

    pub fn completion(mut self, line: &str, reply: Reply) -> Self {
        self.completions.insert(line.to_string(), reply);
        self
    }

    /// Stop printing a prompt after `^C`, so resynchronization fails.
    pub fn ignore_interrupts(mut self) -> Self {
        self.swallowed_interrupts = usize::MAX;
        self
    }

    /// Echo the first `count` interrupts without redrawing the prompt, the
    /// way bash does when `^C` lands while readline is still redisplaying.
    pub fn swallow_interrupts(mut self, count: usize) -> Self {
        self.swallowed_interrupts = count;
        self
    }

    /// Go silent, but stay connected, once a write starts with `text`.
    pub fn mute_when_typed(mut self, text: &str) -> Self {
        self.mute_on = Some(text.to_string());
        self
    }

    /// Block in `close` for `delay`, like a shell that ignores `exit`.
    pub fn slow_to_close(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Hang up without echoing when a write starts with `text`.
    pub fn exit_when_typed(mut self, text: &str) -> Self {
        self.exit_on = Some(text.to_string());
        self
    }

    pub fn observed(&self) -> Observed {
        self.observed.clone()
    }

    fn emit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(text.as_bytes().to_vec());
        }
    }

    fn accept_line(&mut self, out: &mut String) {
        out.push_str("\r\n");
        let line = std::mem::take(&mut self.line);

        if let Some(value) = line.strip_prefix("PS1=") {
            self.prompt = value.trim_matches('\'').to_string();
            self.last_status = 0;
        } else if line == "echo $?" {
            out.push_str(&format!("{}\r\n", self.last_status));
            self.last_status = 0;
        } else if let Some((output, status)) = self.commands.get(&line) {
            if !output.is_empty() {
                out.push_str(output);
                out.push_str("\r\n");
            }
            self.last_status = *status;
        } else {
            self.last_status = 0;
        }
        out.push_str(&self.prompt);
    }

    fn complete(&mut self, out: &mut String) {
        match self.completions.get(&self.line).cloned() {
            Some(Reply::Inline(text)) => {
                out.push_str(&text);
                self.line.push_str(&text);
            }
            Some(Reply::Listing { insert, candidates }) => {
                out.push_str(&insert);
                self.line.push_str(&insert);
                out.push_str("\r\n");
                for candidate in candidates {
                    out.push_str(&candidate);
                    out.push_str("\r\n");
                }
                out.push_str(&self.prompt);
                out.push_str(&self.line);
            }
            Some(Reply::Nothing) | None => {}
        }
    }
}

impl Terminal for FakeShell {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if self.tx.is_none() {
            return Err(PtyError::Closed);
        }
        self.observed
            .written
            .lock()
            .unwrap()
            .extend_from_slice(data);

        let typed = String::from_utf8_lossy(data);
        if let Some(trigger) = &self.exit_on {
            if typed.starts_with(trigger.as_str()) {
                self.tx = None;
                return Ok(());
            }
        }
        if let Some(trigger) = &self.mute_on {
            if typed.starts_with(trigger.as_str()) {
                self.muted = true;
            }
        }
        if self.muted {
            return Ok(());
        }

        let mut out = String::new();
        for ch in typed.chars() {
            match ch {
                '\n' => self.accept_line(&mut out),
                '\t' => self.complete(&mut out),
                c => {
                    out.push(c);
                    self.line.push(c);
                }
            }
        }
        self.emit(&out);
        Ok(())
    }

    fn send_interrupt(&mut self) -> Result<(), PtyError> {
        if self.tx.is_none() {
            return Err(PtyError::Closed);
        }
        *self.observed.interrupts.lock().unwrap() += 1;
        self.line.clear();
        if self.muted {
            return Ok(());
        }
        if self.swallowed_interrupts > 0 {
            self.swallowed_interrupts -= 1;
            self.emit("^C");
        } else {
            let text = format!("^C\r\n{}", self.prompt);
            self.emit(&text);
        }
        Ok(())
    }

    fn close(&mut self, _grace: Duration) {
        if !self.close_delay.is_zero() {
            std::thread::sleep(self.close_delay);
        }
        self.tx = None;
        self.observed.closed.store(true, Ordering::SeqCst);
    }
}
