//! comptest-core: drives an interactive bash through a PTY to observe its
//! TAB completion.
//!
//! A [`Session`] owns one shell. [`Session::start`] boots it into a known
//! state (unique prompt, readline configured for parseable output, caller's
//! init files sourced), after which completion queries run one at a time:
//! the input line is typed followed by TAB, and the terminal text that comes
//! back is interpreted as a [`CompletionResult`].
//!
//! # Architecture
//!
//! - [`Terminal`]: The narrow seam to the peer process (write, interrupt, close).
//!   Implemented for [`comptest_pty::PtyHandle`]; tests plug in a scripted fake.
//! - [`Expecter`]: Sanitized output buffer with the read-until-pattern-or-timeout
//!   primitive every protocol step is built on.
//! - [`Session`]: The state machine: bootstrap, `run_command`, completion queries,
//!   interrupt-based resynchronization.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod expect;
pub mod result;
pub mod session;
pub mod terminal;

#[cfg(test)]
mod fake;

pub use bootstrap::shell_quote;
pub use config::SessionConfig;
pub use error::{BrokenError, SessionError, StartupError, SyncCause, SyncError};
pub use expect::{Expecter, Match, ReadOutcome};
pub use result::CompletionResult;
pub use session::{Session, SessionState};
pub use terminal::Terminal;
