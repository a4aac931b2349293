//! comptest-pty: pseudo-terminal plumbing for driving an interactive shell.
//!
//! This crate owns the OS-level half of a completion-test session: it spawns
//! the shell attached to a PTY, writes keystrokes to it, delivers the terminal
//! interrupt character, and reaps the child. Output is moved off the blocking
//! PTY reader by a dedicated pump thread and handed over as byte chunks on a
//! channel.
//!
//! # Architecture
//!
//! - [`PtyHandle`]: Low-level PTY process management (spawn, write, interrupt, terminate).
//! - [`start_output_pump`]: Reader thread forwarding PTY output (and an optional
//!   transcript copy) to an [`OutputReceiver`].

pub mod pump;
pub mod pty;

pub use pump::{open_transcript, start_output_pump, OutputReceiver};
pub use pty::{PtyError, PtyHandle, SpawnOptions, INTERRUPT};
