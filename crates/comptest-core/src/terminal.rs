use std::time::Duration;

use comptest_pty::{PtyError, PtyHandle};

/// The write side of a conversation with an interactive shell.
///
/// Output flows the other way through an [`OutputReceiver`](comptest_pty::OutputReceiver)
/// consumed by an [`Expecter`](crate::Expecter), so the protocol logic never
/// touches the OS directly and can be exercised against a scripted peer.
pub trait Terminal: Send {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;

    /// Abort whatever the shell is doing with the current input line.
    fn send_interrupt(&mut self) -> Result<(), PtyError>;

    /// Ask the peer to exit and reap it. Must tolerate a peer that is already gone.
    fn close(&mut self, grace: Duration);
}

impl Terminal for PtyHandle {
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        PtyHandle::write(self, data)
    }

    fn send_interrupt(&mut self) -> Result<(), PtyError> {
        PtyHandle::send_interrupt(self)
    }

    fn close(&mut self, grace: Duration) {
        let code = self.terminate(b"exit\n", grace);
        log::debug!("shell closed with exit code {code:?}");
    }
}
