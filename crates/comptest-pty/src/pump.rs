//! Output pump that moves PTY output off the blocking reader.
//!
//! PTY reads are blocking, so each session gets its own OS thread that owns
//! the reader directly and forwards every chunk over an unbounded channel.
//! The async side decides how long it is willing to wait; the pump never
//! imposes a timeout of its own.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use tokio::sync::mpsc;

use crate::pty::PtyError;

/// Receiving end of the pump. Closed once the PTY reaches EOF.
pub type OutputReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Open (append) a transcript file that receives every raw byte read from the PTY.
pub fn open_transcript(path: &Path) -> Result<File, PtyError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(file)
}

/// Start the read loop for a PTY on a dedicated OS thread.
///
/// The thread exits on EOF, on a read error, or once the receiver has been
/// dropped and the next chunk arrives.
pub fn start_output_pump(
    label: &str,
    reader: Box<dyn Read + Send>,
    transcript: Option<File>,
) -> Result<OutputReceiver, PtyError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let thread_label = label.to_string();

    std::thread::Builder::new()
        .name(format!("pty-pump-{label}"))
        .spawn(move || pump_loop(&thread_label, reader, transcript, tx))
        .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn output pump: {e}")))?;

    Ok(rx)
}

fn pump_loop(
    label: &str,
    mut reader: Box<dyn Read + Send>,
    mut transcript: Option<File>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut buf = [0u8; 8192];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Linux reports EIO on the master once the slave side is gone.
            Err(e) => {
                log::debug!("[{label}] PTY read ended: {e}");
                break;
            }
        };

        log::trace!("[{label}] read {n} bytes: {:?}", String::from_utf8_lossy(&buf[..n]));

        if let Some(file) = transcript.as_mut() {
            if let Err(e) = file.write_all(&buf[..n]).and_then(|()| file.flush()) {
                log::warn!("[{label}] transcript write failed, disabling transcript: {e}");
                transcript = None;
            }
        }

        if tx.send(buf[..n].to_vec()).is_err() {
            // Receiver dropped; nobody is listening anymore.
            break;
        }
    }

    log::debug!("[{label}] output pump stopped");
}
