use crate::{Error, Result};
use crossbeam::channel::{self, Receiver};

/// Install a ctrl-c/SIGTERM handler that signals the render loop instead of
/// exiting immediately, so the display driver drops and releases its pins.
pub(super) fn create_shutdown_channel() -> Result<Receiver<()>> {
    let (tx, rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
    Ok(rx)
}
