use crate::errors::AppResult;
use flume::Receiver;
use tracing::info;

/// Route SIGINT, SIGTERM and SIGHUP into a shutdown channel
///
/// The handler itself only sends; closing the socket and removing the PID
/// file is left to the accept loop. Must be called after the process has
/// detached, since the handler runs on its own thread.
pub fn shutdown_on_signal() -> AppResult<Receiver<()>> {
    let (sender, receiver) = flume::bounded(1);

    let installed = ctrlc::set_handler(move || {
        // a full channel means shutdown is already pending
        if sender.try_send(()).is_ok() {
            info!("Termination signal received");
        }
    });
    crate::context!(installed, "Failed to install signal handler")?;

    Ok(receiver)
}
