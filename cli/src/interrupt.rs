use std::io;
use std::thread;
use tracing::{debug, warn};
use vigil_core::RunHandle;

/// Stops the run at its next statement boundary when Ctrl-C arrives.
///
/// The signal is awaited on a small single-threaded runtime of its own so the
/// runner itself stays synchronous.
pub fn stop_on_interrupt(handle: RunHandle) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("vigil-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => request_stop(&handle),
                    Err(err) => warn!(error = %err, "could not listen for Ctrl-C"),
                }
            })
        })?;

    debug!("interrupt handler installed");
    Ok(())
}

fn request_stop(handle: &RunHandle) {
    warn!("interrupted, stopping after the current statement");
    handle.stop();
}
