use kiosk_core::{Kiosk, KioskError};
use tokio::sync::oneshot;

/// Outcome of the kiosk thread, delivered once it exits.
pub type KioskExit = oneshot::Receiver<Result<(), KioskError>>;

/// Run the kiosk loop on a dedicated OS thread.
///
/// The loop is blocking (sensor polling, capture, embedding calls), so it
/// stays off the tokio runtime; the async side only waits for its result.
pub fn spawn_kiosk(kiosk: Kiosk) -> std::io::Result<KioskExit> {
    let (tx, rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("kiosk-loop".into())
        .spawn(move || {
            tracing::info!("kiosk thread started");
            let result = kiosk.run();
            tracing::info!(ok = result.is_ok(), "kiosk thread exiting");
            let _ = tx.send(result);
        })?;

    Ok(rx)
}
