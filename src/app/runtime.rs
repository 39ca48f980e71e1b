use super::{KioskApp, ShutdownReason};
use crate::error::{PunchclockError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

impl KioskApp {
    /// Run until a signal or a component requests shutdown, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Punchclock is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| PunchclockError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| PunchclockError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender).await;

        let cancelled = self.cancellation_token.clone();
        let controller_task = &mut self.controller_task;
        let shutdown_reason = tokio::select! {
            reason = shutdown_receiver => reason.map_err(|_| {
                PunchclockError::system("Shutdown channel closed unexpectedly")
            })?,
            _ = cancelled.cancelled() => ShutdownReason::UserRequest,
            result = controller_stopped(controller_task) => {
                let message = match result {
                    Ok(()) => "session controller stopped unexpectedly".to_string(),
                    Err(e) => format!("session controller failed: {}", e),
                };
                error!("{}", message);
                ShutdownReason::Error(message)
            }
        };

        let controller_failed = matches!(shutdown_reason, ShutdownReason::Error(_));
        if controller_failed {
            // Already joined; shutdown must not await it again
            self.controller_task = None;
        }
        info!("Shutdown initiated: {:?}", shutdown_reason);

        let mut exit_code = self.shutdown().await?;
        if controller_failed {
            exit_code = 1;
        }

        info!("Punchclock shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM (systemd stop), Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // SIGINT (Ctrl+C)
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}

/// Resolves when the controller task ends; never resolves if it was not started
async fn controller_stopped(
    task: &mut Option<JoinHandle<()>>,
) -> std::result::Result<(), JoinError> {
    match task.as_mut() {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}
