use super::{ComponentState, KioskApp};
use crate::error::{PunchclockError, Result};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const CONTROLLER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl KioskApp {
    /// Stop the console, let the controller close its session, then stop the view.
    ///
    /// Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // The controller closes the open session and stops presence reporting on cancel
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Err(e) = self.stop_component("keyboard").await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        if let Err(e) = self.stop_component("controller").await {
            error!("Error stopping controller: {}", e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_component("view").await {
            error!("Error stopping view: {}", e);
            exit_code = 1;
        }

        // Whatever happened above, never leave the camera on
        if self.devices.release_any().await {
            error!("Capture stream was still held at shutdown");
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component(&mut self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let result = match component {
            "keyboard" => match &self.keyboard_handler {
                Some(keyboard_handler) => keyboard_handler.stop().await,
                None => Ok(()),
            },
            "controller" => match self.controller_task.take() {
                Some(task) => match timeout(CONTROLLER_STOP_TIMEOUT, task).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(PunchclockError::component(
                        "controller".to_string(),
                        format!("task failed: {}", e),
                    )),
                    Err(_) => Err(PunchclockError::component(
                        "controller".to_string(),
                        "stop timeout".to_string(),
                    )),
                },
                None => Ok(()),
            },
            "view" => {
                if let Some(task) = self.view_task.take() {
                    let _ = timeout(Duration::from_secs(1), task).await;
                }
                Ok(())
            }
            other => Err(PunchclockError::component(
                other.to_string(),
                "unknown component".to_string(),
            )),
        };

        let state = if result.is_ok() {
            ComponentState::Stopped
        } else {
            ComponentState::Failed
        };
        self.set_component_state(component, state).await;
        if result.is_ok() {
            info!("{} component stopped", component);
        }
        result
    }
}
