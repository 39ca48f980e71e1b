use crate::error::Result;
use crate::model::PunchAction;
use crate::session::KioskInput;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Parse one console command line into a session input.
///
/// `open`, `close`, `search <text>`, `select <employee id>`, `pin <digits>`, `back`,
/// `restart`, `action <clock_in|clock_out|break_start|break_end>`, `photo`, `retake`,
/// `confirm`, `cancel`, `reload`
pub fn parse_command(line: &str) -> Option<KioskInput> {
    let line = line.trim();
    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let input = match (command.to_ascii_lowercase().as_str(), argument) {
        ("open", "") => KioskInput::Open,
        ("close", "") => KioskInput::Close,
        ("search", query) => KioskInput::SearchChanged(query.to_string()),
        ("select", id) if !id.is_empty() => KioskInput::SelectCandidate(id.to_string()),
        ("pin", pin) if !pin.is_empty() => KioskInput::SubmitPin(pin.to_string()),
        ("back", "") => KioskInput::Back,
        ("restart", "") => KioskInput::RestartBiometric,
        ("action", name) => KioskInput::SelectAction(parse_action(name)?),
        ("photo", "") => KioskInput::TakePhoto,
        ("retake", "") => KioskInput::Retake,
        ("confirm", "") => KioskInput::ConfirmPunch,
        ("cancel", "") => KioskInput::Cancel,
        ("reload", "") => KioskInput::ReloadKioskConfig,
        _ => return None,
    };
    Some(input)
}

fn parse_action(name: &str) -> Option<PunchAction> {
    [
        PunchAction::ClockIn,
        PunchAction::ClockOut,
        PunchAction::BreakStart,
        PunchAction::BreakEnd,
    ]
    .into_iter()
    .find(|action| action.as_str() == name.to_ascii_lowercase())
}

/// Line-oriented console for driving a session from a terminal
pub struct KeyboardInputHandler {
    inputs: mpsc::Sender<KioskInput>,
    quit: CancellationToken,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    /// `quit` is cancelled when the operator presses Esc
    pub fn new(inputs: mpsc::Sender<KioskInput>, quit: CancellationToken) -> Self {
        Self {
            inputs,
            quit,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard console - type a command and press Enter, Esc to quit");

        let inputs = self.inputs.clone();
        let quit = self.quit.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            let mut line = String::new();
            loop {
                if cancellation_token.is_cancelled() || quit.is_cancelled() {
                    debug!("Keyboard console stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match key_event.code {
                            KeyCode::Char(c) => line.push(c),
                            KeyCode::Backspace => {
                                line.pop();
                            }
                            KeyCode::Enter => {
                                let entered = std::mem::take(&mut line);
                                let input = match parse_command(&entered) {
                                    Some(input) => input,
                                    None => {
                                        warn!("Unknown command: {:?}", entered.trim());
                                        continue;
                                    }
                                };
                                info!("Console input: {}", input);
                                if inputs.blocking_send(input).is_err() {
                                    debug!("Session input channel closed");
                                    break;
                                }
                            }
                            KeyCode::Esc => {
                                info!("Quit key pressed - requesting shutdown");
                                quit.cancel();
                                break;
                            }
                            other => debug!("Key pressed: {:?}", other),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard console task exited");
        });

        Ok(())
    }

    /// Stop the console and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard console");
        self.cancellation_token.cancel();

        // Let the blocking task notice the token and leave raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
