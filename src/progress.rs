use std::io::{IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Something that can show the user that work is in progress.
pub trait Progress: Send + Sync {
    fn start(&self, message: &str);

    /// Called before a line of subprocess output is printed, so the
    /// indicator does not garble it.
    fn clear(&self);

    fn stop(&self);
}

/// Stops the indicator when dropped.
pub struct ProgressGuard<'a> {
    progress: &'a dyn Progress,
}

impl<'a> ProgressGuard<'a> {
    pub fn start(progress: &'a dyn Progress, message: &str) -> Self {
        progress.start(message);
        ProgressGuard { progress }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.progress.stop();
    }
}

pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&self, _message: &str) {}
    fn clear(&self) {}
    fn stop(&self) {}
}

#[derive(Default)]
struct SpinnerState {
    message: String,
    task: Option<JoinHandle<()>>,
}

/// A spinner drawn on stderr. Does nothing when stderr is not a terminal.
pub struct Spinner {
    state: Arc<Mutex<SpinnerState>>,
    enabled: bool,
}

impl Spinner {
    pub fn new() -> Self {
        Spinner {
            state: Arc::new(Mutex::new(SpinnerState::default())),
            enabled: std::io::stderr().is_terminal(),
        }
    }
}

fn erase_line() {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r\x1b[2K");
    let _ = stderr.flush();
}

impl Progress for Spinner {
    fn start(&self, message: &str) {
        if !self.enabled {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.message = message.to_string();
        if state.task.is_some() {
            return;
        }

        let shared = Arc::clone(&self.state);
        state.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_INTERVAL);
            for frame in FRAMES.iter().cycle() {
                interval.tick().await;
                let message = match shared.lock() {
                    Ok(state) => state.message.clone(),
                    Err(_) => return,
                };
                let mut stderr = std::io::stderr();
                let _ = write!(stderr, "\r\x1b[2K{} {}", frame, message);
                let _ = stderr.flush();
            }
        }));
    }

    fn clear(&self) {
        if self.enabled {
            erase_line();
        }
    }

    fn stop(&self) {
        if !self.enabled {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if let Some(task) = state.task.take() {
                task.abort();
                erase_line();
            }
        }
    }
}
