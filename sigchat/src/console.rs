//! Terminal line I/O behind a trait seam.
//!
//! The session controller talks to the terminal only through [`Console`]:
//! one blocking line read (with a prompt) and one line print. The real
//! implementation is [`StdinConsole`]; [`ScriptedConsole`] drives the
//! controller from tests, feeding input lines through a channel and
//! capturing everything printed.

use std::io;
use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

/// Line-oriented terminal access.
///
/// `read_line` resolves to `Ok(None)` on end of input, which the
/// controller treats as a shutdown request.
pub trait Console: Send + Sync + 'static {
    /// Print `prompt` (no trailing newline) and read the next input line.
    fn read_line(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = io::Result<Option<String>>> + Send;

    /// Print one line of output.
    fn print(&self, line: &str);
}

/// Console over the process's real stdin/stdout.
pub struct StdinConsole {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinConsole {
    /// Create a console reading from stdin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdinConsole {
    async fn read_line(&self, prompt: &str) -> io::Result<Option<String>> {
        {
            let mut out = io::stdout();
            write!(out, "{prompt}")?;
            out.flush()?;
        }
        self.lines.lock().await.next_line().await
    }

    fn print(&self, line: &str) {
        println!("{line}");
    }
}

/// Scripted console for tests.
///
/// Input lines arrive from the paired [`ConsoleDriver`]; a closed driver
/// reads as end of input. All printed lines are captured for assertion.
pub struct ScriptedConsole {
    input: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    output: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    /// Create a console and the driver that feeds it.
    #[must_use]
    pub fn pair() -> (Self, ConsoleDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let output = Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Self {
                input: tokio::sync::Mutex::new(rx),
                output: Arc::clone(&output),
            },
            ConsoleDriver {
                input: parking_lot::Mutex::new(Some(tx)),
                output,
            },
        )
    }
}

impl Console for ScriptedConsole {
    async fn read_line(&self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.input.lock().await.recv().await)
    }

    fn print(&self, line: &str) {
        self.output.lock().push(line.to_string());
    }
}

/// Test-side handle for a [`ScriptedConsole`].
pub struct ConsoleDriver {
    input: parking_lot::Mutex<Option<mpsc::UnboundedSender<String>>>,
    output: Arc<parking_lot::Mutex<Vec<String>>>,
}

impl ConsoleDriver {
    /// Feed one input line to the console.
    pub fn send_line(&self, line: &str) {
        // A controller that already shut down simply ignores further input.
        if let Some(tx) = self.input.lock().as_ref() {
            let _ = tx.send(line.to_string());
        }
    }

    /// Close the input side; once queued lines drain, reads see end of input.
    pub fn close(&self) {
        self.input.lock().take();
    }

    /// Snapshot of everything printed so far.
    #[must_use]
    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    /// Whether any printed line contains `needle`.
    #[must_use]
    pub fn printed(&self, needle: &str) -> bool {
        self.output.lock().iter().any(|l| l.contains(needle))
    }

    /// Count of printed lines containing `needle`.
    #[must_use]
    pub fn printed_count(&self, needle: &str) -> usize {
        self.output
            .lock()
            .iter()
            .filter(|l| l.contains(needle))
            .count()
    }

    /// Poll until a printed line contains `needle`; false if it never does.
    ///
    /// Polling is bounded by iteration count, not wall-clock time, so it
    /// also terminates under a paused tokio clock.
    pub async fn wait_for(&self, needle: &str) -> bool {
        self.wait_for_count(needle, 1).await
    }

    /// Poll until at least `count` printed lines contain `needle`.
    ///
    /// The bound comfortably outlasts the default 10s operation timeout
    /// when the clock is paused and timers auto-advance.
    pub async fn wait_for_count(&self, needle: &str, count: usize) -> bool {
        for _ in 0..2000 {
            if self.printed_count(needle) >= count {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        false
    }
}
