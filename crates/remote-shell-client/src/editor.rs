//! Line-editing capability consumed by the session controller.

use std::{
    io::{self, BufRead, Write},
    sync::{Mutex, PoisonError},
};

use thiserror::Error;

/// Line read failure.
#[derive(Debug, Error)]
pub enum ReadLineError {
    /// The operator cancelled the read (e.g. Ctrl+C).
    #[error("Interrupted by user")]
    Interrupted,
    /// Input is exhausted (e.g. Ctrl+D).
    #[error("End of input")]
    Eof,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking line editor.
///
/// `read_line` runs on a blocking thread while `print` and `print_above`
/// may be called concurrently from the inbound loop, so implementations
/// must tolerate both at once.
pub trait LineEditor: Send + Sync + 'static {
    /// Block until the operator enters a line.
    ///
    /// # Errors
    /// Returns `Interrupted` on user cancel, `Eof` when input ends.
    fn read_line(&self, prompt: &str) -> Result<String, ReadLineError>;

    /// Print a line of output.
    fn print(&self, text: &str);

    /// Print a line without disturbing the active prompt.
    fn print_above(&self, text: &str) {
        self.print(text);
    }

    /// Clear the screen.
    fn clear_screen(&self) {
        self.print("\x1b[2J\x1b[H");
    }
}

/// Line editor over plain stdin/stdout.
///
/// Cannot observe Ctrl+C; suitable for piped input.
#[derive(Debug, Default)]
pub struct StdioEditor {
    output: Mutex<()>,
}

impl StdioEditor {
    /// Create a stdio editor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LineEditor for StdioEditor {
    fn read_line(&self, prompt: &str) -> Result<String, ReadLineError> {
        {
            let _guard = self.output.lock().unwrap_or_else(PoisonError::into_inner);
            let mut stdout = io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;
        }

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(ReadLineError::Eof);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn print(&self, text: &str) {
        let _guard = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        println!("{text}");
    }
}
