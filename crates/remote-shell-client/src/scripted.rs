//! Line editor driven by a script, for tests of code built on [`ShellClient`].
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! dependents.
//!
//! [`ShellClient`]: crate::ShellClient

use std::sync::{Arc, Mutex, PoisonError, mpsc};

use crate::editor::{LineEditor, ReadLineError};

/// Scripted input for a [`ScriptedEditor`].
type Scripted = Result<String, ReadLineError>;

/// Line editor driven by a script instead of a human.
///
/// Every `read_line` takes the next scripted entry, blocking until one is
/// pushed through the paired [`ScriptHandle`]. Prompts and printed output
/// are recorded for inspection. Dropping the handle ends input.
#[derive(Clone)]
pub struct ScriptedEditor {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    input: Mutex<mpsc::Receiver<Scripted>>,
    prompts: Mutex<Vec<String>>,
    printed: Mutex<Vec<String>>,
}

/// Feeds lines to a [`ScriptedEditor`].
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    tx: mpsc::Sender<Scripted>,
}

impl ScriptedEditor {
    /// Create an editor and the handle that feeds it.
    #[must_use]
    pub fn new() -> (Self, ScriptHandle) {
        let (tx, rx) = mpsc::channel();
        let editor = Self {
            inner: Arc::new(ScriptedInner {
                input: Mutex::new(rx),
                prompts: Mutex::new(Vec::new()),
                printed: Mutex::new(Vec::new()),
            }),
        };
        (editor, ScriptHandle { tx })
    }

    /// Prompts passed to `read_line`, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.inner.prompts).clone()
    }

    /// Everything printed so far, in order.
    #[must_use]
    pub fn printed(&self) -> Vec<String> {
        lock(&self.inner.printed).clone()
    }
}

impl LineEditor for ScriptedEditor {
    fn read_line(&self, prompt: &str) -> Result<String, ReadLineError> {
        lock(&self.inner.prompts).push(prompt.to_string());
        lock(&self.inner.input)
            .recv()
            .unwrap_or(Err(ReadLineError::Eof))
    }

    fn print(&self, text: &str) {
        lock(&self.inner.printed).push(text.to_string());
    }

    fn clear_screen(&self) {
        lock(&self.inner.printed).clear();
    }
}

impl ScriptHandle {
    /// Type a line.
    pub fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(Ok(line.into()));
    }

    /// Press cancel.
    pub fn interrupt(&self) {
        let _ = self.tx.send(Err(ReadLineError::Interrupted));
    }

    /// End input.
    pub fn eof(&self) {
        let _ = self.tx.send(Err(ReadLineError::Eof));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
