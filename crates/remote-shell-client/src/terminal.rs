//! Raw-mode line editor built on crossterm.

use std::{
    io::{self, Write},
    sync::{Mutex, MutexGuard, PoisonError},
};

use crossterm::{
    cursor::{MoveTo, MoveToColumn},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};

use crate::editor::{LineEditor, ReadLineError};

#[derive(Debug, Default)]
struct LineState {
    prompt: String,
    buffer: String,
    reading: bool,
}

/// Interactive terminal editor.
///
/// Ctrl+C interrupts the read, Ctrl+D on an empty line ends input. Output
/// printed while a read is active is drawn above the prompt line, which is
/// then redrawn with the partial input intact.
#[derive(Debug, Default)]
pub struct TerminalEditor {
    state: Mutex<LineState>,
}

impl TerminalEditor {
    /// Create a terminal editor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_keys(&self) -> Result<String, ReadLineError> {
        loop {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            else {
                continue;
            };

            let mut state = self.state();
            match code {
                KeyCode::Enter => return Ok(std::mem::take(&mut state.buffer)),
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    state.buffer.clear();
                    return Err(ReadLineError::Interrupted);
                }
                KeyCode::Char('d')
                    if modifiers.contains(KeyModifiers::CONTROL) && state.buffer.is_empty() =>
                {
                    return Err(ReadLineError::Eof);
                }
                KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => {
                    state.buffer.push(c);
                }
                KeyCode::Backspace => {
                    state.buffer.pop();
                }
                _ => continue,
            }
            redraw(&mut io::stdout(), &state)?;
        }
    }
}

impl LineEditor for TerminalEditor {
    fn read_line(&self, prompt: &str) -> Result<String, ReadLineError> {
        {
            let mut state = self.state();
            state.prompt = prompt.to_string();
            state.buffer.clear();
            state.reading = true;
            redraw(&mut io::stdout(), &state)?;
        }

        terminal::enable_raw_mode()?;
        let result = self.read_keys();
        let restored = terminal::disable_raw_mode();

        self.state().reading = false;
        let mut stdout = io::stdout();
        execute!(stdout, Print("\r\n"))?;
        restored?;
        result
    }

    fn print(&self, text: &str) {
        let state = self.state();
        let mut stdout = io::stdout();
        let result = if state.reading {
            queue!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))
                .and_then(|()| write_lines(&mut stdout, text))
                .and_then(|()| redraw(&mut stdout, &state))
        } else {
            write_lines(&mut stdout, text).and_then(|()| stdout.flush())
        };
        if let Err(e) = result {
            tracing::debug!("Failed to print to terminal: {e}");
        }
    }

    fn clear_screen(&self) {
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, Clear(ClearType::All), MoveTo(0, 0)) {
            tracing::debug!("Failed to clear terminal: {e}");
        }
    }
}

/// Write text line by line; raw mode needs explicit carriage returns.
fn write_lines(out: &mut impl Write, text: &str) -> io::Result<()> {
    for line in text.lines() {
        queue!(out, Print(line), Print("\r\n"))?;
    }
    Ok(())
}

fn redraw(out: &mut impl Write, state: &LineState) -> io::Result<()> {
    queue!(
        out,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(&state.prompt),
        Print(&state.buffer)
    )?;
    out.flush()
}
