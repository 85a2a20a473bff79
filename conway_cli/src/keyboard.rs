// keyboard.rs - Single-key operator commands from the terminal

use conway_halo::OperatorCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long one wait for a key lasts before the reader checks whether the
/// run is still listening.
const POLL: Duration = Duration::from_millis(50);

/// Puts the terminal in raw mode and forwards every bound key press (`p`,
/// `s`, `q`, Ctrl-C) as soon as it is typed. Without a terminal the run
/// goes ahead with no operator input.
pub struct Keyboard {
    reader: Option<thread::JoinHandle<()>>,
}

impl Keyboard {
    pub fn start(keys: mpsc::Sender<OperatorCommand>) -> io::Result<Self> {
        if let Err(err) = terminal::enable_raw_mode() {
            warn!(%err, "no terminal, operator keys are disabled");
            return Ok(Self { reader: None });
        }

        let reader = thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || {
                let _raw = RawMode;
                if let Err(err) = read_keys(&keys) {
                    warn!(%err, "keyboard read failed");
                }
                debug!("keyboard stopped");
            });
        match reader {
            Ok(reader) => Ok(Self { reader: Some(reader) }),
            Err(err) => {
                let _ = terminal::disable_raw_mode();
                Err(err)
            }
        }
    }

    /// Waits for the reader to notice the run has finished and restore the
    /// terminal.
    pub async fn stop(self) {
        if let Some(reader) = self.reader {
            let _ = tokio::task::spawn_blocking(move || reader.join()).await;
        }
    }
}

/// Leaves raw mode when dropped, including on panic.
struct RawMode;

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn read_keys(keys: &mpsc::Sender<OperatorCommand>) -> io::Result<()> {
    while !keys.is_closed() {
        if !event::poll(POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match command_for(key) {
            Some(command) => {
                if keys.blocking_send(command).is_err() {
                    break; // run finished
                }
            }
            None => debug!(code = ?key.code, "unbound key"),
        }
    }
    Ok(())
}

/// Raw mode swallows Ctrl-C, so it is mapped to quit here.
fn command_for(key: KeyEvent) -> Option<OperatorCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(OperatorCommand::Quit),
        KeyCode::Char(c) => OperatorCommand::from_key(c),
        _ => None,
    }
}

/// Writer for output produced while the terminal is in raw mode, where a
/// bare `\n` no longer returns the cursor to column 0.
pub struct RawLines<W>(pub W);

impl<W: Write> Write for RawLines<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|&byte| byte == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(text) if !text.ends_with(b"\r") => {
                    self.0.write_all(text)?;
                    self.0.write_all(b"\r\n")?;
                }
                _ => self.0.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn single_keys_map_without_enter() {
        assert_eq!(
            command_for(press(KeyCode::Char('p'), KeyModifiers::NONE)),
            Some(OperatorCommand::TogglePause)
        );
        assert_eq!(
            command_for(press(KeyCode::Char('S'), KeyModifiers::SHIFT)),
            Some(OperatorCommand::Snapshot)
        );
        assert_eq!(command_for(press(KeyCode::Char('q'), KeyModifiers::NONE)), Some(OperatorCommand::Quit));
        assert_eq!(command_for(press(KeyCode::Char('x'), KeyModifiers::NONE)), None);
        assert_eq!(command_for(press(KeyCode::Enter, KeyModifiers::NONE)), None);
    }

    #[test]
    fn ctrl_c_quits() {
        assert_eq!(
            command_for(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(OperatorCommand::Quit)
        );
    }

    #[test]
    fn key_release_is_ignored() {
        let release = KeyEvent::new_with_kind_and_state(
            KeyCode::Char('p'),
            KeyModifiers::NONE,
            KeyEventKind::Release,
            KeyEventState::NONE,
        );
        assert_eq!(command_for(release), None);
    }

    #[test]
    fn raw_lines_return_the_carriage() {
        let mut out = RawLines(Vec::new());
        write!(out, "one\ntwo\r\nthree").unwrap();
        writeln!(out).unwrap();
        assert_eq!(out.0, b"one\r\ntwo\r\nthree\r\n");
    }
}
