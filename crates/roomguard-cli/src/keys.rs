//! Keyboard triggers for the capture loops.
//!
//! A reader thread turns stdin lines into keys; the loop polls without
//! blocking, once per frame.

use crossbeam_channel::{Receiver, TryRecvError};
use std::io::BufRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Capture,
    Quit,
}

pub trait KeySource {
    /// Next pending key, if any. Never blocks.
    fn poll(&mut self) -> Option<Key>;
}

/// `q` quits; an empty line (Enter or SPACE+Enter) or `c` captures.
pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" => Some(Key::Quit),
        "" | "c" | "capture" => Some(Key::Capture),
        _ => None,
    }
}

pub struct StdinKeys {
    rx: Receiver<Key>,
}

impl StdinKeys {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::Builder::new()
            .name("roomguard-keys".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    match parse_key(&line) {
                        Some(key) => {
                            if tx.send(key).is_err() {
                                return;
                            }
                        }
                        None => tracing::info!(input = %line.trim(), "unrecognised key (q = quit, Enter = capture)"),
                    }
                }
                // stdin closed: nothing can ever quit the loop otherwise
                let _ = tx.send(Key::Quit);
            })?;
        Ok(Self { rx })
    }
}

impl KeySource for StdinKeys {
    fn poll(&mut self) -> Option<Key> {
        match self.rx.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Key::Quit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("q"), Some(Key::Quit));
        assert_eq!(parse_key(" Q \n"), Some(Key::Quit));
        assert_eq!(parse_key(""), Some(Key::Capture));
        assert_eq!(parse_key(" "), Some(Key::Capture));
        assert_eq!(parse_key("c"), Some(Key::Capture));
        assert_eq!(parse_key("x"), None);
    }

    #[test]
    fn test_poll_drains_then_quits_when_reader_gone() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut keys = StdinKeys { rx };
        assert_eq!(keys.poll(), None);
        tx.send(Key::Capture).unwrap();
        assert_eq!(keys.poll(), Some(Key::Capture));
        drop(tx);
        assert_eq!(keys.poll(), Some(Key::Quit));
    }
}
