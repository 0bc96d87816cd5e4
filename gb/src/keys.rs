//! Key commands
//!
//! Single characters typed on stdin steer a run: `s` snapshot, `p` pause or
//! resume, `q` quit, `k` kill. Input is line based, so a command takes effect
//! when Enter is pressed.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A control command from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Snapshot,
    Pause,
    Quit,
    Kill,
}

impl KeyCommand {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            's' => Some(Self::Snapshot),
            'p' => Some(Self::Pause),
            'q' => Some(Self::Quit),
            'k' => Some(Self::Kill),
            _ => None,
        }
    }
}

/// Forward commands read from `reader` until it ends or the receiver is dropped
pub async fn forward_keys<R>(reader: R, tx: mpsc::Sender<KeyCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "forward_keys: read failed");
                break;
            }
        };
        for c in line.chars().filter(|c| !c.is_whitespace()) {
            match KeyCommand::from_char(c) {
                Some(command) => {
                    debug!(?command, "forward_keys: command");
                    if tx.send(command).await.is_err() {
                        return;
                    }
                }
                None => debug!(%c, "forward_keys: ignoring key"),
            }
        }
    }
    debug!("forward_keys: input closed");
}

/// Read commands from stdin on a background task
pub fn spawn_stdin_keys() -> mpsc::Receiver<KeyCommand> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(forward_keys(BufReader::new(tokio::io::stdin()), tx));
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_char() {
        assert_eq!(KeyCommand::from_char('s'), Some(KeyCommand::Snapshot));
        assert_eq!(KeyCommand::from_char('P'), Some(KeyCommand::Pause));
        assert_eq!(KeyCommand::from_char('q'), Some(KeyCommand::Quit));
        assert_eq!(KeyCommand::from_char('k'), Some(KeyCommand::Kill));
        assert_eq!(KeyCommand::from_char('x'), None);
    }

    #[tokio::test]
    async fn test_forward_keys_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        forward_keys(&b"s\nx p\nq\n"[..], tx).await;

        let mut commands = Vec::new();
        while let Some(command) = rx.recv().await {
            commands.push(command);
        }
        assert_eq!(commands, vec![KeyCommand::Snapshot, KeyCommand::Pause, KeyCommand::Quit]);
    }
}
