//! Non-blocking output draining with a bounded per-stream line buffer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Longest line kept; the rest of an over-long line is discarded.
pub const MAX_LINE_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug)]
struct TailState {
    capacity: usize,
    stdout: VecDeque<String>,
    stderr: VecDeque<String>,
}

/// Last `capacity` lines of stdout and stderr, shared between drain tasks
/// and the completion watcher.
#[derive(Debug, Clone)]
pub struct OutputTail {
    state: Arc<Mutex<TailState>>,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(TailState {
                capacity,
                stdout: VecDeque::with_capacity(capacity),
                stderr: VecDeque::with_capacity(capacity),
            })),
        }
    }

    pub fn push(&self, kind: StreamKind, line: String) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let capacity = state.capacity;
        if capacity == 0 {
            return;
        }
        let buf = match kind {
            StreamKind::Stdout => &mut state.stdout,
            StreamKind::Stderr => &mut state.stderr,
        };
        if buf.len() == capacity {
            buf.pop_front();
        }
        buf.push_back(line);
    }

    /// Oldest first.
    pub fn lines(&self, kind: StreamKind) -> Vec<String> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        match kind {
            StreamKind::Stdout => state.stdout.iter().cloned().collect(),
            StreamKind::Stderr => state.stderr.iter().cloned().collect(),
        }
    }

    /// Diagnostic text for a failed capture: the exit description followed by
    /// whatever output was retained.
    pub fn failure_message(&self, exit: &str) -> String {
        let mut msg = format!("capture process failed: {exit}");
        for kind in [StreamKind::Stderr, StreamKind::Stdout] {
            let lines = self.lines(kind);
            if !lines.is_empty() {
                msg.push_str(&format!("\n--- {kind} ---\n"));
                msg.push_str(&lines.join("\n"));
            }
        }
        msg
    }
}

/// Read `reader` to EOF, splitting on `\n` or `\r`, stripping ANSI escapes
/// and decoding lossily. Never fails; read errors end the drain.
pub async fn drain<R>(reader: R, kind: StreamKind, tail: OutputTail, label: String)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::with_capacity(256);
    loop {
        let consumed = {
            let buf = match reader.fill_buf().await {
                Ok(buf) => buf,
                Err(e) => {
                    debug!(recording_id = %label, stream = %kind, "drain read error: {e}");
                    break;
                }
            };
            if buf.is_empty() {
                break;
            }
            for &b in buf {
                if b == b'\n' || b == b'\r' {
                    flush_line(&mut line, kind, &tail, &label);
                } else if line.len() < MAX_LINE_BYTES {
                    line.push(b);
                }
            }
            buf.len()
        };
        reader.consume(consumed);
    }
    flush_line(&mut line, kind, &tail, &label);
}

fn flush_line(line: &mut Vec<u8>, kind: StreamKind, tail: &OutputTail, label: &str) {
    if line.is_empty() {
        return;
    }
    let stripped = strip_ansi_escapes::strip(line.as_slice());
    let text = String::from_utf8_lossy(&stripped).trim_end().to_string();
    line.clear();
    if text.is_empty() {
        return;
    }
    debug!(recording_id = %label, stream = %kind, "{text}");
    tail.push(kind, text);
}
