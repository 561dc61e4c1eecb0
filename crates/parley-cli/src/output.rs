//! Terminal output helpers.

use std::io::{self, Write};

use parking_lot::Mutex;
use serde::Serialize;

use parley_core::TextSink;

/// Sink that turns cumulative text into incremental writes.
///
/// The agent emits the whole answer so far on every update; only the new
/// suffix is written. If the text stops extending what was already written,
/// the sink starts a fresh line with the full text.
pub struct DeltaWriter<W: Write + Send> {
    state: Mutex<DeltaState<W>>,
}

struct DeltaState<W> {
    writer: W,
    written: String,
}

impl<W: Write + Send> DeltaWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(DeltaState {
                writer,
                written: String::new(),
            }),
        }
    }

    /// Everything written so far.
    pub fn written(&self) -> String {
        self.state.lock().written.clone()
    }

    pub fn into_inner(self) -> W {
        self.state.into_inner().writer
    }
}

impl DeltaWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextSink for DeltaWriter<W> {
    fn emit(&self, text: &str) {
        let mut state = self.state.lock();
        let DeltaState { writer, written } = &mut *state;

        let result = match text.strip_prefix(written.as_str()) {
            Some(delta) if delta.is_empty() => return,
            Some(delta) => writer.write_all(delta.as_bytes()),
            None => writer
                .write_all(b"\n")
                .and_then(|_| writer.write_all(text.as_bytes())),
        };
        if let Err(e) = result.and_then(|_| writer.flush()) {
            tracing::debug!(error = %e, "Failed to write streamed text");
        }
        *written = text.to_string();
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shorten `text` to at most `max` characters for table output.
pub fn truncate(text: &str, max: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max {
        return single_line;
    }
    let cut: String = single_line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
