//! Incremental text delivery.

/// Receives the assistant's text as it streams in.
///
/// `emit` is called with the **cumulative** text so far after every
/// increment, never with a bare delta.
pub trait TextSink: Send + Sync {
    fn emit(&self, text: &str);
}

impl<F> TextSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn emit(&self, text: &str) {
        self(text)
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSink;

impl TextSink for NoOpSink {
    fn emit(&self, _text: &str) {}
}
