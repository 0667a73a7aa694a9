pub mod event;
pub mod lines;

pub use event::{StreamEvent, ToolCategory, decode_event};
pub use lines::LineReassembler;

use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Async iterator of complete records over any byte source, built on the
/// line reassembler so callers never see the source's chunking.
pub struct RecordStream<R> {
    source: R,
    lines: LineReassembler,
    ready: VecDeque<String>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> RecordStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            lines: LineReassembler::new(),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Suspends until the next complete record is available; `None` once the
    /// source is exhausted and the carry-over buffer is drained.
    pub async fn next_record(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Ok(Some(record));
            }
            if self.eof {
                return Ok(None);
            }

            let mut chunk = [0u8; 4096];
            let n = self.source.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                self.ready.extend(self.lines.finish());
            } else {
                self.ready.extend(self.lines.push(&chunk[..n]));
            }
        }
    }
}

/// Async iterator of decoded stream events. Strips event-stream `data:`
/// framing when present and silently skips records that do not decode,
/// per the tolerant-decoder contract.
pub struct EventStream<R> {
    records: RecordStream<R>,
}

impl<R: AsyncRead + Unpin> EventStream<R> {
    pub fn new(source: R) -> Self {
        Self {
            records: RecordStream::new(source),
        }
    }

    pub async fn next_event(&mut self) -> std::io::Result<Option<StreamEvent>> {
        while let Some(record) = self.records.next_record().await? {
            let payload = match record.strip_prefix("data:") {
                Some(rest) => rest.trim_start(),
                None => record.as_str(),
            };
            if let Some(event) = decode_event(payload) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}
