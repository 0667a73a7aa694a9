use tracing_subscriber::fmt::MakeWriter;

/// Tees formatted log lines to stdout and a broadcast channel so the
/// daemon's log stream endpoint can replay them to connected clients.
#[derive(Clone)]
pub(crate) struct LogFanoutWriter {
    pub sender: tokio::sync::broadcast::Sender<String>,
}

impl<'a> MakeWriter<'a> for LogFanoutWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            sender: self.sender.clone(),
        }
    }
}

pub(crate) struct LogWriter {
    sender: tokio::sync::broadcast::Sender<String>,
}

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let msg = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(msg); // Ignored if no receivers
        std::io::stdout().write(buf)?;
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stdout().flush()
    }
}
