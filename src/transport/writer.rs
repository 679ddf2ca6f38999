use crate::error::TransportError;
use crate::transport::Transport;
use std::io::Write;

/// Writes the stream to any [`Write`] implementation, e.g. a `.flv` file.
pub struct WriterTransport<W: Write + Send> {
    writer: Option<W>,
}

impl<W: Write + Send> WriterTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// Returns the inner writer, or `None` once the transport has been closed.
    pub fn into_inner(self) -> Option<W> {
        self.writer
    }
}

impl<W: Write + Send> Transport for WriterTransport<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush writer on close: {e}");
            }
        }
    }
}
