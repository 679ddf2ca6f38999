//! Byte sinks the muxer flushes into.
//!
//! A transport only moves bytes: connection setup happens before the
//! [`Session`](crate::core::session::Session) is built and retries, if any,
//! are the transport's own business.

mod channel;
mod writer;

pub use channel::ChannelTransport;
pub use writer::WriterTransport;

use crate::error::TransportError;

pub trait Transport: Send {
    /// Writes one flushed chunk of the FLV stream. A chunk always ends on a
    /// tag boundary.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Releases the connection. Called once when the session is destroyed.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn close(&mut self) {
        (**self).close()
    }
}
