use crate::error::TransportError;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, Sender};
use log::debug;

/// Forwards every flushed chunk over a crossbeam channel.
///
/// Useful for handing the stream to another thread that owns the real
/// connection, or for inspecting the output in tests.
pub struct ChannelTransport {
    sender: Option<Sender<Vec<u8>>>,
}

impl ChannelTransport {
    pub fn new(sender: Sender<Vec<u8>>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Creates an unbounded transport together with its receiving end.
    pub fn unbounded() -> (Self, Receiver<Vec<u8>>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl Transport for ChannelTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let sender = self.sender.as_ref().ok_or(TransportError::Closed)?;
        sender
            .send(data.to_vec())
            .map_err(|_| TransportError::Disconnected)
    }

    fn close(&mut self) {
        if self.sender.take().is_some() {
            debug!("Channel transport closed.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwards_chunks() {
        let (mut transport, receiver) = ChannelTransport::unbounded();
        transport.write(b"abc").unwrap();
        transport.write(b"de").unwrap();
        assert_eq!(receiver.try_recv().unwrap(), b"abc");
        assert_eq!(receiver.try_recv().unwrap(), b"de");
    }

    #[test]
    fn test_disconnected_receiver() {
        let (mut transport, receiver) = ChannelTransport::unbounded();
        drop(receiver);
        assert!(matches!(
            transport.write(b"x"),
            Err(TransportError::Disconnected)
        ));
    }

    #[test]
    fn test_write_after_close() {
        let (mut transport, receiver) = ChannelTransport::unbounded();
        transport.close();
        assert!(matches!(transport.write(b"x"), Err(TransportError::Closed)));
        assert!(receiver.recv().is_err());
    }
}
