// src/core/packet_queue.rs - Producer/consumer packet queue
//
// - Bounded crossbeam channel, producers never block (full queue is an error)
// - Every pushed packet is deep-copied, the caller keeps its buffer
// - Single FIFO order shared by audio and video

use crate::core::media_packet::MediaPacket;
use crate::error::QueueError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A packet owned by the queue until popped, then by the consumer.
///
/// Dropping the item releases its payload.
#[derive(Debug)]
pub struct QueueItem {
    packet: MediaPacket,
}

impl QueueItem {
    pub fn packet(&self) -> &MediaPacket {
        &self.packet
    }

    pub fn into_packet(self) -> MediaPacket {
        self.packet
    }
}

/// Cloneable handle to a session's packet queue.
///
/// Every clone refers to the same queue, so producers on other threads can
/// hold their own handle.
#[derive(Clone)]
pub struct PacketQueue {
    sender: Sender<QueueItem>,
    receiver: Receiver<QueueItem>,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Deep-copies `packet` and enqueues the copy.
    pub fn push(&self, packet: &MediaPacket) -> Result<(), QueueError> {
        let item = QueueItem {
            packet: packet.deep_copy(),
        };
        // every handle owns a receiver, so a send can only fail on a full channel
        self.sender.try_send(item).map_err(|_| QueueError::Full {
            capacity: self.capacity,
        })
    }

    /// Returns the oldest item, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<QueueItem> {
        match self.receiver.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Like [`pop`](Self::pop) but waits up to `timeout` for an item.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<QueueItem> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discards every queued item. Returns how many were dropped.
    pub fn flush(&self) -> usize {
        self.receiver.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media_packet::{AudioCodec, AudioFormat, VideoFormat};
    use std::thread;

    fn video(tag: u8) -> MediaPacket {
        MediaPacket::video(vec![tag; 8], VideoFormat::new(320, 240, 100_000))
    }

    fn audio(tag: u8) -> MediaPacket {
        MediaPacket::audio(vec![tag; 4], AudioFormat::new(AudioCodec::Aac, 44100, 2))
    }

    #[test]
    fn test_fifo_order() {
        let queue = PacketQueue::new(16);
        let packets = vec![video(1), audio(2), video(3), audio(4), audio(5)];
        for packet in &packets {
            queue.push(packet).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let popped: Vec<MediaPacket> = std::iter::from_fn(|| queue.pop())
            .map(QueueItem::into_packet)
            .collect();
        assert_eq!(popped, packets);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty() {
        let queue = PacketQueue::new(4);
        assert!(queue.pop().is_none());
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_deep_copy_isolation() {
        let queue = PacketQueue::new(4);
        let mut packet = video(7);
        queue.push(&packet).unwrap();

        if let MediaPacket::Video(v) = &mut packet {
            v.data.iter_mut().for_each(|b| *b = 0xFF);
        }
        drop(packet);

        let item = queue.pop().unwrap();
        assert_eq!(item.packet().data(), &[7u8; 8]);
    }

    #[test]
    fn test_full_queue_rejects() {
        let queue = PacketQueue::new(2);
        queue.push(&video(1)).unwrap();
        queue.push(&video(2)).unwrap();
        let result = queue.push(&video(3));
        assert_eq!(result, Err(QueueError::Full { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clone_outlives_original() {
        let queue = PacketQueue::new(2);
        let producer = queue.clone();
        drop(queue);
        producer.push(&audio(1)).unwrap();
        producer.push(&audio(2)).unwrap();
        assert_eq!(
            producer.push(&audio(3)),
            Err(QueueError::Full { capacity: 2 })
        );
        assert_eq!(producer.pop().unwrap().packet().data(), &[1u8; 4]);
    }

    #[test]
    fn test_flush() {
        let queue = PacketQueue::new(8);
        for i in 0..5 {
            queue.push(&audio(i)).unwrap();
        }
        assert_eq!(queue.flush(), 5);
        assert!(queue.is_empty());
        assert_eq!(queue.flush(), 0);
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = PacketQueue::new(1024);
        let handles: Vec<_> = (0..4u8)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        queue.push(&video(producer)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);

        let mut counts = [0usize; 4];
        while let Some(item) = queue.pop() {
            counts[item.packet().data()[0] as usize] += 1;
        }
        assert_eq!(counts, [100; 4]);
    }
}
