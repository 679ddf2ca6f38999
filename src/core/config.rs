use crate::core::packet_queue::DEFAULT_QUEUE_CAPACITY;
use crate::error::SessionCreateError;
use log::LevelFilter;
use std::time::Duration;

/// Default size of the serialization buffer (one header or one frame).
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024 * 1024;
/// Default size of the per-frame scratch buffer used by packetizers.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 4 * 1024 * 1024;
/// How long the send pipeline waits on an empty queue before rechecking its status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Tunables for one [`Session`](crate::core::session::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub buffer_capacity: usize,
    pub scratch_capacity: usize,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    /// Verbosity of this session's per-packet logging. Records still go
    /// through the global `log` facade, so its own filter applies as well.
    pub log_level: LevelFilter,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_level: LevelFilter::Info,
        }
    }
}

impl SessionConfig {
    pub(crate) fn validate(&self) -> Result<(), SessionCreateError> {
        if self.buffer_capacity == 0 {
            return Err(SessionCreateError::ZeroBufferCapacity);
        }
        if self.scratch_capacity == 0 {
            return Err(SessionCreateError::ZeroScratchCapacity);
        }
        if self.queue_capacity == 0 {
            return Err(SessionCreateError::ZeroQueueCapacity);
        }
        if self.poll_interval.is_zero() {
            return Err(SessionCreateError::ZeroPollInterval);
        }
        Ok(())
    }

    pub(crate) fn log_enabled(&self, level: log::Level) -> bool {
        level <= self.log_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = SessionConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(SessionCreateError::ZeroQueueCapacity));

        let config = SessionConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(SessionCreateError::ZeroPollInterval));
    }

    #[test]
    fn test_log_gate() {
        let config = SessionConfig {
            log_level: LevelFilter::Info,
            ..Default::default()
        };
        assert!(config.log_enabled(log::Level::Warn));
        assert!(!config.log_enabled(log::Level::Debug));
    }
}
