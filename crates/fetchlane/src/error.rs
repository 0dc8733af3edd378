//! Error types for request submission.

use crate::config::{MAX_PATH, MAX_USERDATA_BYTES};
use thiserror::Error;

/// Errors returned by [`Loader::send`](crate::Loader::send).
///
/// Every variant is loud and leaves no partial state behind: a failed send
/// allocates nothing and delivers no callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The request path was empty.
    #[error("request path is empty")]
    EmptyPath,

    /// The request path exceeds the inline storage bound.
    #[error("request path is {len} bytes, must be shorter than {MAX_PATH}")]
    PathTooLong {
        /// Length of the rejected path in bytes.
        len: usize,
    },

    /// The channel index is outside the configured range.
    #[error("channel {channel} out of range ({num_channels} configured)")]
    InvalidChannel {
        /// The rejected channel index.
        channel: usize,
        /// Number of channels configured at setup.
        num_channels: usize,
    },

    /// The user-data block exceeds the inline storage bound.
    #[error("user data is {len} bytes, limit is {MAX_USERDATA_BYTES}")]
    UserDataTooLarge {
        /// Length of the rejected user-data block.
        len: usize,
    },

    /// All request slots are in use.
    #[error("request pool exhausted")]
    PoolExhausted,

    /// The channel's sent queue is full.
    #[error("sent queue full on channel {channel}")]
    ChannelFull {
        /// The channel whose queue was full.
        channel: usize,
    },
}

impl SendError {
    /// Returns `true` for transient admission failures that may succeed
    /// after a few [`pump`](crate::Loader::pump) calls free up slots.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PoolExhausted | Self::ChannelFull { .. })
    }
}
