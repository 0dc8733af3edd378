/// Upper bound on configured channels. Indices at or above this are rejected
/// at setup by clamping.
pub const MAX_CHANNELS: usize = 16;

/// Maximum path/URL length in bytes, including one reserved terminator slot.
/// The longest accepted path is `MAX_PATH - 1` bytes.
pub const MAX_PATH: usize = 1024;

/// Size of the inline per-request user-data block (16 x u64, 8-byte aligned).
pub const MAX_USERDATA_BYTES: usize = 128;

/// Engine sizing, fixed at setup. All queue and pool storage is allocated
/// once from these values; nothing grows afterwards.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Total request slots across all channels (default: 128). Zero means
    /// default. Clamped to the 16-bit handle index space.
    pub max_requests: usize,
    /// Number of independent channels (default: 1). Zero means default.
    /// Clamped to [`MAX_CHANNELS`].
    pub num_channels: usize,
    /// Concurrent in-flight requests per channel (default: 1). Zero means
    /// default.
    pub num_lanes: usize,
}

impl Config {
    /// Returns the configuration with zeros replaced by defaults and the
    /// channel count and request count clamped to their compile-time ceilings.
    pub(crate) fn normalized(self) -> Self {
        let defaults = Self::default();
        let max_requests = if self.max_requests == 0 {
            defaults.max_requests
        } else {
            // Handles carry a 16-bit index and index 0 is reserved.
            self.max_requests.min(u16::MAX as usize - 1)
        };
        let num_channels = if self.num_channels == 0 {
            defaults.num_channels
        } else {
            self.num_channels.min(MAX_CHANNELS)
        };
        let num_lanes = if self.num_lanes == 0 {
            defaults.num_lanes
        } else {
            self.num_lanes
        };
        Self {
            max_requests,
            num_channels,
            num_lanes,
        }
    }

    /// Sets the total request slot count.
    pub fn with_max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    /// Sets the channel count.
    pub fn with_channels(mut self, n: usize) -> Self {
        self.num_channels = n;
        self
    }

    /// Sets the per-channel lane count.
    pub fn with_lanes(mut self, n: usize) -> Self {
        self.num_lanes = n;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_requests: 128,
            num_channels: 1,
            num_lanes: 1,
        }
    }
}
