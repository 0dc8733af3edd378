//! The threaded engine front-end.

use crate::channel::{Channel, ChannelQueues, DispatchStats};
use crate::config::{Config, MAX_PATH, MAX_USERDATA_BYTES};
use crate::error::SendError;
use crate::handle::Handle;
use crate::pool::Pool;
use crate::provider::IoProvider;
use crate::request::Request;
use crate::stats::Stats;
use crate::worker::Worker;
use std::marker::PhantomData;
use std::sync::Arc;

/// State shared by the threaded and cooperative front-ends: the pool, the
/// normalized configuration, and the counters.
pub(crate) struct Core<F> {
    pub(crate) pool: Pool<F>,
    pub(crate) config: Config,
    pub(crate) stats: Stats,
}

impl<F> Core<F> {
    pub(crate) fn new(config: Config) -> Self {
        let config = config.normalized();
        Self {
            pool: Pool::new(config.max_requests),
            config,
            stats: Stats::default(),
        }
    }

    pub(crate) fn validate(&self, request: &Request) -> Result<(), SendError> {
        if request.path.is_empty() {
            return Err(SendError::EmptyPath);
        }
        if request.path.len() > MAX_PATH - 1 {
            return Err(SendError::PathTooLong {
                len: request.path.len(),
            });
        }
        if request.channel >= self.config.num_channels {
            return Err(SendError::InvalidChannel {
                channel: request.channel,
                num_channels: self.config.num_channels,
            });
        }
        if request.user_data.len() > MAX_USERDATA_BYTES {
            return Err(SendError::UserDataTooLarge {
                len: request.user_data.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn alloc(&mut self, request: Request) -> Result<Handle, SendError> {
        let Request {
            channel,
            path,
            buffer,
            user_data,
            callback,
        } = request;
        self.pool
            .alloc(|item| {
                item.channel = channel;
                item.path.set(&path);
                item.buffer = buffer;
                item.callback = Some(callback);
                item.user.data.set(&user_data);
            })
            .ok_or(SendError::PoolExhausted)
    }

    pub(crate) fn accepted(&mut self) {
        self.stats.sent += 1;
    }

    pub(crate) fn apply(&mut self, dispatched: DispatchStats) {
        self.stats.completed += dispatched.completed;
        self.stats.failed += dispatched.failed;
    }

    /// Counter snapshot; the live-request count comes straight from the pool.
    pub(crate) fn stats(&self) -> Stats {
        Stats {
            active: self.pool.live(),
            ..self.stats
        }
    }

    pub(crate) fn set_pause(&mut self, handle: Handle) -> bool {
        self.pool
            .items()
            .with_user(handle, |user| user.pause = true)
            .is_some()
    }

    pub(crate) fn set_resume(&mut self, handle: Handle) -> bool {
        self.pool
            .items()
            .with_user(handle, |user| user.resume = true)
            .is_some()
    }

    pub(crate) fn set_cancel(&mut self, handle: Handle) -> bool {
        self.pool
            .items()
            .with_user(handle, |user| user.cancel = true)
            .is_some()
    }
}

/// The fetch engine: a request pool, a set of channels with one worker
/// thread each, and a pump that drives every request's state machine from
/// the thread that created the loader.
///
/// A loader is bound to its creating thread (`!Send`): the whole public
/// surface, including every response callback, executes there. Multiple
/// loaders may coexist on different threads.
///
/// Dropping the loader is shutdown: each worker is stopped and joined, then
/// the pool is released. Callbacks for requests still in flight are not
/// invoked.
pub struct Loader<P: IoProvider> {
    // Declared before the core so drop joins every worker before the pool
    // (and the items the workers can see) goes away.
    channels: Vec<Channel>,
    core: Core<P::File>,
    provider: Arc<P>,
    _owner_thread: PhantomData<*const ()>,
}

impl<P: IoProvider> Loader<P> {
    /// Creates a loader with the default configuration (one channel, one
    /// lane, 128 request slots).
    pub fn new(provider: P) -> Self {
        Self::with_config(Config::default(), provider)
    }

    /// Creates a loader sized by `config` (zero fields mean defaults; the
    /// channel count is clamped to [`MAX_CHANNELS`](crate::MAX_CHANNELS)).
    /// All queue and pool storage is allocated here, once; no later
    /// operation allocates engine state.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned.
    pub fn with_config(config: Config, provider: P) -> Self {
        let core = Core::new(config);
        let provider = Arc::new(provider);
        let channels = (0..core.config.num_channels)
            .map(|index| Channel {
                queues: ChannelQueues::new(core.config.num_lanes, core.config.max_requests),
                worker: Worker::spawn(
                    index,
                    core.config.num_lanes,
                    core.pool.share(),
                    Arc::clone(&provider),
                ),
            })
            .collect();
        Self {
            channels,
            core,
            provider,
            _owner_thread: PhantomData,
        }
    }

    /// Submits a request. On success the request occupies a pool slot until
    /// its final callback; on failure nothing is retained and no callback
    /// will ever fire for it.
    pub fn send(&mut self, request: Request) -> Result<Handle, SendError> {
        self.core.validate(&request)?;
        let channel = request.channel;
        let handle = self.core.alloc(request)?;
        if !self.channels[channel].queues.try_send(handle) {
            self.core.pool.free(handle);
            return Err(SendError::ChannelFull { channel });
        }
        self.core.accepted();
        Ok(handle)
    }

    /// Drives every channel and delivers pending response callbacks.
    ///
    /// Runs the channel passes twice per call, so a request that just came
    /// back from its worker with more data pending re-enters the worker
    /// within the same call (one pump of latency per chunk instead of two).
    pub fn pump(&mut self) {
        for _pass in 0..2 {
            for channel in &mut self.channels {
                let dispatched = channel.dowork(&mut self.core.pool);
                self.core.apply(dispatched);
            }
        }
    }

    /// Returns `true` while `handle` refers to a live request. Handles of
    /// finished requests (and their reused slots) report `false`.
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.core.pool.is_valid(handle)
    }

    /// Parks the request after its current chunk; it keeps reporting
    /// `paused` callbacks until resumed. Returns whether the handle was
    /// live.
    pub fn pause(&mut self, handle: Handle) -> bool {
        self.core.set_pause(handle)
    }

    /// Continues a paused request from its stored offset.
    pub fn resume(&mut self, handle: Handle) -> bool {
        self.core.set_resume(handle)
    }

    /// Cancels the request: its next callback reports `failed`, `cancelled`
    /// and `finished`, then the slot is released. Cancelling an already
    /// finished handle is a no-op.
    pub fn cancel(&mut self, handle: Handle) -> bool {
        self.core.set_cancel(handle)
    }

    /// Engine counters as of the last pump.
    pub fn stats(&self) -> Stats {
        self.core.stats()
    }

    /// The shared I/O provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}
