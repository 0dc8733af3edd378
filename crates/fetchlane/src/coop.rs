//! Cooperative (single-threaded) engine front-end.
//!
//! On hosts without worker threads the state machine and queues are the same
//! as in [`Loader`](crate::Loader); only the handoff differs. Instead of
//! moving ids into a worker mailbox, the pump asks the provider to *start*
//! each operation, and the host's event loop later delivers the result
//! through the three completion entry points, on the same thread that
//! pumps. Completions may arrive in any order across lanes; callbacks are
//! still delivered in the order items complete.

use crate::channel::ChannelQueues;
use crate::config::Config;
use crate::engine::Core;
use crate::error::SendError;
use crate::handle::Handle;
use crate::request::{Request, State};
use crate::stats::Stats;
use std::marker::PhantomData;

/// A non-blocking I/O starter for cooperative hosts.
///
/// `start_*` must not complete the operation inline; they kick off work whose
/// result the host later feeds back via
/// [`CoopLoader::complete_open`], [`CoopLoader::complete_read`], or
/// [`CoopLoader::complete_failed`], always on the loader's thread. The host
/// must deliver exactly one completion per started operation; the entry
/// points reject stale handles and mismatched states, but a doubled
/// completion for a still-pending item is indistinguishable from a real one.
pub trait CoopProvider: 'static {
    /// Begin resolving `path` to an open resource and its content size.
    fn start_open(&mut self, handle: Handle, path: &str);

    /// Begin reading `len` bytes at `offset`. The data itself arrives
    /// through `complete_read`; the engine copies it into the bound buffer.
    fn start_read(&mut self, handle: Handle, offset: u64, len: usize);
}

/// The cooperative fetch engine. Same public surface and semantics as
/// [`Loader`](crate::Loader), minus worker threads.
pub struct CoopLoader<P: CoopProvider> {
    channels: Vec<ChannelQueues>,
    core: Core<()>,
    provider: P,
    _owner_thread: PhantomData<*const ()>,
}

impl<P: CoopProvider> CoopLoader<P> {
    /// Creates a cooperative loader with the default configuration.
    pub fn new(provider: P) -> Self {
        Self::with_config(Config::default(), provider)
    }

    /// Creates a cooperative loader sized by `config` (zero fields mean
    /// defaults).
    pub fn with_config(config: Config, provider: P) -> Self {
        let core = Core::new(config);
        let channels = (0..core.config.num_channels)
            .map(|_| ChannelQueues::new(core.config.num_lanes, core.config.max_requests))
            .collect();
        Self {
            channels,
            core,
            provider,
            _owner_thread: PhantomData,
        }
    }

    /// Submits a request; see [`Loader::send`](crate::Loader::send).
    pub fn send(&mut self, request: Request) -> Result<Handle, SendError> {
        self.core.validate(&request)?;
        let channel = request.channel;
        let handle = self.core.alloc(request)?;
        if !self.channels[channel].try_send(handle) {
            self.core.pool.free(handle);
            return Err(SendError::ChannelFull { channel });
        }
        self.core.accepted();
        Ok(handle)
    }

    /// Drives every channel: admission, transitions, provider starts, and
    /// callback dispatch, twice per call (same double-pump as the threaded
    /// engine).
    pub fn pump(&mut self) {
        let Self {
            channels,
            core,
            provider,
            ..
        } = self;
        for _pass in 0..2 {
            for queues in channels.iter_mut() {
                queues.admit(core.pool.items());
                queues.apply_transitions(core.pool.items());

                // Handoff: start provider operations in place of a worker.
                // Started items stay out of every queue until a completion
                // entry point hands them back.
                while !queues.user_incoming.is_empty() {
                    let bits = queues.user_incoming.dequeue();
                    let handle = Handle::from_bits(bits);
                    let Some(item) = core.pool.items().lookup_mut(handle) else {
                        debug_assert!(false, "stale id in user_incoming");
                        continue;
                    };
                    match item.state {
                        State::Opening => provider.start_open(handle, item.path.as_str()),
                        State::Fetching => match item.buffer.as_ref() {
                            Some(buffer) => {
                                let remaining =
                                    item.io.content_size.saturating_sub(item.io.content_offset);
                                let len = (buffer.len() as u64).min(remaining) as usize;
                                provider.start_read(handle, item.io.content_offset, len);
                            }
                            None => {
                                item.io.failed = true;
                                item.io.finished = true;
                                queues.user_outgoing.enqueue(bits);
                            }
                        },
                        // Paused and Failed pass straight through, as the
                        // threaded worker would.
                        _ => queues.user_outgoing.enqueue(bits),
                    }
                }

                let dispatched = queues.dispatch(&mut core.pool);
                core.apply(dispatched);
            }
        }
    }

    /// Completion of a `start_open`: records the content size. With a buffer
    /// already bound the first range read starts immediately; otherwise the
    /// item is queued so the next pump delivers an `opened` callback.
    ///
    /// Returns `false` (and does nothing) for stale handles or items not
    /// waiting on an open.
    pub fn complete_open(&mut self, handle: Handle, content_size: u64) -> bool {
        let Self {
            channels,
            core,
            provider,
            ..
        } = self;
        let Some(item) = core.pool.items().lookup_mut(handle) else {
            return false;
        };
        if item.state != State::Opening {
            return false;
        }
        item.io.content_size = content_size;
        if let Some(buffer) = item.buffer.as_ref() {
            let len = (buffer.len() as u64).min(content_size) as usize;
            provider.start_read(handle, 0, len);
        } else {
            channels[item.channel].user_outgoing.enqueue(handle.to_bits());
        }
        true
    }

    /// Completion of a `start_read`: copies `data` into the bound buffer,
    /// advances the offset, and marks the request finished once the content
    /// size is exhausted. A chunk larger than the buffer (or arriving with
    /// no buffer bound) fails the request.
    pub fn complete_read(&mut self, handle: Handle, data: &[u8]) -> bool {
        let Self { channels, core, .. } = self;
        let Some(item) = core.pool.items().lookup_mut(handle) else {
            return false;
        };
        if !matches!(item.state, State::Opening | State::Fetching) {
            return false;
        }
        match item.buffer.as_mut() {
            Some(buffer) if data.len() <= buffer.len() => {
                buffer[..data.len()].copy_from_slice(data);
                item.io.fetched_size = data.len();
                item.io.content_offset += data.len() as u64;
                if item.io.content_offset >= item.io.content_size {
                    item.io.finished = true;
                }
            }
            _ => {
                item.io.failed = true;
                item.io.finished = true;
            }
        }
        channels[item.channel].user_outgoing.enqueue(handle.to_bits());
        true
    }

    /// Failure of an in-flight open or read: the request's next callback
    /// reports `failed` and `finished`.
    pub fn complete_failed(&mut self, handle: Handle) -> bool {
        let Self { channels, core, .. } = self;
        let Some(item) = core.pool.items().lookup_mut(handle) else {
            return false;
        };
        if !matches!(item.state, State::Opening | State::Fetching) {
            return false;
        }
        item.io.failed = true;
        item.io.finished = true;
        channels[item.channel].user_outgoing.enqueue(handle.to_bits());
        true
    }

    /// See [`Loader::is_valid`](crate::Loader::is_valid).
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.core.pool.is_valid(handle)
    }

    /// See [`Loader::pause`](crate::Loader::pause).
    pub fn pause(&mut self, handle: Handle) -> bool {
        self.core.set_pause(handle)
    }

    /// See [`Loader::resume`](crate::Loader::resume).
    pub fn resume(&mut self, handle: Handle) -> bool {
        self.core.set_resume(handle)
    }

    /// See [`Loader::cancel`](crate::Loader::cancel).
    pub fn cancel(&mut self, handle: Handle) -> bool {
        self.core.set_cancel(handle)
    }

    /// Engine counters as of the last pump.
    pub fn stats(&self) -> Stats {
        self.core.stats()
    }

    /// The wrapped provider.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}
