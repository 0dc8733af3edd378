//! The per-callback response snapshot.

use crate::handle::Handle;
use crate::request::{State, UserSide};

/// Caller-provided response function, invoked once per state transition
/// visible to the caller, always on the engine's owning thread.
pub type ResponseCallback = Box<dyn FnMut(&mut Response<'_>) + 'static>;

/// Snapshot of one request's progress, valid only for the duration of the
/// callback it is passed to.
///
/// At most one of [`opened`](Self::opened), [`fetched`](Self::fetched),
/// [`paused`](Self::paused), [`failed`](Self::failed) is true;
/// [`finished`](Self::finished) and [`cancelled`](Self::cancelled) combine
/// with `failed`.
///
/// The response is also the only place a transfer buffer can be bound or
/// unbound: buffers move in and out through [`bind_buffer`](Self::bind_buffer)
/// and [`unbind_buffer`](Self::unbind_buffer), which confines those
/// operations to callback context by construction.
pub struct Response<'a> {
    pub(crate) handle: Handle,
    pub(crate) channel: usize,
    pub(crate) lane: usize,
    pub(crate) state: State,
    pub(crate) finished: bool,
    pub(crate) cancelled: bool,
    pub(crate) content_size: u64,
    pub(crate) chunk_offset: u64,
    pub(crate) fetched_size: usize,
    pub(crate) path: &'a str,
    pub(crate) user: &'a mut UserSide,
    pub(crate) buffer: &'a mut Option<Vec<u8>>,
}

impl Response<'_> {
    /// The handle of the request this response belongs to.
    #[inline]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The channel the request was sent on.
    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// The lane occupied on that channel.
    #[inline]
    pub fn lane(&self) -> usize {
        self.lane
    }

    /// The resource was opened and its size is known; no buffer was bound,
    /// so the caller is expected to bind one now.
    #[inline]
    pub fn opened(&self) -> bool {
        self.state == State::Opened
    }

    /// A chunk of data is available in the bound buffer.
    #[inline]
    pub fn fetched(&self) -> bool {
        self.state == State::Fetched
    }

    /// The request is parked by a pause.
    #[inline]
    pub fn paused(&self) -> bool {
        self.state == State::Paused
    }

    /// The request failed (I/O error, missing buffer, or cancellation).
    #[inline]
    pub fn failed(&self) -> bool {
        self.state == State::Failed
    }

    /// This is the final callback for the request; its handle is invalid
    /// once the callback returns.
    #[inline]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// The failure was caused by [`cancel`](crate::Loader::cancel).
    #[inline]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Total size of the resource, as reported by the provider at open.
    #[inline]
    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    /// Offset of the currently reported chunk within the resource.
    #[inline]
    pub fn content_offset(&self) -> u64 {
        self.chunk_offset
    }

    /// Length of the currently reported chunk.
    #[inline]
    pub fn fetched_size(&self) -> usize {
        self.fetched_size
    }

    /// The request's path or URL.
    #[inline]
    pub fn path(&self) -> &str {
        self.path
    }

    /// Read/write view of the inline user-data block copied at send time.
    #[inline]
    pub fn user_data(&mut self) -> &mut [u8] {
        self.user.data.as_mut_slice()
    }

    /// The currently delivered chunk, or empty outside a `fetched` callback.
    pub fn data(&self) -> &[u8] {
        if self.state == State::Fetched {
            self.buffer
                .as_deref()
                .map_or(&[], |buf| &buf[..self.fetched_size])
        } else {
            &[]
        }
    }

    /// The bound transfer buffer, if any.
    #[inline]
    pub fn buffer(&mut self) -> Option<&mut Vec<u8>> {
        self.buffer.as_mut()
    }

    /// Binds a transfer buffer to the request. The buffer's length (not its
    /// capacity) is the chunk size used for streaming.
    ///
    /// # Panics
    ///
    /// Panics if a buffer is already bound; unbind first.
    pub fn bind_buffer(&mut self, buffer: Vec<u8>) {
        assert!(
            self.buffer.is_none(),
            "request already has a bound buffer; unbind it first"
        );
        *self.buffer = Some(buffer);
    }

    /// Unbinds and returns the transfer buffer. Returns the very vector that
    /// was bound, unchanged in identity.
    pub fn unbind_buffer(&mut self) -> Option<Vec<u8>> {
        self.buffer.take()
    }

    /// Requests a pause; takes effect on the next pump pass.
    #[inline]
    pub fn pause(&mut self) {
        self.user.pause = true;
    }

    /// Requests that a paused request continue streaming.
    #[inline]
    pub fn resume(&mut self) {
        self.user.resume = true;
    }

    /// Requests cancellation; the request fails with `cancelled` set on the
    /// next pump pass.
    #[inline]
    pub fn cancel(&mut self) {
        self.user.cancel = true;
    }
}
