//! The public request descriptor and the per-slot request records.

use crate::config::{MAX_PATH, MAX_USERDATA_BYTES};
use crate::handle::Handle;
use crate::response::{Response, ResponseCallback};

/// Describes one fetch to [`send`](crate::Loader::send).
///
/// Only the path and the response callback are mandatory. A transfer buffer
/// may be bound up front (streaming starts immediately) or later from inside
/// an `opened` callback.
pub struct Request {
    pub(crate) channel: usize,
    pub(crate) path: String,
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) user_data: Vec<u8>,
    pub(crate) callback: ResponseCallback,
}

impl Request {
    /// Creates a request for `path` delivering progress to `callback`.
    pub fn new(path: impl Into<String>, callback: impl FnMut(&mut Response<'_>) + 'static) -> Self {
        Self {
            channel: 0,
            path: path.into(),
            buffer: None,
            user_data: Vec::new(),
            callback: Box::new(callback),
        }
    }

    /// Selects the channel the request runs on (default 0). The channel is
    /// fixed for the request's lifetime.
    pub fn on_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    /// Pre-binds a transfer buffer. The buffer's length is the chunk size;
    /// the same vector is handed back through
    /// [`Response::unbind_buffer`](crate::Response::unbind_buffer).
    pub fn with_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Copies up to [`MAX_USERDATA_BYTES`] of user data into the request's
    /// inline block, writable from every callback via
    /// [`Response::user_data`](crate::Response::user_data).
    pub fn with_user_data(mut self, data: &[u8]) -> Self {
        self.user_data = data.to_vec();
        self
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("channel", &self.channel)
            .field("path", &self.path)
            .field("buffer_len", &self.buffer.as_ref().map(Vec::len))
            .field("user_data_len", &self.user_data.len())
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of one request.
///
/// Only the side that currently owns the item (caller side or worker side,
/// determined by which queue its slot id resides in) may change this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum State {
    /// Zero-init only; never observed once a slot is allocated.
    #[default]
    Initial,
    /// Allocated by `send`, waiting in the sent queue or for its first pass.
    Allocated,
    /// Handed to the I/O side to open the resource and learn its size.
    Opening,
    /// Open succeeded with no buffer bound; the caller gets an `opened`
    /// callback and is expected to bind one.
    Opened,
    /// Handed to the I/O side to read the next chunk.
    Fetching,
    /// A chunk arrived; the caller gets a `fetched` callback.
    Fetched,
    /// Parked by the pause flag; cycles through with `paused` callbacks.
    Paused,
    /// Terminal failure (I/O error, missing buffer, or cancellation).
    Failed,
}

/// Caller-side sub-record. Touched only on the owner thread.
///
/// The pause/resume/cancel flags may be written at any time between pumps;
/// the per-pass transition step consumes them. The size/offset fields mirror
/// the io side as of the most recent drain and back the response snapshot.
#[derive(Debug, Default)]
pub(crate) struct UserSide {
    pub(crate) pause: bool,
    pub(crate) resume: bool,
    pub(crate) cancel: bool,
    pub(crate) content_size: u64,
    pub(crate) content_offset: u64,
    pub(crate) fetched_size: usize,
    pub(crate) finished: bool,
    pub(crate) data: UserData,
}

/// I/O-side sub-record. Touched only by whichever side owns the item via
/// queue position: the worker between inbox-dequeue and outbox-enqueue, the
/// caller during drain.
#[derive(Debug)]
pub(crate) struct IoSide<F> {
    /// Open provider resource. `None` before open and after close; dropping
    /// it is what closes the resource.
    pub(crate) file: Option<F>,
    pub(crate) content_size: u64,
    pub(crate) content_offset: u64,
    pub(crate) fetched_size: usize,
    pub(crate) failed: bool,
    pub(crate) finished: bool,
}

impl<F> Default for IoSide<F> {
    fn default() -> Self {
        Self {
            file: None,
            content_size: 0,
            content_offset: 0,
            fetched_size: 0,
            failed: false,
            finished: false,
        }
    }
}

/// Inline bounded path storage, filled once at allocation.
pub(crate) struct InlinePath {
    buf: [u8; MAX_PATH],
    len: usize,
}

impl InlinePath {
    pub(crate) fn empty() -> Self {
        Self {
            buf: [0; MAX_PATH],
            len: 0,
        }
    }

    /// Copies `path` into the inline buffer. Length is validated at send.
    pub(crate) fn set(&mut self, path: &str) {
        debug_assert!(path.len() < MAX_PATH);
        self.buf[..path.len()].copy_from_slice(path.as_bytes());
        self.len = path.len();
    }

    pub(crate) fn as_str(&self) -> &str {
        // SAFETY: the buffer is only ever written from `&str` in `set`, so
        // the first `len` bytes are valid UTF-8.
        unsafe { std::str::from_utf8_unchecked(&self.buf[..self.len]) }
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}

impl std::fmt::Debug for InlinePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InlinePath").field(&self.as_str()).finish()
    }
}

/// Inline user-data block carried with the request and writable from every
/// callback. 8-byte aligned so callers can overlay small POD records.
#[repr(align(8))]
pub(crate) struct UserData {
    buf: [u8; MAX_USERDATA_BYTES],
    len: usize,
}

impl UserData {
    pub(crate) fn set(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= MAX_USERDATA_BYTES);
        self.buf[..data.len()].copy_from_slice(data);
        self.len = data.len();
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }
}

impl Default for UserData {
    fn default() -> Self {
        Self {
            buf: [0; MAX_USERDATA_BYTES],
            len: 0,
        }
    }
}

impl std::fmt::Debug for UserData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserData").field("len", &self.len).finish()
    }
}

/// One pool slot. `handle` is the invalid handle exactly while the slot is
/// free.
pub(crate) struct Item<F> {
    pub(crate) handle: Handle,
    pub(crate) state: State,
    /// Channel index, fixed at send time.
    pub(crate) channel: usize,
    /// Lane on that channel; `None` until admitted, then fixed until free.
    pub(crate) lane: Option<usize>,
    pub(crate) path: InlinePath,
    /// Caller-owned transfer buffer, held while bound. The engine never
    /// allocates or resizes it.
    pub(crate) buffer: Option<Vec<u8>>,
    pub(crate) callback: Option<ResponseCallback>,
    pub(crate) user: UserSide,
    pub(crate) io: IoSide<F>,
}

impl<F> Item<F> {
    pub(crate) fn vacant() -> Self {
        Self {
            handle: Handle::INVALID,
            state: State::Initial,
            channel: 0,
            lane: None,
            path: InlinePath::empty(),
            buffer: None,
            callback: None,
            user: UserSide::default(),
            io: IoSide::default(),
        }
    }

    /// Resets the slot to vacant, dropping the callback, any bound buffer,
    /// and any still-open provider resource.
    pub(crate) fn reset(&mut self) {
        self.handle = Handle::INVALID;
        self.state = State::Initial;
        self.channel = 0;
        self.lane = None;
        self.path.clear();
        self.buffer = None;
        self.callback = None;
        self.user = UserSide::default();
        self.io = IoSide::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_path_round_trip() {
        let mut path = InlinePath::empty();
        path.set("assets/sprites.png");
        assert_eq!(path.as_str(), "assets/sprites.png");
        path.clear();
        assert_eq!(path.as_str(), "");
    }

    #[test]
    fn test_user_data_is_aligned_and_bounded() {
        let mut data = UserData::default();
        assert_eq!(std::mem::align_of::<UserData>(), 8);
        data.set(&[1, 2, 3, 4]);
        assert_eq!(data.as_mut_slice(), &[1, 2, 3, 4]);
        data.as_mut_slice()[0] = 9;
        assert_eq!(data.as_mut_slice()[0], 9);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut item: Item<()> = Item::vacant();
        item.handle = Handle::new(1, 1);
        item.state = State::Fetching;
        item.lane = Some(0);
        item.buffer = Some(vec![0; 8]);
        item.io.content_size = 40;
        item.reset();
        assert_eq!(item.handle, Handle::INVALID);
        assert_eq!(item.state, State::Initial);
        assert!(item.lane.is_none());
        assert!(item.buffer.is_none());
        assert_eq!(item.io.content_size, 0);
    }
}
