//! Per-channel worker thread and its lock-protected mailbox.

use crate::handle::Handle;
use crate::pool::{IoView, Items};
use crate::provider::IoProvider;
use crate::request::State;
use crate::ring::Ring;
use crossbeam_utils::CachePadded;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// Inbox ring plus the stop flag, under one lock.
///
/// Keeping the stop flag under the inbox lock (rather than giving it its own)
/// means a stop requested between the empty-check and the wait cannot be
/// missed: the requester holds the same lock the waiter re-checks under.
struct Inbox {
    ring: Ring,
    stop: bool,
}

/// The thread-boundary queues of one worker. The caller side pushes into the
/// inbox and drains the outbox; the worker does the reverse. Each ring is
/// only ever touched under its lock.
pub(crate) struct Mailbox {
    inbox: CachePadded<Mutex<Inbox>>,
    inbox_signal: Condvar,
    outbox: CachePadded<Mutex<Ring>>,
}

impl Mailbox {
    fn new(num_lanes: usize) -> Self {
        Self {
            inbox: CachePadded::new(Mutex::new(Inbox {
                ring: Ring::new(num_lanes),
                stop: false,
            })),
            inbox_signal: Condvar::new(),
            outbox: CachePadded::new(Mutex::new(Ring::new(num_lanes))),
        }
    }

    /// Worker side: block until an id arrives or stop is requested. Returns
    /// `None` on stop.
    fn wait_incoming(&self) -> Option<u32> {
        let mut inbox = self.inbox.lock().expect("worker inbox lock poisoned");
        loop {
            if inbox.stop {
                return None;
            }
            if !inbox.ring.is_empty() {
                return Some(inbox.ring.dequeue());
            }
            inbox = self
                .inbox_signal
                .wait(inbox)
                .expect("worker inbox lock poisoned");
        }
    }

    /// Worker side: hand a processed id back.
    fn push_outgoing(&self, bits: u32) {
        let mut outbox = self.outbox.lock().expect("worker outbox lock poisoned");
        outbox.enqueue(bits);
    }
}

/// A worker thread bound to a single channel. Dropping the worker requests a
/// stop and joins the thread.
pub(crate) struct Worker {
    mailbox: Arc<Mailbox>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns the worker for channel `index`.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the thread; setup is the only
    /// allocation phase, nothing is retried later.
    pub(crate) fn spawn<P: IoProvider>(
        index: usize,
        num_lanes: usize,
        items: Arc<Items<P::File>>,
        provider: Arc<P>,
    ) -> Self {
        let mailbox = Arc::new(Mailbox::new(num_lanes));
        let thread_mailbox = Arc::clone(&mailbox);
        let thread = std::thread::Builder::new()
            .name(format!("fetchlane-ch{index}"))
            .spawn(move || run(&thread_mailbox, &items, provider.as_ref()))
            .expect("failed to spawn channel worker thread");
        Self {
            mailbox,
            thread: Some(thread),
        }
    }

    /// Caller side: drain `src` into the inbox and wake the worker.
    pub(crate) fn push_incoming(&self, src: &mut Ring) {
        let mut inbox = self
            .mailbox
            .inbox
            .lock()
            .expect("worker inbox lock poisoned");
        let mut moved = false;
        while !src.is_empty() && !inbox.ring.is_full() {
            inbox.ring.enqueue(src.dequeue());
            moved = true;
        }
        if moved {
            self.mailbox.inbox_signal.notify_one();
        }
    }

    /// Caller side: drain the outbox into `dst`.
    pub(crate) fn drain_outgoing(&self, dst: &mut Ring) {
        let mut outbox = self
            .mailbox
            .outbox
            .lock()
            .expect("worker outbox lock poisoned");
        while !outbox.is_empty() && !dst.is_full() {
            dst.enqueue(outbox.dequeue());
        }
    }

    fn request_stop(&self) {
        let mut inbox = self
            .mailbox
            .inbox
            .lock()
            .expect("worker inbox lock poisoned");
        inbox.stop = true;
        self.mailbox.inbox_signal.notify_all();
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.request_stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// The worker loop: blocking dequeue, handle, hand back. Ids whose lookup
/// fails (stale) or whose io side already failed pass through unchanged.
fn run<P: IoProvider>(mailbox: &Mailbox, items: &Items<P::File>, provider: &P) {
    while let Some(bits) = mailbox.wait_incoming() {
        handle_request(items, provider, Handle::from_bits(bits));
        mailbox.push_outgoing(bits);
    }
}

/// One worker pass over one request.
fn handle_request<P: IoProvider>(items: &Items<P::File>, provider: &P, handle: Handle) {
    let Some(view) = items.io_view(handle) else {
        return;
    };
    let IoView {
        state,
        path,
        buffer,
        io,
    } = view;
    if io.failed {
        return;
    }

    let mut fetch = false;
    match state {
        State::Opening => match provider.open(path) {
            Ok((file, content_size)) => {
                io.file = Some(file);
                io.content_size = content_size;
                // Latency shortcut: with a pre-bound buffer the first chunk
                // is read in the same worker pass as the open.
                if buffer.is_some() {
                    fetch = true;
                }
            }
            Err(_) => {
                io.failed = true;
                io.finished = true;
            }
        },
        State::Fetching => fetch = true,
        // Paused and Failed pass straight through.
        _ => {}
    }

    if fetch {
        match (buffer, io.file.as_mut()) {
            (Some(buf), Some(file)) => {
                let remaining = io.content_size.saturating_sub(io.content_offset);
                let len = (buf.len() as u64).min(remaining) as usize;
                match provider.read(file, io.content_offset, &mut buf[..len]) {
                    Ok(n) if n == len => {
                        io.fetched_size = len;
                        io.content_offset += len as u64;
                    }
                    _ => io.failed = true,
                }
            }
            // Fetching without a bound buffer is a request failure.
            _ => io.failed = true,
        }
        if io.failed || io.content_offset >= io.content_size {
            io.file = None; // close
            io.finished = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use std::io;

    /// Serves `path.len()` bytes of 0xAB for any path not named "missing".
    struct Fake;

    impl IoProvider for Fake {
        type File = u64;

        fn open(&self, path: &str) -> io::Result<(u64, u64)> {
            if path == "missing" {
                Err(io::Error::from(io::ErrorKind::NotFound))
            } else {
                Ok((0, path.len() as u64))
            }
        }

        fn read(&self, _file: &mut u64, _offset: u64, dst: &mut [u8]) -> io::Result<usize> {
            dst.fill(0xAB);
            Ok(dst.len())
        }
    }

    fn item_for(pool: &mut Pool<u64>, path: &str, buffer: Option<Vec<u8>>) -> Handle {
        pool.alloc(|item| {
            item.path.set(path);
            item.buffer = buffer;
            item.state = State::Opening;
        })
        .unwrap()
    }

    #[test]
    fn test_open_without_buffer_reports_size_only() {
        let mut pool = Pool::new(2);
        let h = item_for(&mut pool, "abcd", None);
        handle_request(pool.items(), &Fake, h);
        let item = pool.items().lookup_mut(h).unwrap();
        assert_eq!(item.io.content_size, 4);
        assert_eq!(item.io.content_offset, 0);
        assert!(!item.io.finished);
        assert!(item.io.file.is_some());
    }

    #[test]
    fn test_open_with_buffer_falls_through_to_first_chunk() {
        let mut pool = Pool::new(2);
        let h = item_for(&mut pool, "abcd", Some(vec![0; 4]));
        handle_request(pool.items(), &Fake, h);
        let item = pool.items().lookup_mut(h).unwrap();
        assert_eq!(item.io.fetched_size, 4);
        assert_eq!(item.io.content_offset, 4);
        assert!(item.io.finished);
        assert!(item.io.file.is_none(), "finished request closes its file");
        assert_eq!(item.buffer.as_deref(), Some(&[0xAB; 4][..]));
    }

    #[test]
    fn test_open_failure_sets_failed_and_finished() {
        let mut pool = Pool::new(2);
        let h = item_for(&mut pool, "missing", None);
        handle_request(pool.items(), &Fake, h);
        let item = pool.items().lookup_mut(h).unwrap();
        assert!(item.io.failed);
        assert!(item.io.finished);
    }

    #[test]
    fn test_fetching_without_buffer_fails() {
        let mut pool = Pool::new(2);
        let h = pool
            .alloc(|item| {
                item.path.set("abcd");
                item.state = State::Fetching;
            })
            .unwrap();
        handle_request(pool.items(), &Fake, h);
        let item = pool.items().lookup_mut(h).unwrap();
        assert!(item.io.failed);
        assert!(item.io.finished);
    }

    #[test]
    fn test_stale_handle_passes_through() {
        let mut pool: Pool<u64> = Pool::new(2);
        let h = pool.alloc(|_| {}).unwrap();
        pool.free(h);
        // No panic, no effect.
        handle_request(pool.items(), &Fake, h);
    }
}
