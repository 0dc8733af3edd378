//! fetchlane - Handle-Based Asynchronous File/URL Fetching
//!
//! A small engine for streaming files or URLs into caller-owned buffers.
//! Requests move through a per-request state machine, shuttled between the
//! caller thread and per-channel I/O worker threads over lock-protected ring
//! buffers of slot ids. Progress is delivered through a response callback
//! invoked only on the caller thread, from [`Loader::pump`].
//!
//! # Key Properties
//!
//! - **Bounded concurrency**: each channel admits at most `num_lanes`
//!   requests at a time, so callers can pre-allocate one buffer per lane.
//! - **Generational handles**: stale handles fail lookups cleanly instead of
//!   touching a reused slot.
//! - **Caller-owned buffers**: the engine never allocates or resizes a
//!   transfer buffer; vectors move in through [`Request::with_buffer`] or
//!   [`Response::bind_buffer`] and come back out unchanged.
//! - **Setup-time allocation**: all pool and queue storage is sized once at
//!   construction.
//! - **Pause / resume / cancel** per request, applied on the next pump pass.
//!
//! The blocking backend seam is [`IoProvider`]; `fetchlane-fs` implements it
//! for the local filesystem. Single-threaded hosts use [`CoopLoader`] with a
//! [`CoopProvider`] instead of worker threads.
//!
//! # Example
//!
//! ```
//! use fetchlane::{IoProvider, Loader, Request};
//! use std::cell::RefCell;
//! use std::io;
//! use std::rc::Rc;
//!
//! /// Serves one in-memory blob for every path.
//! struct Blob(&'static [u8]);
//!
//! impl IoProvider for Blob {
//!     type File = ();
//!
//!     fn open(&self, _path: &str) -> io::Result<((), u64)> {
//!         Ok(((), self.0.len() as u64))
//!     }
//!
//!     fn read(&self, _file: &mut (), offset: u64, dst: &mut [u8]) -> io::Result<usize> {
//!         let offset = offset as usize;
//!         dst.copy_from_slice(&self.0[offset..offset + dst.len()]);
//!         Ok(dst.len())
//!     }
//! }
//!
//! let mut loader = Loader::new(Blob(b"hello world"));
//! let received = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&received);
//!
//! loader
//!     .send(
//!         Request::new("greeting.txt", move |resp| {
//!             if resp.fetched() {
//!                 sink.borrow_mut().extend_from_slice(resp.data());
//!             }
//!         })
//!         .with_buffer(vec![0; 4]),
//!     )
//!     .unwrap();
//!
//! // Pump until the streamed chunks add up to the whole blob.
//! while received.borrow().len() < 11 {
//!     loader.pump();
//!     std::thread::yield_now();
//! }
//! assert_eq!(received.borrow().as_slice(), b"hello world");
//! ```

mod channel;
mod config;
mod coop;
mod engine;
mod error;
mod handle;
mod invariants;
mod pool;
mod provider;
mod request;
mod response;
mod ring;
mod stats;
mod worker;

pub use config::{Config, MAX_CHANNELS, MAX_PATH, MAX_USERDATA_BYTES};
pub use coop::{CoopLoader, CoopProvider};
pub use engine::Loader;
pub use error::SendError;
pub use handle::Handle;
pub use provider::IoProvider;
pub use request::Request;
pub use response::{Response, ResponseCallback};
pub use stats::Stats;
