//! Streams a file from the command line through the engine, printing each
//! chunk as it lands.
//!
//! ```text
//! cargo run --bin fetchlane-demo -- path/to/file
//! ```

use fetchlane::{Loader, Request, Response};
use fetchlane_fs::FsProvider;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const CHUNK_LEN: usize = 64 * 1024;

fn main() {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: fetchlane-demo <file>");
        std::process::exit(2);
    };

    let mut loader = Loader::new(FsProvider::new());
    let done = Rc::new(Cell::new(false));
    let flag = Rc::clone(&done);

    let result = loader.send(
        Request::new(path, move |resp: &mut Response<'_>| {
            if resp.fetched() {
                println!(
                    "chunk @ {:>10}  {:>6} bytes  ({} / {} total)",
                    resp.content_offset(),
                    resp.fetched_size(),
                    resp.content_offset() + resp.fetched_size() as u64,
                    resp.content_size(),
                );
            }
            if resp.failed() {
                eprintln!("failed to fetch {}", resp.path());
            }
            if resp.finished() {
                flag.set(true);
            }
        })
        .with_buffer(vec![0; CHUNK_LEN]),
    );

    if let Err(err) = result {
        eprintln!("send failed: {err}");
        std::process::exit(1);
    }

    while !done.get() {
        loader.pump();
        std::thread::sleep(Duration::from_millis(1));
    }
}
