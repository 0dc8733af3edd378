//! Property tests: randomized request mixes against the engine's universal
//! guarantees: exactly one finished callback per accepted send, monotonic
//! chunk offsets covering the whole content, lane bounds, and generation
//! invalidation.

use fetchlane::{Config, Handle, IoProvider, Loader, Request, Response};
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Deterministic in-memory provider: path "blob-N" serves N bytes of a
/// repeating pattern; "missing-…" paths fail to open.
struct PatternProvider;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

impl IoProvider for PatternProvider {
    type File = Vec<u8>;

    fn open(&self, path: &str) -> io::Result<(Vec<u8>, u64)> {
        let len: usize = path
            .strip_prefix("blob-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok((pattern(len), len as u64))
    }

    fn read(&self, file: &mut Vec<u8>, offset: u64, dst: &mut [u8]) -> io::Result<usize> {
        let offset = offset as usize;
        if offset + dst.len() > file.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        dst.copy_from_slice(&file[offset..offset + dst.len()]);
        Ok(dst.len())
    }
}

#[derive(Debug, Clone)]
struct Profile {
    size: usize,
    buffer: usize,
    missing: bool,
    cancel_after: Option<usize>,
    channel: usize,
}

fn profile_strategy(num_channels: usize) -> impl Strategy<Value = Profile> {
    (
        0usize..40,
        1usize..9,
        prop::bool::weighted(0.15),
        prop::option::weighted(0.25, 0usize..3),
        0..num_channels,
    )
        .prop_map(|(size, buffer, missing, cancel_after, channel)| Profile {
            size,
            buffer,
            missing,
            cancel_after,
            channel,
        })
}

#[derive(Debug, Default)]
struct Observed {
    chunks: Vec<(u64, usize)>,
    finished: u32,
    failed: bool,
    cancelled: bool,
    paused_or_opened: u32,
    max_lane: usize,
}

fn run_mix(profiles: Vec<Profile>, num_channels: usize, num_lanes: usize) {
    let config = Config::default()
        .with_channels(num_channels)
        .with_lanes(num_lanes)
        .with_max_requests(profiles.len().max(1));
    let mut loader = Loader::with_config(config, PatternProvider);

    let observations: Rc<RefCell<HashMap<usize, Observed>>> = Rc::default();
    let mut handles: Vec<Handle> = Vec::new();

    for (id, profile) in profiles.iter().enumerate() {
        let path = if profile.missing {
            format!("missing-{id}")
        } else {
            format!("blob-{}", profile.size)
        };
        let sink = Rc::clone(&observations);
        let cancel_after = profile.cancel_after;
        let handle = loader
            .send(
                Request::new(path, move |resp: &mut Response<'_>| {
                    let mut map = sink.borrow_mut();
                    let obs = map.entry(id).or_default();
                    obs.max_lane = obs.max_lane.max(resp.lane());
                    if resp.fetched() {
                        obs.chunks.push((resp.content_offset(), resp.fetched_size()));
                        if cancel_after == Some(obs.chunks.len()) {
                            resp.cancel();
                        }
                    } else if !resp.failed() {
                        obs.paused_or_opened += 1;
                    }
                    if resp.finished() {
                        obs.finished += 1;
                        obs.failed = resp.failed();
                        obs.cancelled = resp.cancelled();
                    }
                })
                .on_channel(profile.channel)
                .with_buffer(vec![0; profile.buffer]),
            )
            .expect("mix sized to fit the pool");
        handles.push(handle);
    }

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let done = observations.borrow().values().map(|o| o.finished).sum::<u32>()
            == profiles.len() as u32;
        if done {
            break;
        }
        assert!(Instant::now() < deadline, "requests did not all finish");
        loader.pump();
        std::thread::yield_now();
    }

    let observations = observations.borrow();
    for (id, profile) in profiles.iter().enumerate() {
        let obs = &observations[&id];
        // Exactly one finished callback per accepted send.
        assert_eq!(obs.finished, 1, "request {id}: {obs:?}");
        // Lanes stay within the configured range.
        assert!(obs.max_lane < num_lanes, "request {id}: {obs:?}");
        // Every handle is dead once its final callback ran.
        assert!(!loader.is_valid(handles[id]));

        if profile.missing {
            assert!(obs.failed && !obs.cancelled, "request {id}: {obs:?}");
            assert!(obs.chunks.is_empty());
        } else if profile.cancel_after.is_some() && obs.cancelled {
            assert!(obs.failed, "cancelled implies failed: {obs:?}");
        } else {
            assert!(!obs.failed, "request {id}: {obs:?}");
            // Chunk offsets are contiguous from zero and cover the content.
            let mut expected_offset = 0u64;
            for (offset, len) in &obs.chunks {
                assert_eq!(*offset, expected_offset, "request {id}: {obs:?}");
                expected_offset += *len as u64;
            }
            assert_eq!(expected_offset, profile.size as u64, "request {id}: {obs:?}");
        }
    }

    let stats = loader.stats();
    assert_eq!(stats.sent, profiles.len() as u64);
    assert_eq!(stats.completed, profiles.len() as u64);
    assert_eq!(stats.active, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Single channel, single lane: strictly serialized streaming.
    #[test]
    fn prop_single_lane_mix(profiles in prop::collection::vec(profile_strategy(1), 1..10)) {
        run_mix(profiles, 1, 1);
    }

    /// Multiple channels and lanes: bounded concurrency, same guarantees.
    #[test]
    fn prop_multi_lane_mix(profiles in prop::collection::vec(profile_strategy(2), 1..14)) {
        run_mix(profiles, 2, 3);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A finished request's handle never validates again, even after its
    /// slot is reused by later requests.
    #[test]
    fn prop_generation_invalidation(reuse_rounds in 1usize..6) {
        let mut loader = Loader::with_config(
            Config::default().with_max_requests(1),
            PatternProvider,
        );
        let mut dead: Vec<Handle> = Vec::new();
        for _ in 0..reuse_rounds {
            let done = Rc::new(RefCell::new(false));
            let sink = Rc::clone(&done);
            let handle = loader
                .send(
                    Request::new("blob-3", move |resp: &mut Response<'_>| {
                        if resp.finished() {
                            *sink.borrow_mut() = true;
                        }
                    })
                    .with_buffer(vec![0; 4]),
                )
                .expect("pool has a free slot between rounds");

            let deadline = Instant::now() + Duration::from_secs(10);
            while !*done.borrow() {
                assert!(Instant::now() < deadline);
                loader.pump();
                std::thread::yield_now();
            }
            for stale in &dead {
                prop_assert!(!loader.is_valid(*stale));
            }
            dead.push(handle);
        }
    }
}
