//! Channel queues and the per-request state machine.

use crate::handle::Handle;
use crate::invariants::debug_assert_lane_bounds;
use crate::pool::{Items, Pool};
use crate::request::State;
use crate::response::Response;
use crate::ring::Ring;
use crate::worker::Worker;

/// Per-pass completion counts, folded into the engine stats.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DispatchStats {
    pub(crate) completed: u64,
    pub(crate) failed: u64,
}

/// The caller-side queues of one channel.
///
/// Every live slot id on the channel resides in exactly one of these rings,
/// in the worker's mailbox, or with the worker between mailbox operations.
/// `sent` absorbs overflow beyond the lane count; everything past admission
/// is bounded by `num_lanes`.
pub(crate) struct ChannelQueues {
    pub(crate) num_lanes: usize,
    /// Newly sent items awaiting a free lane. Capacity `max_requests`.
    pub(crate) sent: Ring,
    /// Unoccupied lane ids, seeded `0..num_lanes`.
    pub(crate) free_lanes: Ring,
    /// Items the caller side is about to hand to the I/O side.
    pub(crate) user_incoming: Ring,
    /// Items handed back by the I/O side, awaiting callback dispatch.
    pub(crate) user_outgoing: Ring,
}

impl ChannelQueues {
    pub(crate) fn new(num_lanes: usize, max_requests: usize) -> Self {
        Self {
            num_lanes,
            sent: Ring::new(max_requests),
            free_lanes: Ring::with_sequence(num_lanes),
            user_incoming: Ring::new(num_lanes),
            user_outgoing: Ring::new(num_lanes),
        }
    }

    /// Enqueues a freshly allocated request, or reports the queue full.
    pub(crate) fn try_send(&mut self, handle: Handle) -> bool {
        if self.sent.is_full() {
            false
        } else {
            self.sent.enqueue(handle.to_bits());
            true
        }
    }

    /// Admission: promote sent items into `user_incoming` while lanes are
    /// free. Admitted items keep their `Allocated` state; the lane sticks to
    /// the item until the slot is freed.
    pub(crate) fn admit<F>(&mut self, items: &Items<F>) {
        let n = self.sent.len().min(self.free_lanes.len());
        for _ in 0..n {
            let bits = self.sent.dequeue();
            let lane = self.free_lanes.dequeue() as usize;
            debug_assert_lane_bounds!(lane, self.num_lanes);
            if let Some(item) = items.lookup_mut(Handle::from_bits(bits)) {
                item.lane = Some(lane);
                self.user_incoming.enqueue(bits);
            } else {
                // Ids in the sent queue always refer to live items.
                debug_assert!(false, "stale id in sent queue");
                self.free_lanes.enqueue(lane as u32);
            }
        }
    }

    /// Caller-side state transitions, applied in place over `user_incoming`
    /// before handoff. Flag order matters: pause, then resume, then cancel,
    /// then the state mapping.
    pub(crate) fn apply_transitions<F>(&mut self, items: &Items<F>) {
        for i in 0..self.user_incoming.len() {
            let handle = Handle::from_bits(self.user_incoming.peek(i));
            let Some(item) = items.lookup_mut(handle) else {
                debug_assert!(false, "stale id in user_incoming");
                continue;
            };
            if item.user.pause {
                item.state = State::Paused;
                item.user.pause = false;
            }
            if item.user.resume {
                if item.state == State::Paused {
                    // Back to Fetched so the mapping below re-issues a read.
                    item.state = State::Fetched;
                }
                item.user.resume = false;
            }
            if item.user.cancel {
                item.state = State::Failed;
                item.user.finished = true;
            }
            item.state = match item.state {
                State::Allocated => State::Opening,
                State::Opened | State::Fetched => State::Fetching,
                // Paused and Failed hold position and pass through the
                // I/O side untouched.
                other => other,
            };
        }
    }

    /// Caller-side drain: mirror the io side, derive the next state, invoke
    /// the callback, then either release the lane and slot (finished) or
    /// requeue for the next pass.
    pub(crate) fn dispatch<F>(&mut self, pool: &mut Pool<F>) -> DispatchStats {
        let mut stats = DispatchStats::default();
        while !self.user_outgoing.is_empty() {
            let bits = self.user_outgoing.dequeue();
            let handle = Handle::from_bits(bits);

            let mut finished = false;
            let mut failed = false;
            let mut lane = None;
            if let Some(item) = pool.items().lookup_mut(handle) {
                item.user.content_size = item.io.content_size;
                item.user.content_offset = item.io.content_offset;
                item.user.fetched_size = item.io.fetched_size;
                item.user.finished |= item.io.finished;

                item.state = if item.io.failed {
                    State::Failed
                } else {
                    match item.state {
                        // A positive offset straight out of Opening means the
                        // pre-bound buffer already holds the first chunk.
                        State::Opening if item.io.content_offset > 0 => State::Fetched,
                        State::Opening => State::Opened,
                        State::Fetching => State::Fetched,
                        other => other,
                    }
                };
                // A cancel that raced with an in-flight operation: the
                // result arrived but is discarded, the request ends failed.
                if item.user.cancel {
                    item.state = State::Failed;
                    item.user.finished = true;
                }

                finished = item.user.finished;
                failed = item.state == State::Failed;
                lane = item.lane;
                invoke_callback(item);
            } else {
                debug_assert!(false, "stale id in user_outgoing");
                continue;
            }

            if finished {
                if let Some(lane) = lane {
                    debug_assert_lane_bounds!(lane, self.num_lanes);
                    self.free_lanes.enqueue(lane as u32);
                }
                pool.free(handle);
                stats.completed += 1;
                if failed {
                    stats.failed += 1;
                }
            } else {
                self.user_incoming.enqueue(bits);
            }
        }
        stats
    }
}

/// Builds the response snapshot from disjoint item borrows and runs the
/// user callback.
fn invoke_callback<F>(item: &mut crate::request::Item<F>) {
    let crate::request::Item {
        handle,
        state,
        channel,
        lane,
        path,
        buffer,
        callback,
        user,
        ..
    } = item;
    let Some(callback) = callback.as_mut() else {
        debug_assert!(false, "live item without callback");
        return;
    };
    debug_assert!(
        user.content_offset >= user.fetched_size as u64,
        "chunk extends before the stream start"
    );
    let mut response = Response {
        handle: *handle,
        channel: *channel,
        lane: lane.unwrap_or(0),
        state: *state,
        finished: user.finished,
        cancelled: user.cancel,
        content_size: user.content_size,
        // Report the start of the chunk being delivered, not the stored
        // high-water offset.
        chunk_offset: user.content_offset - user.fetched_size as u64,
        fetched_size: user.fetched_size,
        path: path.as_str(),
        user,
        buffer,
    };
    callback(&mut response);
}

/// One channel of the threaded engine: the caller-side queues plus the
/// worker owning the thread-boundary mailbox.
pub(crate) struct Channel {
    pub(crate) queues: ChannelQueues,
    pub(crate) worker: Worker,
}

impl Channel {
    /// One full caller-side pass: admission, transitions, handoff to the
    /// worker, drain of the worker's results, callback dispatch.
    pub(crate) fn dowork<F>(&mut self, pool: &mut Pool<F>) -> DispatchStats {
        self.queues.admit(pool.items());
        self.queues.apply_transitions(pool.items());
        self.worker.push_incoming(&mut self.queues.user_incoming);
        self.worker.drain_outgoing(&mut self.queues.user_outgoing);
        self.queues.dispatch(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues(lanes: usize) -> ChannelQueues {
        ChannelQueues::new(lanes, 8)
    }

    #[test]
    fn test_admission_is_gated_on_lanes() {
        let mut q = queues(1);
        let mut pool: Pool<()> = Pool::new(8);
        let a = pool.alloc(|_| {}).unwrap();
        let b = pool.alloc(|_| {}).unwrap();
        assert!(q.try_send(a));
        assert!(q.try_send(b));
        q.admit(pool.items());
        assert_eq!(q.user_incoming.len(), 1);
        assert_eq!(q.sent.len(), 1);
        assert!(q.free_lanes.is_empty());
        let admitted = pool.items().lookup_mut(a).unwrap();
        assert_eq!(admitted.lane, Some(0));
        let waiting = pool.items().lookup_mut(b).unwrap();
        assert_eq!(waiting.lane, None);
    }

    #[test]
    fn test_transitions_map_allocated_to_opening() {
        let mut q = queues(2);
        let mut pool: Pool<()> = Pool::new(8);
        let h = pool.alloc(|_| {}).unwrap();
        q.try_send(h);
        q.admit(pool.items());
        q.apply_transitions(pool.items());
        assert_eq!(pool.items().lookup_mut(h).unwrap().state, State::Opening);
    }

    #[test]
    fn test_pause_then_resume_cancels_out() {
        let mut q = queues(1);
        let mut pool: Pool<()> = Pool::new(8);
        let h = pool
            .alloc(|item| item.state = State::Fetched)
            .unwrap();
        q.user_incoming.enqueue(h.to_bits());
        pool.items().with_user(h, |u| {
            u.pause = true;
            u.resume = true;
        });
        q.apply_transitions(pool.items());
        let item = pool.items().lookup_mut(h).unwrap();
        assert_eq!(item.state, State::Fetching);
        assert!(!item.user.pause);
        assert!(!item.user.resume);
    }

    #[test]
    fn test_cancel_forces_failed_finished() {
        let mut q = queues(1);
        let mut pool: Pool<()> = Pool::new(8);
        let h = pool
            .alloc(|item| item.state = State::Fetched)
            .unwrap();
        q.user_incoming.enqueue(h.to_bits());
        pool.items().with_user(h, |u| u.cancel = true);
        q.apply_transitions(pool.items());
        let item = pool.items().lookup_mut(h).unwrap();
        assert_eq!(item.state, State::Failed);
        assert!(item.user.finished);
        assert!(item.user.cancel, "cancel flag survives for the snapshot");
    }

    #[test]
    fn test_dispatch_frees_lane_and_slot_on_finish() {
        let mut q = queues(1);
        let mut pool: Pool<()> = Pool::new(8);
        let h = pool
            .alloc(|item| {
                item.state = State::Fetching;
                item.lane = Some(0);
                item.callback = Some(Box::new(|_| {}));
                item.io.content_size = 4;
                item.io.content_offset = 4;
                item.io.fetched_size = 4;
                item.io.finished = true;
            })
            .unwrap();
        let _ = q.free_lanes.dequeue(); // lane 0 is occupied by the item
        q.user_outgoing.enqueue(h.to_bits());

        let stats = q.dispatch(&mut pool);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(q.free_lanes.len(), 1);
        assert!(!pool.is_valid(h));
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn test_dispatch_requeues_unfinished_items() {
        let mut q = queues(1);
        let mut pool: Pool<()> = Pool::new(8);
        let h = pool
            .alloc(|item| {
                item.state = State::Fetching;
                item.lane = Some(0);
                item.callback = Some(Box::new(|_| {}));
                item.io.content_size = 10;
                item.io.content_offset = 4;
                item.io.fetched_size = 4;
            })
            .unwrap();
        let _ = q.free_lanes.dequeue();
        q.user_outgoing.enqueue(h.to_bits());

        let stats = q.dispatch(&mut pool);
        assert_eq!(stats.completed, 0);
        assert_eq!(q.user_incoming.len(), 1);
        let item = pool.items().lookup_mut(h).unwrap();
        assert_eq!(item.state, State::Fetched);
        assert_eq!(item.user.content_offset, 4);
    }
}
