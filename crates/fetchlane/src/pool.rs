//! Request pool: generational slot allocation and the shared item array.

use crate::handle::Handle;
use crate::invariants::debug_assert_gen_match;
use crate::request::{IoSide, Item, State, UserSide};
use std::cell::UnsafeCell;
use std::sync::Arc;

// =============================================================================
// OWNERSHIP PROTOCOL
// =============================================================================
//
// The item array is shared between the caller thread and the channel workers,
// but no item field is ever touched by two threads at once. Exclusive access
// migrates with the item's slot id through the queues:
//
// - While an id sits in `sent`, `user_incoming`, or `user_outgoing`, the item
//   is caller-owned: the caller side may take a whole-item `&mut` through
//   `lookup_mut`.
// - While an id sits in a worker's inbox/outbox, or the worker holds it
//   between inbox-dequeue and outbox-enqueue, the item is worker-owned: the
//   worker accesses it only through `io_view`, a field projection covering
//   the io sub-record plus the read-only request fields (state, path, buffer
//   contents). The worker never forms a whole-item reference.
// - The caller-side sub-record (`user`) is owner-thread-exclusive at all
//   times: pause/resume/cancel flags may be set between pumps even while the
//   worker owns the item, which is why `with_user` projects only that field
//   and why `io_view` never touches it. The projections are disjoint, so the
//   concurrent accesses never alias.
// - Pool metadata (free stack, generation counters) is caller-thread-only.
//   A slot cannot be freed or reallocated while its id is worker-visible
//   (single-queue-residency invariant), so a worker's generation check races
//   with nothing.
// - The array is created and finally dropped on the caller thread: shutdown
//   joins every worker before the engine releases its `Arc`, so callbacks
//   (which are not required to be `Send`) are only ever built, invoked, and
//   dropped there.
//
// =============================================================================

/// The shared backing array of request items.
///
/// Element 0 is reserved so the zero handle never resolves; usable slots are
/// `1..=max_requests`.
pub(crate) struct Items<F> {
    slots: Box<[UnsafeCell<Item<F>>]>,
}

// SAFETY: all shared access follows the ownership protocol above; see the
// module header. `F: Send` because open provider files migrate between the
// worker that opened them and the caller thread that drops them on reset.
unsafe impl<F: Send> Send for Items<F> {}
unsafe impl<F: Send> Sync for Items<F> {}

/// Worker-side projection of one item: the io sub-record plus the read-only
/// request fields the worker needs. Never overlaps the caller-side
/// sub-record.
pub(crate) struct IoView<'a, F> {
    pub(crate) state: State,
    pub(crate) path: &'a str,
    pub(crate) buffer: Option<&'a mut [u8]>,
    pub(crate) io: &'a mut IoSide<F>,
}

impl<F> Items<F> {
    fn new(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || UnsafeCell::new(Item::vacant()));
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Whole-item access for the caller side. Returns the item only while
    /// the stored handle matches, so stale handles resolve to nothing.
    ///
    /// Must only be called for items the caller side currently owns (or for
    /// free slots during `alloc`/`free`, which nothing else can see).
    #[allow(clippy::mut_from_ref)]
    pub(crate) fn lookup_mut(&self, handle: Handle) -> Option<&mut Item<F>> {
        let idx = handle.index();
        if !handle.is_some() || idx == 0 || idx >= self.slots.len() {
            return None;
        }
        // SAFETY: caller-owned per the ownership protocol; the only
        // concurrent access is a worker touching a *different* item or the
        // disjoint `user`/`io` projections of items this side does not own.
        let item = unsafe { &mut *self.slots[idx].get() };
        if item.handle == handle {
            Some(item)
        } else {
            None
        }
    }

    /// Worker-side projection. Returns nothing for stale ids.
    pub(crate) fn io_view(&self, handle: Handle) -> Option<IoView<'_, F>> {
        let idx = handle.index();
        if idx == 0 || idx >= self.slots.len() {
            return None;
        }
        let item = self.slots[idx].get();
        // SAFETY: worker-owned per the ownership protocol. Only disjoint
        // fields are projected; the caller-side sub-record is untouched, so
        // a concurrent flag write on the owner thread cannot alias these
        // references. The handle read races with nothing: the slot cannot be
        // freed while its id is worker-visible.
        unsafe {
            if (*item).handle != handle {
                return None;
            }
            Some(IoView {
                state: (*item).state,
                path: (*item).path.as_str(),
                buffer: (*item).buffer.as_mut().map(Vec::as_mut_slice),
                io: &mut (*item).io,
            })
        }
    }

    /// Owner-thread access to the caller-side sub-record only. Valid at any
    /// time, including while the worker owns the rest of the item.
    pub(crate) fn with_user<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut UserSide) -> R,
    ) -> Option<R> {
        let idx = handle.index();
        if !handle.is_some() || idx == 0 || idx >= self.slots.len() {
            return None;
        }
        let item = self.slots[idx].get();
        // SAFETY: the `user` sub-record is owner-thread-exclusive; workers
        // never project it. Disjoint from any live worker-side projection.
        unsafe {
            if (*item).handle != handle {
                return None;
            }
            Some(f(&mut (*item).user))
        }
    }

    /// Generation check without touching the item body.
    pub(crate) fn is_live(&self, handle: Handle) -> bool {
        let idx = handle.index();
        if !handle.is_some() || idx == 0 || idx >= self.slots.len() {
            return false;
        }
        // SAFETY: read of the handle field only; see `io_view` for why the
        // read cannot race with a free.
        unsafe { (*self.slots[idx].get()).handle == handle }
    }

    #[allow(clippy::mut_from_ref)]
    fn slot_mut(&self, idx: usize) -> &mut Item<F> {
        // SAFETY: only called from `Pool::alloc` on a slot popped off the
        // free stack; a free slot is invisible to every queue and worker.
        unsafe { &mut *self.slots[idx].get() }
    }
}

/// Fixed-size request pool with a free-index stack and per-slot generation
/// counters. All metadata is caller-thread-only.
pub(crate) struct Pool<F> {
    items: Arc<Items<F>>,
    free: Vec<u16>,
    generations: Box<[u16]>,
}

impl<F> Pool<F> {
    pub(crate) fn new(max_requests: usize) -> Self {
        debug_assert!(max_requests < u16::MAX as usize);
        let items = Arc::new(Items::new(max_requests + 1));
        // Reverse so the lowest indices are handed out first.
        let free: Vec<u16> = (1..=max_requests as u16).rev().collect();
        let generations = vec![0u16; max_requests + 1].into_boxed_slice();
        Self {
            items,
            free,
            generations,
        }
    }

    pub(crate) fn items(&self) -> &Items<F> {
        &self.items
    }

    /// Clones the shared item array for a worker thread.
    pub(crate) fn share(&self) -> Arc<Items<F>> {
        Arc::clone(&self.items)
    }

    /// Allocates a slot, bumps its generation, and lets `fill` write the
    /// request fields. Returns `None` when the pool is exhausted.
    pub(crate) fn alloc(&mut self, fill: impl FnOnce(&mut Item<F>)) -> Option<Handle> {
        let idx = self.free.pop()?;
        let generation = self.generations[idx as usize].wrapping_add(1);
        self.generations[idx as usize] = generation;
        let handle = Handle::new(idx, generation);
        let item = self.items.slot_mut(idx as usize);
        debug_assert_eq!(item.handle, Handle::INVALID, "allocating a live slot");
        item.handle = handle;
        item.state = State::Allocated;
        fill(item);
        Some(handle)
    }

    /// Resets the slot (dropping callback, buffer, and any open file) and
    /// returns its index to the free stack. Freeing a stale handle is a
    /// contract violation.
    pub(crate) fn free(&mut self, handle: Handle) {
        let Some(item) = self.items.lookup_mut(handle) else {
            debug_assert!(false, "freeing stale handle {handle:?}");
            return;
        };
        debug_assert_gen_match!(item.handle.generation(), handle.generation());
        item.reset();
        self.free.push(handle.index() as u16);
    }

    pub(crate) fn is_valid(&self, handle: Handle) -> bool {
        self.items.is_live(handle)
    }

    /// Number of live requests.
    pub(crate) fn live(&self) -> usize {
        self.generations.len() - 1 - self.free.len()
    }
}
