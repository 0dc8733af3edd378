//! Debug assertion macros for queue and pool invariants.
//!
//! Active only in debug builds; release builds pay nothing. The surrounding
//! admission and drain protocol is what actually guarantees these hold;
//! the macros catch protocol bugs early instead of corrupting a ring.

// =============================================================================
// Ring contract: enqueue requires vacancy, dequeue requires occupancy
// =============================================================================

/// Assert a ring has room before an enqueue.
///
/// Enqueue-on-full is a contract violation, not an error: admission gates on
/// lane and queue capacity before any id is moved.
macro_rules! debug_assert_ring_vacancy {
    ($ring:expr) => {
        debug_assert!(
            !$ring.is_full(),
            "enqueue on full ring (len {} of {})",
            $ring.len(),
            $ring.capacity()
        )
    };
}

/// Assert a ring is non-empty before a dequeue or peek.
macro_rules! debug_assert_ring_occupied {
    ($ring:expr) => {
        debug_assert!(!$ring.is_empty(), "dequeue on empty ring")
    };
}

// =============================================================================
// Pool contract: generation must match on free
// =============================================================================

/// Assert the generation of a freed handle matches the slot's live handle.
/// A mismatch means a double free or a stale handle reached `free`.
macro_rules! debug_assert_gen_match {
    ($expected:expr, $got:expr) => {
        debug_assert!(
            $expected == $got,
            "generation mismatch on free: slot holds {:?}, freeing {:?}",
            $expected,
            $got
        )
    };
}

// =============================================================================
// Lane contract: lanes stay in range and are assigned before dispatch
// =============================================================================

/// Assert a lane id is within the channel's configured lane count.
macro_rules! debug_assert_lane_bounds {
    ($lane:expr, $num_lanes:expr) => {
        debug_assert!(
            $lane < $num_lanes,
            "lane {} out of range ({} lanes)",
            $lane,
            $num_lanes
        )
    };
}

pub(crate) use debug_assert_gen_match;
pub(crate) use debug_assert_lane_bounds;
pub(crate) use debug_assert_ring_occupied;
pub(crate) use debug_assert_ring_vacancy;
