// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bulk buffers are allocated once per run, not once per trial.
//!
//! Lives in its own test binary because it installs a counting global
//! allocator.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use meshbench_core::{run_local_group, BenchmarkConfig, MessageSize, TrialCount};

const PAYLOAD: usize = 8 * 1024 * 1024;

static LARGE_ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Counts every allocation or reallocation of at least `PAYLOAD` bytes.
struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.size() >= PAYLOAD {
            LARGE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.size() >= PAYLOAD {
            LARGE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.alloc_zeroed(layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if new_size >= PAYLOAD {
            LARGE_ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        }
        System.realloc(ptr, layout, new_size)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

async fn large_allocations(trials: u32) -> usize {
    let config = BenchmarkConfig {
        message_size: MessageSize::new(PAYLOAD).unwrap(),
        small_message_count: 1,
    };

    let before = LARGE_ALLOCATIONS.load(Ordering::SeqCst);
    run_local_group(2, TrialCount::new(trials).unwrap(), config, "alloc", Vec::new())
        .await
        .unwrap();
    LARGE_ALLOCATIONS.load(Ordering::SeqCst) - before
}

// Only test in this binary, so nothing else allocates concurrently.
#[tokio::test]
async fn test_bulk_allocations_independent_of_trial_count() {
    let single = large_allocations(1).await;
    let many = large_allocations(5).await;

    // Two arenas plus one staging buffer for the root's link to its peer.
    assert_eq!(single, 3);
    assert_eq!(many, single);
}
