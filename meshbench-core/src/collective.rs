// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Collective benchmark: broadcast followed by reduce.
//!
//! A broadcast alone returns on the root as soon as its sends are handed
//! off, so the root cannot tell when the last member finished receiving.
//! Following it with a reduce to the root forces every member to complete
//! the broadcast before the root's timer stops.
//!
//! Every member must run this exactly once, before per-peer testing. A
//! member that skips it leaves the rest of the group blocked.

use std::io::Write;
use std::time::Duration;

use crate::arena::MessageArena;
use crate::error::BenchResult;
use crate::metrics::{CollectiveStats, TimingSample, TransferStats};
use crate::report::Reporter;
use crate::transport::GroupTransport;
use crate::types::Rank;

/// Run both rounds. The root reports and gets `Some(stats)`; every other
/// member discards its timings and gets `None`.
pub async fn run<T, W>(
    transport: &mut T,
    arena: &mut MessageArena,
    reporter: &mut Reporter<W>,
) -> BenchResult<Option<CollectiveStats>>
where
    T: GroupTransport,
    W: Write,
{
    let is_root = transport.rank().is_root();

    let small = broadcast_reduce(transport, &mut arena.probe).await?;
    if is_root {
        reporter.collective_small(small)?;
    }

    let large = broadcast_reduce(transport, &mut arena.bulk).await?;
    if !is_root {
        return Ok(None);
    }

    let large = TransferStats::broadcast(arena.bulk.len(), transport.size(), large);
    reporter.collective_large(&large)?;

    tracing::info!(
        small_ms = crate::metrics::as_millis_f64(small),
        large_ms = large.elapsed_ms(),
        rate_mb_s = large.mb_per_sec(),
        "Collective benchmark complete"
    );

    Ok(Some(CollectiveStats { small, large }))
}

/// One timed round: broadcast `payload` from the root, then sum its first
/// byte back to the root.
async fn broadcast_reduce<T: GroupTransport>(
    transport: &mut T,
    payload: &mut [u8],
) -> BenchResult<Duration> {
    let begin = transport.now();

    transport.broadcast(Rank::ROOT, payload).await?;
    let contribution = payload.first().copied().map(i64::from).unwrap_or(0);
    let sum = transport.reduce_sum(Rank::ROOT, contribution).await?;

    let end = transport.now();

    tracing::debug!(
        rank = %transport.rank(),
        bytes = payload.len(),
        sum = ?sum,
        "Broadcast+reduce round done"
    );

    Ok(TimingSample::new(begin, end).elapsed())
}
