// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Timing samples and the aggregate results derived from them.
//!
//! Aggregates are computed by the root right before they are printed and
//! are never kept afterwards.

use std::time::{Duration, Instant};

const MS_PER_SEC: f64 = 1_000.0;
/// Rates are reported in decimal megabytes per second.
const BYTES_PER_MB: f64 = 1_000_000.0;

/// A begin/end pair from the transport clock.
#[derive(Debug, Clone, Copy)]
pub struct TimingSample {
    begin: Instant,
    end: Instant,
}

impl TimingSample {
    pub fn new(begin: Instant, end: Instant) -> Self {
        Self { begin, end }
    }

    /// Elapsed time; zero if the clock reading went backwards.
    pub fn elapsed(&self) -> Duration {
        self.end.saturating_duration_since(self.begin)
    }
}

/// Convert a duration to fractional milliseconds.
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * MS_PER_SEC
}

/// Average round trip over a run of 1-byte probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripStats {
    /// Number of completed round trips.
    pub messages: u32,
    /// Time for all of them together.
    pub elapsed: Duration,
}

impl RoundTripStats {
    pub fn new(messages: u32, elapsed: Duration) -> Self {
        Self { messages, elapsed }
    }

    /// Average round trip in milliseconds: elapsed / messages.
    pub fn average_ms(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        as_millis_f64(self.elapsed) / f64::from(self.messages)
    }
}

/// Bulk delivery of one payload to one or more recipients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStats {
    /// Payload size in bytes.
    pub bytes: usize,
    /// Members that received their own copy of the payload.
    pub recipients: usize,
    pub elapsed: Duration,
}

impl TransferStats {
    pub fn new(bytes: usize, recipients: usize, elapsed: Duration) -> Self {
        Self {
            bytes,
            recipients,
            elapsed,
        }
    }

    /// A point-to-point transfer to a single peer.
    pub fn point_to_point(bytes: usize, elapsed: Duration) -> Self {
        Self::new(bytes, 1, elapsed)
    }

    /// A broadcast across a group of `members`. The root's own copy is not
    /// counted as delivered data.
    pub fn broadcast(bytes: usize, members: usize, elapsed: Duration) -> Self {
        Self::new(bytes, members.saturating_sub(1), elapsed)
    }

    pub fn elapsed_ms(&self) -> f64 {
        as_millis_f64(self.elapsed)
    }

    /// Delivered bytes per second. Zero when nothing was delivered or no
    /// time was measured.
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if self.recipients == 0 || secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 * self.recipients as f64 / secs
    }

    /// Delivered megabytes (10^6 bytes) per second.
    pub fn mb_per_sec(&self) -> f64 {
        self.bytes_per_sec() / BYTES_PER_MB
    }
}

/// Root-side outcome of the collective benchmark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectiveStats {
    /// 1-byte broadcast followed by a reduce.
    pub small: Duration,
    /// Bulk-payload broadcast followed by a reduce.
    pub large: TransferStats,
}
