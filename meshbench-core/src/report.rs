// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Human-readable report lines.
//!
//! Only the root reports. Every line is flushed as soon as it is written so
//! progress is visible while the next measurement runs.

use std::io::Write;
use std::time::Duration;

use crate::error::{BenchError, BenchResult};
use crate::metrics::{as_millis_f64, RoundTripStats, TransferStats};
use crate::types::{Rank, TrialCount};

const MIB: f64 = 1024.0 * 1024.0;

/// Writes report lines to any `Write` sink.
pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, args: std::fmt::Arguments<'_>) -> BenchResult<()> {
        self.out
            .write_fmt(args)
            .and_then(|_| self.out.flush())
            .map_err(|e| BenchError::Io {
                context: "writing report",
                source: e,
            })
    }

    pub fn collective_small(&mut self, elapsed: Duration) -> BenchResult<()> {
        self.emit(format_args!(
            "\n1 byte broadcast+reduce time = {:.2}ms\n",
            as_millis_f64(elapsed)
        ))
    }

    pub fn collective_large(&mut self, stats: &TransferStats) -> BenchResult<()> {
        self.emit(format_args!(
            "\n{:.2}MB broadcast+reduce time = {:.2}ms  Rate = {:.2} mbytes/s\n",
            stats.bytes as f64 / MIB,
            stats.elapsed_ms(),
            stats.mb_per_sec()
        ))
    }

    pub fn banner(&mut self, host: &str, trials: TrialCount, members: usize) -> BenchResult<()> {
        self.emit(format_args!(
            "Root host:  {}\nTrials:     {}\nProc count: {}\n",
            host, trials, members
        ))
    }

    pub fn trial_header(&mut self, trial: u32) -> BenchResult<()> {
        self.emit(format_args!("\n==========\nTrial {}\n==========\n\n", trial))
    }

    pub fn peer_identity(&mut self, peer: Rank, host: &str) -> BenchResult<()> {
        self.emit(format_args!("Process {}  Host {}\n", peer, host))
    }

    pub fn round_trip(&mut self, stats: &RoundTripStats) -> BenchResult<()> {
        self.emit(format_args!(
            "Average 1-byte round-trip time over {} messages = {:.2}ms\n",
            stats.messages,
            stats.average_ms()
        ))
    }

    pub fn transfer(&mut self, stats: &TransferStats) -> BenchResult<()> {
        self.emit(format_args!(
            "{:.2}MB time = {:.2}ms  Rate = {:.2} mbytes/s\n",
            stats.bytes as f64 / MIB,
            stats.elapsed_ms(),
            stats.mb_per_sec()
        ))
    }
}
