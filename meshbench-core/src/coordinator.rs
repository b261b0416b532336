// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Trial coordinator, run by the root.
//!
//! Each trial visits every peer in ascending rank order, one at a time, so
//! each pairwise measurement runs without competing peer traffic. Trials run
//! strictly one after another.

use std::io::Write;

use crate::arena::MessageArena;
use crate::config::BenchmarkConfig;
use crate::error::BenchResult;
use crate::metrics::{RoundTripStats, TimingSample, TransferStats};
use crate::report::Reporter;
use crate::transport::{GroupTransport, Tag};
use crate::types::{Rank, TrialCount};

/// Root role: drives every measurement and prints every result.
#[derive(Debug, Clone)]
pub struct TrialCoordinator {
    trials: TrialCount,
    config: BenchmarkConfig,
    host: String,
}

impl TrialCoordinator {
    pub fn new(trials: TrialCount, config: BenchmarkConfig, host: impl Into<String>) -> Self {
        Self {
            trials,
            config,
            host: host.into(),
        }
    }

    /// Run every trial against every peer.
    pub async fn run<T, W>(
        &self,
        transport: &mut T,
        arena: &mut MessageArena,
        reporter: &mut Reporter<W>,
    ) -> BenchResult<()>
    where
        T: GroupTransport,
        W: Write,
    {
        reporter.banner(&self.host, self.trials, transport.size())?;

        for trial in self.trials.iter() {
            reporter.trial_header(trial)?;
            tracing::info!(trial = trial, of = self.trials.value(), "Trial started");

            for peer in Rank::peers(transport.size()) {
                self.measure_peer(transport, arena, reporter, peer).await?;
            }
        }

        Ok(())
    }

    /// Handshake, latency and bandwidth sub-tests against one peer.
    async fn measure_peer<T, W>(
        &self,
        transport: &mut T,
        arena: &mut MessageArena,
        reporter: &mut Reporter<W>,
        peer: Rank,
    ) -> BenchResult<()>
    where
        T: GroupTransport,
        W: Write,
    {
        // Waiting for the peer's handshake keeps connection setup out of
        // the latency sample.
        let len = transport.recv(peer, &mut arena.host, Tag::Handshake).await?;
        let peer_host = arena.host_str(len);
        reporter.peer_identity(peer, &peer_host)?;

        let count = self.config.small_message_count;
        let begin = transport.now();
        for _ in 0..count {
            transport.send(peer, &arena.probe, Tag::Probe).await?;
            transport.recv(peer, &mut arena.probe, Tag::Probe).await?;
        }
        let end = transport.now();
        let latency = RoundTripStats::new(count, TimingSample::new(begin, end).elapsed());
        reporter.round_trip(&latency)?;

        let begin = transport.now();
        transport.send(peer, &arena.bulk, Tag::Bulk).await?;
        transport.recv(peer, &mut arena.probe, Tag::Ack).await?;
        let end = transport.now();
        let bandwidth =
            TransferStats::point_to_point(arena.bulk.len(), TimingSample::new(begin, end).elapsed());
        reporter.transfer(&bandwidth)?;

        tracing::debug!(
            peer = %peer,
            host = %peer_host,
            round_trip_ms = latency.average_ms(),
            rate_mb_s = bandwidth.mb_per_sec(),
            "Peer measured"
        );

        Ok(())
    }
}
