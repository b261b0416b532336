// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Peer responder, run by every non-root member.
//!
//! Purely reactive: mirrors the coordinator's per-peer sequence with the
//! matching receive or send. No timing, no output.

use crate::arena::MessageArena;
use crate::config::BenchmarkConfig;
use crate::error::BenchResult;
use crate::transport::{GroupTransport, Tag};
use crate::types::{Rank, TrialCount};

#[derive(Debug, Clone)]
pub struct PeerResponder {
    trials: TrialCount,
    config: BenchmarkConfig,
    host: String,
}

impl PeerResponder {
    pub fn new(trials: TrialCount, config: BenchmarkConfig, host: impl Into<String>) -> Self {
        Self {
            trials,
            config,
            host: host.into(),
        }
    }

    pub async fn run<T: GroupTransport>(
        &self,
        transport: &mut T,
        arena: &mut MessageArena,
    ) -> BenchResult<()> {
        let host_len = arena.set_host(&self.host);

        for trial in self.trials.iter() {
            transport
                .send(Rank::ROOT, &arena.host[..host_len], Tag::Handshake)
                .await?;

            for _ in 0..self.config.small_message_count {
                let len = transport
                    .recv(Rank::ROOT, &mut arena.probe, Tag::Probe)
                    .await?;
                transport
                    .send(Rank::ROOT, &arena.probe[..len], Tag::Probe)
                    .await?;
            }

            transport
                .recv(Rank::ROOT, &mut arena.bulk, Tag::Bulk)
                .await?;
            transport
                .send(Rank::ROOT, &arena.probe, Tag::Ack)
                .await?;

            tracing::debug!(rank = %transport.rank(), trial = trial, "Trial answered");
        }

        Ok(())
    }
}
