// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Role selection and the per-member run sequence.

use std::io::Write;

use crate::arena::MessageArena;
use crate::collective;
use crate::config::BenchmarkConfig;
use crate::coordinator::TrialCoordinator;
use crate::error::{BenchError, BenchResult, TransportError};
use crate::report::Reporter;
use crate::responder::PeerResponder;
use crate::transport::{GroupTransport, LocalGroup};
use crate::types::{Rank, TrialCount};

/// What a member does after the collective benchmark. Chosen once, from
/// the member's rank.
#[derive(Debug, Clone)]
pub enum Role {
    Coordinator(TrialCoordinator),
    Responder(PeerResponder),
}

impl Role {
    pub fn for_rank(
        rank: Rank,
        trials: TrialCount,
        config: BenchmarkConfig,
        host: impl Into<String>,
    ) -> Self {
        if rank.is_root() {
            Role::Coordinator(TrialCoordinator::new(trials, config, host))
        } else {
            Role::Responder(PeerResponder::new(trials, config, host))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Coordinator(_) => "coordinator",
            Role::Responder(_) => "responder",
        }
    }

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
        match self {
            Role::Coordinator(coordinator) => coordinator.run(transport, arena, reporter).await,
            Role::Responder(responder) => responder.run(transport, arena).await,
        }
    }
}

/// Everything one member does in a run: allocate its buffers, take part in
/// the collective benchmark, play its role, tear the group down.
///
/// Report lines go to `out`, which only the root writes to. Returns `out`.
pub async fn run_member<T, W>(
    mut transport: T,
    trials: TrialCount,
    config: BenchmarkConfig,
    host: impl Into<String>,
    out: W,
) -> BenchResult<W>
where
    T: GroupTransport,
    W: Write,
{
    let rank = transport.rank();
    let role = Role::for_rank(rank, trials, config, host);
    tracing::info!(
        rank = %rank,
        size = transport.size(),
        role = role.name(),
        "Member starting"
    );

    let mut arena = MessageArena::new(config.message_size);
    let mut reporter = Reporter::new(out);

    collective::run(&mut transport, &mut arena, &mut reporter).await?;
    role.run(&mut transport, &mut arena, &mut reporter).await?;
    transport.finalize().await?;

    tracing::info!(rank = %rank, "Member finished");
    Ok(reporter.into_inner())
}

/// Run a whole group of `size` members as tasks of this process.
///
/// The root runs on the calling task and reports to `out`; every peer runs
/// on its own spawned task. When several members fail, the error that
/// caused the others is returned rather than the disconnects it triggered.
pub async fn run_local_group<W>(
    size: usize,
    trials: TrialCount,
    config: BenchmarkConfig,
    host: &str,
    out: W,
) -> BenchResult<W>
where
    W: Write + Send + 'static,
{
    let mut members = LocalGroup::bootstrap(size)?.into_iter();
    let root = members.next().ok_or_else(|| TransportError::Bootstrap {
        reason: "local group has no root".to_string(),
    })?;

    let peers: Vec<_> = members
        .map(|member| {
            let rank = member.rank();
            let host = host.to_string();
            let handle = tokio::spawn(async move {
                run_member(member, trials, config, host, std::io::sink())
                    .await
                    .map(|_| ())
            });
            (rank, handle)
        })
        .collect();

    let root_result = run_member(root, trials, config, host, out).await;

    let mut failures = Vec::new();
    for (rank, handle) in peers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(rank = %rank, error = %e, "Member failed");
                failures.push(e);
            }
            Err(e) => failures.push(BenchError::MemberFailed {
                rank,
                reason: e.to_string(),
            }),
        }
    }

    match root_result {
        Ok(out) if failures.is_empty() => Ok(out),
        Ok(_) => Err(primary_failure(failures)),
        Err(e) => {
            failures.insert(0, e);
            Err(primary_failure(failures))
        }
    }
}

/// Pick the failure that is not merely a side effect of another member
/// going away.
fn primary_failure(mut failures: Vec<BenchError>) -> BenchError {
    let is_disconnect = |e: &BenchError| {
        matches!(
            e,
            BenchError::Transport(TransportError::Disconnected { .. })
        )
    };
    let index = failures
        .iter()
        .position(|e| !is_disconnect(e))
        .unwrap_or(0);
    failures.swap_remove(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageSize;

    fn small_config() -> BenchmarkConfig {
        BenchmarkConfig {
            message_size: MessageSize::new(1024).unwrap(),
            small_message_count: 4,
        }
    }

    #[test]
    fn test_role_for_rank() {
        let trials = TrialCount::new(1).unwrap();
        let root = Role::for_rank(Rank::ROOT, trials, small_config(), "h");
        let peer = Role::for_rank(Rank::new(3), trials, small_config(), "h");
        assert!(matches!(root, Role::Coordinator(_)));
        assert!(matches!(peer, Role::Responder(_)));
        assert_eq!(root.name(), "coordinator");
        assert_eq!(peer.name(), "responder");
    }

    #[test]
    fn test_primary_failure_skips_disconnects() {
        let failures = vec![
            BenchError::Transport(TransportError::Disconnected { peer: Rank::new(1) }),
            BenchError::Transport(TransportError::Truncated {
                peer: Rank::ROOT,
                len: 10,
                capacity: 1,
            }),
        ];
        assert!(matches!(
            primary_failure(failures),
            BenchError::Transport(TransportError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_member_group() {
        let out = run_local_group(1, TrialCount::new(2).unwrap(), small_config(), "solo", Vec::new())
            .await
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Proc count: 1"));
        assert!(text.contains("Rate = 0.00 mbytes/s"));
        assert_eq!(text.matches("Trial ").count(), 2);
        assert!(!text.contains("Process "));
    }
}
