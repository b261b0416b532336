// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Group transport.
//!
//! A fixed group of members with stable ranks, exchanging messages through
//! blocking point-to-point operations. Collectives are built on top of
//! point-to-point as a flat fan-out/fan-in through the root.
//!
//! Every operation is a rendezvous: both sides must issue matching calls in
//! the same relative order. Each message carries a per-phase [`Tag`], so a
//! receiver that is out of step sees [`TransportError::TagMismatch`] instead
//! of silently consuming the wrong message. The tags do not relax the
//! ordering contract: a member that skips a call still leaves its
//! counterpart blocked forever.

mod local;
mod tcp;

use std::fmt;
use std::future::Future;
use std::time::Instant;

use crate::error::{TransportError, TransportResult};
use crate::types::Rank;

pub use local::{LocalGroup, LocalTransport};
pub use tcp::{TcpGroup, TcpRootListener, TcpTransport};

/// Protocol phase a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    /// Peer identification at the start of each per-peer sub-test.
    Handshake = 1,
    /// 1-byte latency probe and its echo.
    Probe = 2,
    /// Bandwidth payload.
    Bulk = 3,
    /// Acknowledgment of a bandwidth payload.
    Ack = 4,
    /// Fan-out leg of a broadcast.
    Broadcast = 5,
    /// Fan-in leg of a reduce.
    Reduce = 6,
}

impl Tag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> TransportResult<Self> {
        match value {
            1 => Ok(Tag::Handshake),
            2 => Ok(Tag::Probe),
            3 => Ok(Tag::Bulk),
            4 => Ok(Tag::Ack),
            5 => Ok(Tag::Broadcast),
            6 => Ok(Tag::Reduce),
            other => Err(TransportError::UnknownTag(other)),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::Handshake => "handshake",
            Tag::Probe => "probe",
            Tag::Bulk => "bulk",
            Tag::Ack => "ack",
            Tag::Broadcast => "broadcast",
            Tag::Reduce => "reduce",
        };
        f.write_str(name)
    }
}

/// Membership and messaging for one member of a fixed group.
///
/// Implementations must return `Send` futures so a member can run as a
/// spawned tokio task. Any error is fatal for the whole run.
pub trait GroupTransport: Send {
    /// This member's rank.
    fn rank(&self) -> Rank;

    /// Number of members, fixed for the lifetime of the group.
    fn size(&self) -> usize;

    /// Send all of `buf` to `dst`. Blocks until the transport has taken the
    /// message; never retried.
    fn send(
        &mut self,
        dst: Rank,
        buf: &[u8],
        tag: Tag,
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Receive the next message from `src` into `buf`, returning its length.
    ///
    /// Fails with [`TransportError::Truncated`] if the message is longer
    /// than `buf`, and with [`TransportError::TagMismatch`] if it belongs to
    /// a different phase than `tag`.
    fn recv(
        &mut self,
        src: Rank,
        buf: &mut [u8],
        tag: Tag,
    ) -> impl Future<Output = TransportResult<usize>> + Send;

    /// Tear the group down.
    fn finalize(self) -> impl Future<Output = TransportResult<()>> + Send
    where
        Self: Sized;

    /// Monotonic clock used for every timing sample.
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Copy `buf` from `root` into `buf` on every other member.
    ///
    /// Every member must call this with a buffer of the same length.
    fn broadcast(
        &mut self,
        root: Rank,
        buf: &mut [u8],
    ) -> impl Future<Output = TransportResult<()>> + Send {
        async move {
            self.check_member(root)?;

            if self.rank() == root {
                for dst in members(self.size()).filter(|r| *r != root) {
                    self.send(dst, buf, Tag::Broadcast).await?;
                }
            } else {
                let expected = buf.len();
                let len = self.recv(root, buf, Tag::Broadcast).await?;
                if len != expected {
                    return Err(TransportError::ShortMessage {
                        peer: root,
                        len,
                        expected,
                    });
                }
            }
            Ok(())
        }
    }

    /// Sum `value` over every member. The root gets `Some(sum)`, every
    /// other member gets `None`.
    fn reduce_sum(
        &mut self,
        root: Rank,
        value: i64,
    ) -> impl Future<Output = TransportResult<Option<i64>>> + Send {
        async move {
            self.check_member(root)?;

            if self.rank() != root {
                self.send(root, &value.to_le_bytes(), Tag::Reduce).await?;
                return Ok(None);
            }

            let mut sum = value;
            let mut contribution = [0u8; 8];
            for src in members(self.size()).filter(|r| *r != root) {
                let len = self.recv(src, &mut contribution, Tag::Reduce).await?;
                if len != contribution.len() {
                    return Err(TransportError::ShortMessage {
                        peer: src,
                        len,
                        expected: contribution.len(),
                    });
                }
                sum = sum.wrapping_add(i64::from_le_bytes(contribution));
            }
            Ok(Some(sum))
        }
    }

    /// Reject ranks outside the group.
    fn check_member(&self, rank: Rank) -> TransportResult<()> {
        if rank.index() < self.size() {
            Ok(())
        } else {
            Err(TransportError::InvalidRank {
                rank,
                size: self.size(),
            })
        }
    }
}

/// Every rank of a group of `size`, ascending.
fn members(size: usize) -> impl Iterator<Item = Rank> {
    (0..size as u32).map(Rank::new)
}
