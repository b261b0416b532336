// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-process group transport.
//!
//! Every member is a tokio task in the same process. Each ordered pair of
//! members has its own channel, and every message carries a completion
//! signal fired by the receiver, so `send` does not return until the
//! matching `recv` has copied the payload out.
//!
//! Payloads travel in one staging buffer per destination. The receiver
//! hands the buffer back with the completion signal, so after the first
//! message of a given size no send allocates.

use tokio::sync::{mpsc, oneshot};

use crate::error::{TransportError, TransportResult};
use crate::transport::{GroupTransport, Tag};
use crate::types::Rank;

/// One message in flight between two members.
struct Envelope {
    tag: Tag,
    payload: Vec<u8>,
    /// Returns the staging buffer once the receiver has copied it out.
    delivered: oneshot::Sender<Vec<u8>>,
}

/// Factory for in-process groups.
pub struct LocalGroup;

impl LocalGroup {
    /// Form a group of `size` members. Element `i` of the result is rank `i`.
    pub fn bootstrap(size: usize) -> TransportResult<Vec<LocalTransport>> {
        if size == 0 {
            return Err(TransportError::Bootstrap {
                reason: "group must have at least one member".to_string(),
            });
        }

        let mut outboxes: Vec<Vec<Option<mpsc::UnboundedSender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<mpsc::UnboundedReceiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in 0..size {
                if src == dst {
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                outboxes[src][dst] = Some(tx);
                inboxes[dst][src] = Some(rx);
            }
        }

        tracing::debug!(size = size, "Local group formed");

        Ok(outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| LocalTransport {
                rank: Rank::new(rank as u32),
                size,
                outbox,
                inbox,
                staging: (0..size).map(|_| Vec::new()).collect(),
            })
            .collect())
    }
}

/// One member of an in-process group.
pub struct LocalTransport {
    rank: Rank,
    size: usize,
    /// Indexed by destination rank; `None` at our own rank.
    outbox: Vec<Option<mpsc::UnboundedSender<Envelope>>>,
    /// Indexed by source rank; `None` at our own rank.
    inbox: Vec<Option<mpsc::UnboundedReceiver<Envelope>>>,
    /// Reusable outgoing payload buffers, indexed by destination rank.
    staging: Vec<Vec<u8>>,
}

impl LocalTransport {
    fn outbound(&self, dst: Rank) -> TransportResult<&mpsc::UnboundedSender<Envelope>> {
        self.check_member(dst)?;
        self.outbox[dst.index()]
            .as_ref()
            .ok_or(TransportError::Unreachable {
                from: self.rank,
                to: dst,
            })
    }

    fn inbound(&mut self, src: Rank) -> TransportResult<&mut mpsc::UnboundedReceiver<Envelope>> {
        self.check_member(src)?;
        let rank = self.rank;
        self.inbox[src.index()]
            .as_mut()
            .ok_or(TransportError::Unreachable {
                from: src,
                to: rank,
            })
    }
}

impl GroupTransport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dst: Rank, buf: &[u8], tag: Tag) -> TransportResult<()> {
        // Reject bad destinations before touching the staging slot.
        self.outbound(dst)?;

        let mut payload = std::mem::take(&mut self.staging[dst.index()]);
        payload.clear();
        payload.extend_from_slice(buf);

        let (delivered, completion) = oneshot::channel();
        self.outbound(dst)?
            .send(Envelope {
                tag,
                payload,
                delivered,
            })
            .map_err(|_| TransportError::Disconnected { peer: dst })?;

        // A receiver that rejects the message drops the buffer with it.
        self.staging[dst.index()] = completion
            .await
            .map_err(|_| TransportError::Disconnected { peer: dst })?;
        Ok(())
    }

    async fn recv(&mut self, src: Rank, buf: &mut [u8], tag: Tag) -> TransportResult<usize> {
        let envelope = self
            .inbound(src)?
            .recv()
            .await
            .ok_or(TransportError::Disconnected { peer: src })?;

        if envelope.tag != tag {
            return Err(TransportError::TagMismatch {
                peer: src,
                expected: tag,
                actual: envelope.tag,
            });
        }

        let len = envelope.payload.len();
        if len > buf.len() {
            return Err(TransportError::Truncated {
                peer: src,
                len,
                capacity: buf.len(),
            });
        }

        buf[..len].copy_from_slice(&envelope.payload);
        // The sender only disappears if its task already failed.
        let _ = envelope.delivered.send(envelope.payload);
        Ok(len)
    }

    async fn finalize(self) -> TransportResult<()> {
        tracing::debug!(rank = %self.rank, "Local transport finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_bootstrap_ranks() {
        let group = LocalGroup::bootstrap(3).unwrap();
        assert_eq!(group.len(), 3);
        for (i, member) in group.iter().enumerate() {
            assert_eq!(member.rank().index(), i);
            assert_eq!(member.size(), 3);
        }
    }

    #[test]
    fn test_bootstrap_empty_group() {
        assert!(LocalGroup::bootstrap(0).is_err());
    }

    #[tokio::test]
    async fn test_send_recv() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        let sender = tokio::spawn(async move {
            a.send(Rank::new(1), b"hello", Tag::Handshake).await.unwrap();
            a
        });

        let mut buf = [0u8; 16];
        let len = b.recv(Rank::ROOT, &mut buf, Tag::Handshake).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_waits_for_receiver() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        let sender = tokio::spawn(async move { a.send(Rank::new(1), &[7], Tag::Probe).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished(), "send must block until received");

        let mut buf = [0u8; 1];
        b.recv(Rank::ROOT, &mut buf, Tag::Probe).await.unwrap();
        sender.await.unwrap().unwrap();
        assert_eq!(buf[0], 7);
    }

    #[tokio::test]
    async fn test_staging_buffer_reused() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        let receiver = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            for _ in 0..3 {
                b.recv(Rank::ROOT, &mut buf, Tag::Bulk).await.unwrap();
            }
            buf
        });

        a.send(Rank::new(1), &[7u8; 4096], Tag::Bulk).await.unwrap();
        assert!(a.staging[1].capacity() >= 4096);
        let staged = a.staging[1].as_ptr();

        a.send(Rank::new(1), &[8u8; 4096], Tag::Bulk).await.unwrap();
        a.send(Rank::new(1), &[9u8; 16], Tag::Bulk).await.unwrap();
        assert_eq!(a.staging[1].as_ptr(), staged);

        let buf = receiver.await.unwrap();
        assert_eq!(&buf[..16], &[9u8; 16]);
        assert_eq!(buf[16], 8);
    }

    #[tokio::test]
    async fn test_tag_mismatch_detected() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        let sender = tokio::spawn(async move { a.send(Rank::new(1), &[1], Tag::Probe).await });

        let mut buf = [0u8; 1];
        let err = b.recv(Rank::ROOT, &mut buf, Tag::Ack).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::TagMismatch {
                expected: Tag::Ack,
                actual: Tag::Probe,
                ..
            }
        ));
        // The dropped envelope releases the sender with an error.
        assert!(sender.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_truncation_detected() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let mut b = group.pop().unwrap();
        let mut a = group.pop().unwrap();

        tokio::spawn(async move { a.send(Rank::new(1), &[0u8; 32], Tag::Bulk).await });

        let mut buf = [0u8; 8];
        let err = b.recv(Rank::ROOT, &mut buf, Tag::Bulk).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Truncated {
                len: 32,
                capacity: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_peer_disconnects() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let b = group.pop().unwrap();
        let mut a = group.pop().unwrap();
        drop(b);

        let err = a.send(Rank::new(1), &[1], Tag::Probe).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { .. }));

        let mut buf = [0u8; 1];
        let err = a.recv(Rank::new(1), &mut buf, Tag::Probe).await.unwrap_err();
        assert!(matches!(err, TransportError::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_self_send_unreachable() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let err = group[0].send(Rank::ROOT, &[1], Tag::Probe).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_rank() {
        let mut group = LocalGroup::bootstrap(2).unwrap();
        let err = group[0].send(Rank::new(5), &[1], Tag::Probe).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRank { .. }));
    }

    #[tokio::test]
    async fn test_broadcast_and_reduce() {
        let group = LocalGroup::bootstrap(4).unwrap();
        let mut handles = Vec::new();

        for mut member in group {
            handles.push(tokio::spawn(async move {
                let mut buf = if member.rank().is_root() {
                    vec![3u8; 64]
                } else {
                    vec![0u8; 64]
                };
                member.broadcast(Rank::ROOT, &mut buf).await.unwrap();
                assert!(buf.iter().all(|&b| b == 3));

                member.reduce_sum(Rank::ROOT, buf[0] as i64).await.unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results[0], Some(12));
        assert!(results[1..].iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_single_member_collectives() {
        let mut group = LocalGroup::bootstrap(1).unwrap();
        let mut root = group.pop().unwrap();
        let mut buf = [9u8; 4];
        root.broadcast(Rank::ROOT, &mut buf).await.unwrap();
        assert_eq!(root.reduce_sum(Rank::ROOT, 9).await.unwrap(), Some(9));
        root.finalize().await.unwrap();
    }
}
