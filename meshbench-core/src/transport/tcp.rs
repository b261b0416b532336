// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! TCP group transport.
//!
//! Star topology: every peer holds one stream to the root and nothing else.
//! Messages are framed as `[tag: u8][len: u64 LE][payload]`.
//!
//! Group formation: the root listens on `root_addr` and accepts exactly
//! `size - 1` peers. Each peer connects (retrying until the connect timeout)
//! and sends a hello carrying its rank and the group size; the root checks
//! both and answers with a single accept byte. Connections with a bad,
//! late or duplicate hello are closed and do not count toward the group.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};

use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::transport::{GroupTransport, Tag};
use crate::types::Rank;

/// Tag byte plus 64-bit little-endian length.
const FRAME_HEADER_LEN: usize = 9;
/// Frames up to this size are written with a single syscall.
const COALESCE_LIMIT: usize = 256;
/// Magic prefix of the peer hello.
const HELLO_MAGIC: [u8; 4] = *b"MSHB";
/// Magic + rank (u32 LE) + size (u32 LE).
const HELLO_LEN: usize = 12;
/// Sent by the root once a hello is accepted.
const HELLO_ACCEPT: u8 = 0xA5;
/// Delay between connection attempts while the root is not yet listening.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);
/// How long the root waits for a new connection to send its hello.
const HELLO_TIMEOUT: Duration = Duration::from_secs(2);

fn io_error(context: &'static str) -> impl FnOnce(std::io::Error) -> TransportError {
    move |source| TransportError::Io { context, source }
}

fn read_error(peer: Rank, context: &'static str) -> impl FnOnce(std::io::Error) -> TransportError {
    move |source| {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Disconnected { peer }
        } else {
            TransportError::Io { context, source }
        }
    }
}

/// Factory for TCP groups.
pub struct TcpGroup;

impl TcpGroup {
    /// Form the group described by `config`, as root or as peer.
    pub async fn connect(config: &TransportConfig) -> TransportResult<TcpTransport> {
        if config.rank.is_root() {
            TcpRootListener::bind(config).await?.accept_peers().await
        } else {
            Self::join(config).await
        }
    }

    /// Join as a non-root member.
    pub async fn join(config: &TransportConfig) -> TransportResult<TcpTransport> {
        if config.rank.is_root() {
            return Err(TransportError::Bootstrap {
                reason: "the root listens, it does not join".to_string(),
            });
        }

        let deadline = Instant::now() + config.connect_timeout;
        let mut stream = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = timeout(remaining, TcpStream::connect(config.root_addr.as_str())).await;
            match attempt {
                Ok(Ok(stream)) => break stream,
                Ok(Err(e)) if Instant::now() + CONNECT_RETRY_INTERVAL < deadline => {
                    tracing::debug!(
                        root_addr = %config.root_addr,
                        error = %e,
                        "Root not reachable yet, retrying"
                    );
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
                Ok(Err(e)) => {
                    return Err(TransportError::Bootstrap {
                        reason: format!("could not reach root at {}: {}", config.root_addr, e),
                    });
                }
                Err(_) => {
                    return Err(TransportError::Bootstrap {
                        reason: format!("timed out connecting to root at {}", config.root_addr),
                    });
                }
            }
        };
        stream
            .set_nodelay(true)
            .map_err(io_error("setting TCP_NODELAY"))?;

        let mut hello = [0u8; HELLO_LEN];
        hello[..4].copy_from_slice(&HELLO_MAGIC);
        hello[4..8].copy_from_slice(&config.rank.value().to_le_bytes());
        hello[8..12].copy_from_slice(&(config.size as u32).to_le_bytes());
        stream
            .write_all(&hello)
            .await
            .map_err(io_error("sending hello"))?;

        let mut accept = [0u8; 1];
        let remaining = deadline.saturating_duration_since(Instant::now());
        let answered = timeout(remaining, stream.read_exact(&mut accept)).await;
        match answered {
            Ok(Ok(_)) if accept[0] == HELLO_ACCEPT => {}
            Ok(Ok(_)) => {
                return Err(TransportError::Bootstrap {
                    reason: format!("root sent unexpected accept byte {:#04x}", accept[0]),
                });
            }
            Ok(Err(e)) => {
                return Err(TransportError::Bootstrap {
                    reason: format!("root rejected rank {}: {}", config.rank, e),
                });
            }
            Err(_) => {
                return Err(TransportError::Bootstrap {
                    reason: "timed out waiting for the root to accept".to_string(),
                });
            }
        }

        tracing::info!(
            rank = %config.rank,
            size = config.size,
            root_addr = %config.root_addr,
            "Joined group"
        );

        let mut links: Vec<Option<TcpStream>> = (0..config.size).map(|_| None).collect();
        links[Rank::ROOT.index()] = Some(stream);

        Ok(TcpTransport {
            rank: config.rank,
            size: config.size,
            links,
        })
    }
}

/// The root's bound listener, before peers have joined.
pub struct TcpRootListener {
    listener: Option<TcpListener>,
    size: usize,
    connect_timeout: Duration,
}

impl TcpRootListener {
    /// Bind the root's listen address. A single-member group binds nothing.
    pub async fn bind(config: &TransportConfig) -> TransportResult<Self> {
        if !config.rank.is_root() {
            return Err(TransportError::Bootstrap {
                reason: format!("rank {} cannot listen for the group", config.rank),
            });
        }

        let listener = if config.size > 1 {
            let listener = TcpListener::bind(config.root_addr.as_str())
                .await
                .map_err(io_error("binding root address"))?;
            Some(listener)
        } else {
            None
        };

        Ok(Self {
            listener,
            size: config.size,
            connect_timeout: config.connect_timeout,
        })
    }

    /// Address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept every peer, then hand back the root's transport.
    pub async fn accept_peers(self) -> TransportResult<TcpTransport> {
        let mut links: Vec<Option<TcpStream>> = (0..self.size).map(|_| None).collect();

        if let Some(listener) = &self.listener {
            let expected = self.size - 1;
            let outcome = timeout(
                self.connect_timeout,
                accept_all(listener, self.size, expected, &mut links),
            )
            .await;

            match outcome {
                Ok(accepted) => accepted?,
                Err(_) => {
                    let joined = links.iter().filter(|l| l.is_some()).count();
                    return Err(TransportError::Bootstrap {
                        reason: format!(
                            "only {} of {} peers joined before the timeout",
                            joined, expected
                        ),
                    });
                }
            }
        }

        tracing::info!(size = self.size, "All peers joined");

        Ok(TcpTransport {
            rank: Rank::ROOT,
            size: self.size,
            links,
        })
    }
}

async fn accept_all(
    listener: &TcpListener,
    size: usize,
    expected: usize,
    links: &mut [Option<TcpStream>],
) -> TransportResult<()> {
    let mut joined = 0;
    while joined < expected {
        let (stream, addr) = listener
            .accept()
            .await
            .map_err(io_error("accepting peer"))?;

        // A bad connection is dropped; the group keeps waiting for real peers.
        match admit(stream, size, links).await {
            Ok(rank) => {
                tracing::debug!(rank = %rank, peer_addr = %addr, "Peer joined");
                joined += 1;
            }
            Err(e) => {
                tracing::warn!(peer_addr = %addr, error = %e, "Rejected connection");
            }
        }
    }
    Ok(())
}

/// Read and check one hello, then store the stream under the peer's rank.
async fn admit(
    mut stream: TcpStream,
    size: usize,
    links: &mut [Option<TcpStream>],
) -> TransportResult<Rank> {
    stream
        .set_nodelay(true)
        .map_err(io_error("setting TCP_NODELAY"))?;

    let mut hello = [0u8; HELLO_LEN];
    let read = timeout(HELLO_TIMEOUT, stream.read_exact(&mut hello)).await;
    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(io_error("reading hello")(e)),
        Err(_) => {
            return Err(TransportError::Bootstrap {
                reason: "no hello received".to_string(),
            });
        }
    }

    let rank = check_hello(&hello, size)?;
    if links[rank.index()].is_some() {
        return Err(TransportError::Bootstrap {
            reason: format!("rank {} joined twice", rank),
        });
    }

    stream
        .write_all(&[HELLO_ACCEPT])
        .await
        .map_err(io_error("accepting hello"))?;

    links[rank.index()] = Some(stream);
    Ok(rank)
}

/// Validate a peer hello against a group of `size`, returning the peer's rank.
fn check_hello(hello: &[u8; HELLO_LEN], size: usize) -> TransportResult<Rank> {
    if hello[..4] != HELLO_MAGIC {
        return Err(TransportError::Bootstrap {
            reason: "peer sent a malformed hello".to_string(),
        });
    }

    let rank = u32::from_le_bytes([hello[4], hello[5], hello[6], hello[7]]);
    let peer_size = u32::from_le_bytes([hello[8], hello[9], hello[10], hello[11]]) as usize;

    if peer_size != size {
        return Err(TransportError::Bootstrap {
            reason: format!(
                "rank {} believes the group has {} members, root has {}",
                rank, peer_size, size
            ),
        });
    }
    if rank == 0 || rank as usize >= size {
        return Err(TransportError::Bootstrap {
            reason: format!("peer announced invalid rank {} for a group of {}", rank, size),
        });
    }

    Ok(Rank::new(rank))
}

fn encode_header(tag: Tag, len: usize) -> [u8; FRAME_HEADER_LEN] {
    let mut header = [0u8; FRAME_HEADER_LEN];
    header[0] = tag.as_u8();
    header[1..].copy_from_slice(&(len as u64).to_le_bytes());
    header
}

fn decode_header(header: &[u8; FRAME_HEADER_LEN]) -> TransportResult<(Tag, u64)> {
    let tag = Tag::from_u8(header[0])?;
    let mut len = [0u8; 8];
    len.copy_from_slice(&header[1..]);
    Ok((tag, u64::from_le_bytes(len)))
}

/// One member of a TCP group.
pub struct TcpTransport {
    rank: Rank,
    size: usize,
    /// Indexed by rank. The root holds every peer; a peer holds only the root.
    links: Vec<Option<TcpStream>>,
}

impl TcpTransport {
    fn link(&mut self, other: Rank) -> TransportResult<&mut TcpStream> {
        self.check_member(other)?;
        let rank = self.rank;
        self.links[other.index()]
            .as_mut()
            .ok_or(TransportError::Unreachable {
                from: rank,
                to: other,
            })
    }
}

impl GroupTransport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&mut self, dst: Rank, buf: &[u8], tag: Tag) -> TransportResult<()> {
        let stream = self.link(dst)?;
        let header = encode_header(tag, buf.len());

        if buf.len() <= COALESCE_LIMIT {
            let mut frame = [0u8; FRAME_HEADER_LEN + COALESCE_LIMIT];
            frame[..FRAME_HEADER_LEN].copy_from_slice(&header);
            frame[FRAME_HEADER_LEN..FRAME_HEADER_LEN + buf.len()].copy_from_slice(buf);
            stream
                .write_all(&frame[..FRAME_HEADER_LEN + buf.len()])
                .await
                .map_err(io_error("writing frame"))?;
        } else {
            stream
                .write_all(&header)
                .await
                .map_err(io_error("writing frame header"))?;
            stream
                .write_all(buf)
                .await
                .map_err(io_error("writing frame payload"))?;
        }
        Ok(())
    }

    async fn recv(&mut self, src: Rank, buf: &mut [u8], tag: Tag) -> TransportResult<usize> {
        let stream = self.link(src)?;

        let mut header = [0u8; FRAME_HEADER_LEN];
        stream
            .read_exact(&mut header)
            .await
            .map_err(read_error(src, "reading frame header"))?;

        let (actual, len) = decode_header(&header)?;
        if actual != tag {
            return Err(TransportError::TagMismatch {
                peer: src,
                expected: tag,
                actual,
            });
        }

        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= buf.len())
            .ok_or(TransportError::Truncated {
                peer: src,
                len: len as usize,
                capacity: buf.len(),
            })?;

        stream
            .read_exact(&mut buf[..len])
            .await
            .map_err(read_error(src, "reading frame payload"))?;
        Ok(len)
    }

    async fn finalize(mut self) -> TransportResult<()> {
        for stream in self.links.iter_mut().flatten() {
            match stream.shutdown().await {
                Ok(()) => {}
                // The other side finished first and already closed.
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                Err(e) => return Err(io_error("shutting down link")(e)),
            }
        }
        tracing::debug!(rank = %self.rank, "TCP transport finalized");
        Ok(())
    }
}
