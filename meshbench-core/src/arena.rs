// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pre-allocated message buffers.
//!
//! Each member allocates one arena before the collective benchmark and
//! reuses it for every round, trial and peer. Buffer contents carry no
//! meaning; only sizes and timing matter.

use crate::types::MessageSize;

/// Capacity of the host-name handshake buffer.
pub const HOST_NAME_LEN: usize = 128;

/// Buffers owned by one member for its whole run.
pub struct MessageArena {
    /// Bandwidth and large-broadcast payload.
    pub bulk: Vec<u8>,
    /// 1-byte latency probe, echo and acknowledgment.
    pub probe: [u8; 1],
    /// Handshake payload: the sender's host name.
    pub host: [u8; HOST_NAME_LEN],
}

impl MessageArena {
    pub fn new(message_size: MessageSize) -> Self {
        tracing::debug!(bytes = message_size.bytes(), "Allocating message arena");
        Self {
            bulk: vec![0u8; message_size.bytes()],
            probe: [0u8; 1],
            host: [0u8; HOST_NAME_LEN],
        }
    }

    /// Store `name` in the handshake buffer, truncated to its capacity,
    /// and return the number of bytes used.
    pub fn set_host(&mut self, name: &str) -> usize {
        let len = name.len().min(HOST_NAME_LEN);
        self.host[..len].copy_from_slice(&name.as_bytes()[..len]);
        len
    }

    /// Decode the first `len` bytes of the handshake buffer.
    pub fn host_str(&self, len: usize) -> String {
        String::from_utf8_lossy(&self.host[..len.min(HOST_NAME_LEN)]).into_owned()
    }
}

/// Name of the machine this member runs on.
pub fn local_host_name() -> String {
    match nix::unistd::gethostname() {
        Ok(name) if !name.is_empty() => name.to_string_lossy().into_owned(),
        Ok(_) => "unknown".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "gethostname failed");
            "unknown".to_string()
        }
    }
}
