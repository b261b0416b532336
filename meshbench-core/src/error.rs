// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for meshbench.
//!
//! Explicit enum error types, one per concern. No `Box<dyn Error>`, no
//! `anyhow::Result` - every failure the benchmark can hit has a variant.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::Tag;
use crate::types::Rank;

/// Exit status for a successful run (sysexits `EX_OK`).
pub const EX_OK: i32 = 0;
/// Exit status for bad or missing command-line arguments (sysexits `EX_USAGE`).
pub const EX_USAGE: i32 = 64;
/// Exit status for a transport failure (sysexits `EX_UNAVAILABLE`).
pub const EX_UNAVAILABLE: i32 = 69;
/// Exit status for a member that died without reporting an error (sysexits `EX_SOFTWARE`).
pub const EX_SOFTWARE: i32 = 70;
/// Exit status for a bad configuration file (sysexits `EX_CONFIG`).
pub const EX_CONFIG: i32 = 78;

/// Top-level error type for a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    // =========================================================================
    // Local Configuration Errors - Detected Before Any Communication
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Transport Errors - Fatal for the Whole Group
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Member {rank} terminated abnormally: {reason}")]
    MemberFailed { rank: Rank, reason: String },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl BenchError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BenchError::Validation(ValidationError::InvalidTrialCount { .. }) => EX_USAGE,
            BenchError::Validation(_)
            | BenchError::ConfigNotFound { .. }
            | BenchError::ConfigParse { .. } => EX_CONFIG,
            BenchError::Transport(_) | BenchError::Io { .. } => EX_UNAVAILABLE,
            BenchError::MemberFailed { .. } => EX_SOFTWARE,
        }
    }

    /// Whether this error was raised before the group communicated.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            BenchError::Validation(_)
                | BenchError::ConfigNotFound { .. }
                | BenchError::ConfigParse { .. }
        )
    }
}

/// Invalid local input. Raised before group formation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid trial count '{value}': {reason}")]
    InvalidTrialCount { value: String, reason: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Rank {rank} is out of range for a group of {size}")]
    RankOutOfRange { rank: u32, size: usize },
}

/// Failures of the group transport. Every one of these aborts the run.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Rank {rank} is not a member of a group of {size}")]
    InvalidRank { rank: Rank, size: usize },

    #[error("Connection to rank {peer} closed")]
    Disconnected { peer: Rank },

    #[error("Message from rank {peer} truncated: {len} bytes into a {capacity} byte buffer")]
    Truncated {
        peer: Rank,
        len: usize,
        capacity: usize,
    },

    #[error("Short message from rank {peer}: {len} bytes, expected {expected}")]
    ShortMessage {
        peer: Rank,
        len: usize,
        expected: usize,
    },

    #[error("Out-of-order message from rank {peer}: expected {expected}, got {actual}")]
    TagMismatch {
        peer: Rank,
        expected: Tag,
        actual: Tag,
    },

    #[error("Unknown message tag {0:#04x}")]
    UnknownTag(u8),

    #[error("No link from rank {from} to rank {to}")]
    Unreachable { from: Rank, to: Rank },

    #[error("Group formation failed: {reason}")]
    Bootstrap { reason: String },

    #[error("Socket error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
