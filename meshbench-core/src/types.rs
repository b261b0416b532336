// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Largest bulk payload accepted: 1 GiB.
const MAX_MESSAGE_SIZE: usize = 1024 * 1024 * 1024;

/// Zero-based identifier of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rank(u32);

impl Rank {
    /// The coordinating member.
    pub const ROOT: Rank = Rank(0);

    pub const fn new(rank: u32) -> Self {
        Self(rank)
    }

    /// Validate `rank` against a group of `size` members.
    pub fn checked(rank: u32, size: usize) -> Result<Self, ValidationError> {
        if (rank as usize) < size {
            Ok(Self(rank))
        } else {
            Err(ValidationError::RankOutOfRange { rank, size })
        }
    }

    pub fn is_root(&self) -> bool {
        self.0 == 0
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// All non-root ranks of a group of `size`, in ascending order.
    pub fn peers(size: usize) -> impl Iterator<Item = Rank> {
        (1..size as u32).map(Rank)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of full benchmark passes. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialCount(u32);

impl TrialCount {
    pub fn new(trials: u32) -> Result<Self, ValidationError> {
        if trials == 0 {
            return Err(ValidationError::InvalidTrialCount {
                value: trials.to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(Self(trials))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Trial numbers, starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        1..=self.0
    }
}

impl FromStr for TrialCount {
    type Err = ValidationError;

    /// Strict decimal parse: digits only, no sign, no whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidTrialCount {
                value: s.to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }

        let trials = s
            .parse::<u32>()
            .map_err(|e| ValidationError::InvalidTrialCount {
                value: s.to_string(),
                reason: e.to_string(),
            })?;

        Self::new(trials)
    }
}

impl fmt::Display for TrialCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Size in bytes of the bulk bandwidth payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSize(usize);

impl MessageSize {
    /// 100 MiB: large enough that a transfer takes a significant fraction
    /// of a second and drowns out latency and clock error.
    pub const DEFAULT: MessageSize = MessageSize(100 * 1024 * 1024);

    pub fn new(bytes: usize) -> Result<Self, ValidationError> {
        if bytes == 0 || bytes > MAX_MESSAGE_SIZE {
            return Err(ValidationError::InvalidFieldValue {
                field: "message_size",
                value: bytes.to_string(),
                reason: format!("Must be between 1 and {} bytes", MAX_MESSAGE_SIZE),
            });
        }
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for MessageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}
