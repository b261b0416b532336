// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! meshbench core library
//!
//! Interconnect benchmarking for a fixed group of cooperating processes:
//! 1-byte round-trip latency and bulk bandwidth between the root and each
//! peer, plus group-wide broadcast+reduce timing.
//!
//! Every member runs the collective benchmark, then plays one role: the
//! root coordinates trials and reports, every other member responds.

pub mod arena;
pub mod collective;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod report;
pub mod responder;
pub mod role;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use arena::{local_host_name, MessageArena};
pub use config::{BenchmarkConfig, Config, ConfigLoader, TransportConfig};
pub use error::{BenchError, BenchResult, TransportError, TransportResult, ValidationError};
pub use report::Reporter;
pub use role::{run_local_group, run_member, Role};
pub use transport::{GroupTransport, LocalGroup, LocalTransport, Tag, TcpGroup, TcpTransport};
pub use types::{MessageSize, Rank, TrialCount};
