// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CPU affinity diagnostic.
//!
//! Lists the CPUs this process may run on, so operators can check how the
//! launcher placed each member before looking at its timings.

use std::io::{self, Write};

#[cfg(target_os = "linux")]
use nix::sched::{sched_getaffinity, CpuSet};
#[cfg(target_os = "linux")]
use nix::unistd::Pid;

/// CPUs in the calling process's affinity mask, ascending.
#[cfg(target_os = "linux")]
pub fn allowed_cpus() -> Result<Vec<usize>, nix::Error> {
    let set = sched_getaffinity(Pid::from_raw(0))?;
    let cpus = cpus_in(&set);

    tracing::debug!(
        allowed = cpus.len(),
        online = num_cpus::get(),
        "Affinity mask read"
    );

    Ok(cpus)
}

/// No affinity query on this platform; nothing is listed.
#[cfg(not(target_os = "linux"))]
pub fn allowed_cpus() -> Result<Vec<usize>, nix::Error> {
    tracing::debug!(online = num_cpus::get(), "Affinity query not supported");
    Ok(Vec::new())
}

#[cfg(target_os = "linux")]
fn cpus_in(set: &CpuSet) -> Vec<usize> {
    (0..CpuSet::count())
        .filter(|&cpu| set.is_set(cpu).unwrap_or(false))
        .collect()
}

/// Write one `CPU n is set` line per allowed CPU.
pub fn report<W: Write>(out: &mut W, cpus: &[usize]) -> io::Result<()> {
    for cpu in cpus {
        writeln!(out, "CPU {} is set", cpu)?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_format() {
        let mut out = Vec::new();
        report(&mut out, &[0, 2, 7]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "CPU 0 is set\nCPU 2 is set\nCPU 7 is set\n"
        );
    }

    #[test]
    fn test_report_empty() {
        let mut out = Vec::new();
        report(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_cpus_in_set() {
        let mut set = CpuSet::new();
        set.set(1).unwrap();
        set.set(3).unwrap();
        assert_eq!(cpus_in(&set), vec![1, 3]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_process_has_cpus() {
        let cpus = allowed_cpus().unwrap();
        assert!(!cpus.is_empty(), "Process must be allowed at least one CPU");
        assert!(cpus.windows(2).all(|w| w[0] < w[1]));
        assert!(cpus.iter().all(|&cpu| cpu < CpuSet::count()));
    }
}
