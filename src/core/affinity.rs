//! CPU affinity planning.
//!
//! Online CPUs are split into groups of `width` contiguous ids. Worker `i`
//! (0-based) lands in group `i % groups` and may run on every CPU of that
//! group. Planning is a pure function of its inputs; applying the plan is
//! advisory and only does something on Linux.

use std::io;
use std::num::NonZeroUsize;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::PoolError;

/// Highest CPU id the planner accepts as an explicit width.
pub const CPU_ID_MAX: usize = 255;

/// How many CPUs each worker may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AffinityWidth {
    /// Workers are not pinned.
    #[default]
    Disabled,
    /// Every worker may use every online CPU.
    All,
    /// Each worker may use exactly this many CPUs.
    Width(NonZeroUsize),
}

impl AffinityWidth {
    /// Parses the raw integer form: `0` disables pinning, `-1` or anything
    /// above [`CPU_ID_MAX`] means all CPUs.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` for negative values other than `-1`.
    pub fn from_raw(raw: i32) -> Result<Self, PoolError> {
        match raw {
            0 => Ok(Self::Disabled),
            -1 => Ok(Self::All),
            n if n < 0 => Err(PoolError::InvalidArgument(format!(
                "affinity width {n} is negative"
            ))),
            n => {
                let n = n.unsigned_abs() as usize;
                Ok(NonZeroUsize::new(n)
                    .filter(|w| w.get() <= CPU_ID_MAX)
                    .map_or(Self::All, Self::Width))
            }
        }
    }

    /// Raw integer form, the inverse of [`AffinityWidth::from_raw`].
    #[must_use]
    pub fn as_raw(self) -> i32 {
        match self {
            Self::Disabled => 0,
            Self::All => -1,
            Self::Width(n) => i32::try_from(n.get()).unwrap_or(-1),
        }
    }

    /// Whether workers should be pinned at all.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl From<AffinityWidth> for i32 {
    fn from(width: AffinityWidth) -> Self {
        width.as_raw()
    }
}

impl TryFrom<i32> for AffinityWidth {
    type Error = PoolError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

/// Computes the CPU range for the worker at `worker_index` (0-based).
///
/// Returns `None` when pinning is disabled.
#[must_use]
pub fn plan_cpus(worker_index: usize, width: AffinityWidth, online_cpus: usize) -> Option<Range<usize>> {
    let width = match width {
        AffinityWidth::Disabled => return None,
        AffinityWidth::All => online_cpus.max(1),
        AffinityWidth::Width(n) => n.get(),
    };

    let groups = (online_cpus / width).max(1);
    let group = worker_index % groups;
    Some(width * group..width * (group + 1))
}

/// Number of CPUs currently online on the host.
///
/// Machine-wide, not narrowed by this process's affinity mask or cgroup quota.
#[cfg(target_os = "linux")]
#[must_use]
pub fn online_cpus() -> usize {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::_NPROCESSORS_ONLN) {
        Ok(Some(n)) if n > 0 => usize::try_from(n).unwrap_or(1),
        _ => num_cpus::get(),
    }
}

/// Number of CPUs currently online on the host.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn online_cpus() -> usize {
    num_cpus::get()
}

/// Pins the calling thread to `cpus` and returns the CPUs the OS granted.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(cpus: Range<usize>) -> io::Result<Vec<usize>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let mut set = CpuSet::new();
    for cpu in cpus.take_while(|cpu| *cpu < CpuSet::count()) {
        set.set(cpu)?;
    }
    sched_setaffinity(Pid::from_raw(0), &set)?;
    current_thread_cpus()
}

/// Pinning is not supported here; workers run unconstrained.
#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_current_thread(_cpus: Range<usize>) -> io::Result<Vec<usize>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread affinity is not supported on this platform",
    ))
}

/// CPUs the calling thread is currently allowed to run on.
#[cfg(target_os = "linux")]
pub fn current_thread_cpus() -> io::Result<Vec<usize>> {
    use nix::sched::{sched_getaffinity, CpuSet};
    use nix::unistd::Pid;

    let set = sched_getaffinity(Pid::from_raw(0))?;
    Ok((0..CpuSet::count())
        .filter(|cpu| set.is_set(*cpu).unwrap_or(false))
        .collect())
}

/// CPUs the calling thread is currently allowed to run on.
#[cfg(not(target_os = "linux"))]
pub fn current_thread_cpus() -> io::Result<Vec<usize>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread affinity is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width(n: usize) -> AffinityWidth {
        AffinityWidth::Width(NonZeroUsize::new(n).unwrap())
    }

    #[test]
    fn test_width_two_on_eight_cpus() {
        // 4 groups: {0,1} {2,3} {4,5} {6,7}
        assert_eq!(plan_cpus(5, width(2), 8), Some(2..4));
        assert_eq!(plan_cpus(0, width(2), 8), Some(0..2));
        assert_eq!(plan_cpus(3, width(2), 8), Some(6..8));
        assert_eq!(plan_cpus(4, width(2), 8), Some(0..2));
    }

    #[test]
    fn test_plan_is_deterministic() {
        for index in 0..64 {
            assert_eq!(plan_cpus(index, width(3), 16), plan_cpus(index, width(3), 16));
        }
    }

    #[test]
    fn test_disabled_plans_nothing() {
        assert_eq!(plan_cpus(0, AffinityWidth::Disabled, 8), None);
    }

    #[test]
    fn test_all_covers_every_online_cpu() {
        for index in 0..10 {
            assert_eq!(plan_cpus(index, AffinityWidth::All, 6), Some(0..6));
        }
        assert_eq!(plan_cpus(0, AffinityWidth::All, 0), Some(0..1));
    }

    #[test]
    fn test_width_wider_than_machine_uses_single_group() {
        assert_eq!(plan_cpus(7, width(16), 4), Some(0..16));
    }

    #[test]
    fn test_uneven_split_drops_remainder_cpus() {
        // 10 / 4 = 2 groups; CPUs 8 and 9 are never planned.
        assert_eq!(plan_cpus(0, width(4), 10), Some(0..4));
        assert_eq!(plan_cpus(1, width(4), 10), Some(4..8));
        assert_eq!(plan_cpus(2, width(4), 10), Some(0..4));
    }

    #[test]
    fn test_from_raw() {
        assert_eq!(AffinityWidth::from_raw(0).unwrap(), AffinityWidth::Disabled);
        assert_eq!(AffinityWidth::from_raw(-1).unwrap(), AffinityWidth::All);
        assert_eq!(AffinityWidth::from_raw(4).unwrap(), width(4));
        assert_eq!(AffinityWidth::from_raw(255).unwrap(), width(255));
        assert_eq!(AffinityWidth::from_raw(256).unwrap(), AffinityWidth::All);
        assert!(AffinityWidth::from_raw(-2).is_err());
    }

    #[test]
    fn test_raw_serde_form() {
        let json = serde_json::to_string(&width(2)).unwrap();
        assert_eq!(json, "2");
        let parsed: AffinityWidth = serde_json::from_str("-1").unwrap();
        assert_eq!(parsed, AffinityWidth::All);
        assert!(serde_json::from_str::<AffinityWidth>("-5").is_err());
    }

    #[test]
    fn test_online_cpus_is_positive() {
        assert!(online_cpus() >= 1);
    }

    #[test]
    fn test_online_count_is_not_narrowed_by_process_limits() {
        // The usable count honours affinity masks and quotas; the online
        // count must never be smaller than it.
        assert!(online_cpus() >= num_cpus::get());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_online_count_covers_allowed_cpus() {
        let allowed = current_thread_cpus().unwrap();
        assert!(!allowed.is_empty());
        assert!(online_cpus() >= allowed.len());
    }
}
