//! # Resource limits and their POSIX enforcement.
//!
//! [`ResourceLimits`] is the budget issued to one task attempt. Durations are
//! (de)serialized as seconds so QoS descriptions stay human-writable:
//!
//! ```json
//! { "cpu_time": 900, "wall_time": 1800, "memory_bytes": 8589934592 }
//! ```
//!
//! For subprocess bodies the limits are applied inside a `pre_exec` hook, in
//! the child after `fork()` and right before `execve()`:
//! - `cpu_time` → `RLIMIT_CPU` (soft = limit, hard = limit + 1s, so `SIGXCPU` comes first)
//! - `memory_bytes` → `RLIMIT_AS`
//! - `disk_bytes` → `RLIMIT_FSIZE`
//! - core dumps are always disabled (`RLIMIT_CORE = 0`)
//!
//! On non-Unix platforms the request is logged and ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-attempt resource budget; `None` means "no explicit limit".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// CPU time (user + system).
    #[serde(with = "opt_secs")]
    pub cpu_time: Option<Duration>,
    /// Wall-clock time.
    #[serde(with = "opt_secs")]
    pub wall_time: Option<Duration>,
    /// Address-space ceiling in bytes.
    pub memory_bytes: Option<u64>,
    /// Maximum size of created files in bytes.
    pub disk_bytes: Option<u64>,
}

impl ResourceLimits {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cpu_time.is_none()
            && self.wall_time.is_none()
            && self.memory_bytes.is_none()
            && self.disk_bytes.is_none()
    }

    /// Returns a copy with CPU time `cpu`; wall time keeps its wall/CPU ratio.
    pub fn rescaled(&self, cpu: Duration) -> Self {
        let mut next = *self;
        if let (Some(prev_cpu), Some(wall)) = (self.cpu_time, self.wall_time) {
            if !prev_cpu.is_zero() {
                let ratio = cpu.as_secs_f64() / prev_cpu.as_secs_f64();
                next.wall_time = Some(Duration::from_secs(
                    (wall.as_secs_f64() * ratio).round() as u64,
                ));
            }
        }
        next.cpu_time = Some(cpu);
        next
    }
}

pub(crate) mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(x) if !x.is_finite() || x < 0.0 => Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {x}"
            ))),
            Some(x) => Ok(Some(Duration::from_secs_f64(x))),
            None => Ok(None),
        }
    }
}

/// Attaches rlimits derived from `limits` to a subprocess command.
#[cfg(unix)]
pub fn attach_rlimits(cmd: &mut std::process::Command, limits: &ResourceLimits) {
    use std::os::unix::process::CommandExt;

    let cpu = limits.cpu_time.map(|d| d.as_secs_f64().ceil().max(1.0) as u64);
    let memory = limits.memory_bytes;
    let disk = limits.disk_bytes;

    // SAFETY: the hook only calls async-signal-safe `setrlimit`.
    unsafe {
        cmd.pre_exec(move || {
            if let Some(secs) = cpu {
                check(libc::setrlimit(libc::RLIMIT_CPU, &rlimit(secs, secs.saturating_add(1))))?;
            }
            if let Some(bytes) = memory {
                check(libc::setrlimit(libc::RLIMIT_AS, &rlimit(bytes, bytes)))?;
            }
            if let Some(bytes) = disk {
                check(libc::setrlimit(libc::RLIMIT_FSIZE, &rlimit(bytes, bytes)))?;
            }
            check(libc::setrlimit(libc::RLIMIT_CORE, &rlimit(0, 0)))
        });
    }
}

#[cfg(not(unix))]
pub fn attach_rlimits(_cmd: &mut std::process::Command, limits: &ResourceLimits) {
    if !limits.is_empty() {
        tracing::warn!(
            target: "verivisor::limits",
            ?limits,
            "rlimit-based limits requested on a non-Unix OS; limits will be ignored"
        );
    }
}

#[cfg(unix)]
fn rlimit(soft: u64, hard: u64) -> libc::rlimit {
    libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    }
}

#[cfg(unix)]
fn check(rc: libc::c_int) -> std::io::Result<()> {
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_keeps_wall_to_cpu_ratio() {
        let limits = ResourceLimits {
            cpu_time: Some(Duration::from_secs(10)),
            wall_time: Some(Duration::from_secs(30)),
            memory_bytes: Some(1 << 30),
            disk_bytes: None,
        };
        let next = limits.rescaled(Duration::from_secs(15));
        assert_eq!(next.cpu_time, Some(Duration::from_secs(15)));
        assert_eq!(next.wall_time, Some(Duration::from_secs(45)));
        assert_eq!(next.memory_bytes, Some(1 << 30));
    }

    #[test]
    fn rescale_without_wall_time() {
        let limits = ResourceLimits {
            cpu_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        let next = limits.rescaled(Duration::from_secs(20));
        assert_eq!(next.wall_time, None);
    }

    #[test]
    fn seconds_in_json() {
        let limits: ResourceLimits =
            serde_json::from_str(r#"{"cpu_time": 90, "memory_bytes": 1024}"#).unwrap();
        assert_eq!(limits.cpu_time, Some(Duration::from_secs(90)));
        assert_eq!(limits.wall_time, None);
        assert!(serde_json::from_str::<ResourceLimits>(r#"{"cpu_time": -1}"#).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn attaching_limits_does_not_panic() {
        let mut cmd = std::process::Command::new("true");
        attach_rlimits(
            &mut cmd,
            &ResourceLimits {
                cpu_time: Some(Duration::from_secs(5)),
                memory_bytes: Some(1 << 30),
                ..Default::default()
            },
        );
    }
}
