//! Process limits and owner liveness checks.
//!
//! | Check | Unix | Other |
//! |-------|------|-------|
//! | memory ceiling | `setrlimit(RLIMIT_AS)` | logged, not enforced |
//! | owner liveness | `kill(pid, 0)` | assumed alive |
//! | host name | `gethostname` | `HOSTNAME` or `localhost` |

use crate::result::{BenchError, BenchResult};

#[cfg(unix)]
const GIB: u64 = 1024 * 1024 * 1024;

/// Cap the address space of this process at `limit_gb` GiB. Zero disables
/// the cap. The hard limit is never raised.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn apply_memory_limit(limit_gb: u64) -> BenchResult<()> {
    if limit_gb == 0 {
        return Ok(());
    }
    let bytes = limit_gb.saturating_mul(GIB);

    // SAFETY: zeroed rlimit is valid and both calls report failure through
    // their return value.
    unsafe {
        let mut current: libc::rlimit = std::mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_AS, &mut current) != 0 {
            return Err(BenchError::limit(format!(
                "getrlimit failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let wanted = bytes as libc::rlim_t;
        let limit = libc::rlimit {
            rlim_cur: wanted.min(current.rlim_max),
            rlim_max: current.rlim_max,
        };
        if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
            return Err(BenchError::limit(format!(
                "setrlimit({limit_gb} GiB) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
    }
    tracing::debug!(limit_gb, "address space limit applied");
    Ok(())
}

/// Cap the address space of this process at `limit_gb` GiB.
#[cfg(not(unix))]
pub fn apply_memory_limit(limit_gb: u64) -> BenchResult<()> {
    if limit_gb > 0 {
        tracing::warn!(limit_gb, "memory limit not supported on this platform");
    }
    Ok(())
}

/// Whether a process with this id exists on this host
#[cfg(unix)]
#[allow(unsafe_code)]
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // pid 0 would address our own process group
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 performs only the existence and permission checks.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether a process with this id exists on this host
#[cfg(not(unix))]
#[must_use]
pub fn pid_alive(_pid: u32) -> bool {
    true
}

/// Name of this host
#[cfg(unix)]
#[allow(unsafe_code)]
#[must_use]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is writable for its full length.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return fallback_hostname();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).into_owned();
    if name.is_empty() {
        fallback_hostname()
    } else {
        name
    }
}

/// Name of this host
#[cfg(not(unix))]
#[must_use]
pub fn hostname() -> String {
    fallback_hostname()
}

fn fallback_hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
