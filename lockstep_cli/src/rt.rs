//! Real-time scheduling for the tick thread (Linux SCHED_FIFO / affinity / mlockall).
//!
//! Applied once per process before the session thread is spawned; the
//! worker inherits the policy, the affinity mask and the memory lock.

use crate::cli::RtArgs;
#[cfg(target_os = "linux")]
use crate::cli::RtLock;

#[cfg(target_os = "linux")]
/// Capacity of cpu_set_t in CPU indices (bits).
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

/// CAP_SYS_NICE bit in /proc/self/status capability masks.
#[cfg(target_os = "linux")]
const CAP_SYS_NICE: u64 = 1 << 23;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(args: &RtArgs) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !args.rt {
        return;
    }
    RT_ONCE.get_or_init(|| {
        let lock = args.rt_lock.unwrap_or_else(RtLock::os_default);
        match apply_mem_lock(lock) {
            Ok(()) => tracing::info!(?lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, ?lock, "rt: mlockall failed"),
        }
        match apply_fifo_priority(args.rt_prio) {
            Ok(prio) => tracing::info!(prio, "rt: SCHED_FIFO"),
            Err(e) => tracing::warn!(error = %e, prio = ?args.rt_prio, "rt: sched_setscheduler failed"),
        }
        let cpu = args.rt_cpu.unwrap_or(0);
        match apply_affinity(cpu) {
            Ok(()) => tracing::info!(cpu, "rt: pinned"),
            Err(e) => tracing::warn!(error = %e, cpu, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(args: &RtArgs) {
    if args.rt {
        tracing::warn!("rt: real-time mode is only supported on Linux; ignoring --rt");
    }
}

#[cfg(target_os = "linux")]
fn mlockall(flags: libc::c_int) -> std::io::Result<()> {
    let rc = unsafe { libc::mlockall(flags) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(target_os = "linux")]
fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    Some(if cur == libc::RLIM_INFINITY {
        "memlock limit: unlimited".to_string()
    } else {
        format!("memlock limit: {} KiB", cur / 1024)
    })
}

#[cfg(target_os = "linux")]
fn apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    let retryable =
        |e: &std::io::Error| matches!(e.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    let err = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => match mlockall(libc::MCL_CURRENT) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
        RtLock::All => match mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) {
            Ok(()) => return Ok(()),
            // fall back to resident pages only
            Err(e) if retryable(&e) && mlockall(libc::MCL_CURRENT).is_ok() => {
                tracing::warn!(error = %e, "rt: mlockall(current|future) failed; locked current pages only");
                return Ok(());
            }
            Err(e) => e,
        },
    };
    let mut msg = format!("mlockall failed: {err}");
    if retryable(&err) {
        if let Some(h) = memlock_limit_hint() {
            msg.push_str(&format!("; {h}"));
        }
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn has_sys_nice() -> bool {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return true;
    };
    let cap = status.lines().any(|line| {
        line.strip_prefix("CapEff:")
            .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
            .is_some_and(|caps| caps & CAP_SYS_NICE != 0)
    });
    cap || unsafe { libc::geteuid() } == 0
}

/// Returns the priority actually applied (clamped to the system range).
#[cfg(target_os = "linux")]
fn apply_fifo_priority(prio: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    if !has_sys_nice() {
        eyre::bail!(
            "insufficient privileges for SCHED_FIFO: needs CAP_SYS_NICE or root \
             (hint: 'sudo setcap cap_sys_nice=ep /path/to/lockstep_cli')"
        );
    }
    let (min, max) = unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let prio = prio.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: prio,
    };
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(prio)
}

#[cfg(target_os = "linux")]
fn apply_affinity(cpu: usize) -> eyre::Result<()> {
    use libc::{CPU_ISSET, CPU_SET, CPU_ZERO, cpu_set_t};

    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 {
        eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
    }
    if cpu >= MAX_CPUSET_BITS || !i64::try_from(cpu).is_ok_and(|c| c < i64::from(online)) {
        eyre::bail!("requested CPU {cpu} is not online (online: {online})");
    }
    let set_size = std::mem::size_of::<cpu_set_t>();
    let mut allowed: cpu_set_t = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::sched_getaffinity(0, set_size, &mut allowed) };
    if rc == 0 && !unsafe { CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("CPU {cpu} not permitted by current affinity mask");
    }
    let mut desired: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut desired);
        CPU_SET(cpu, &mut desired);
    }
    let rc = unsafe { libc::sched_setaffinity(0, set_size, &desired) };
    if rc != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(())
}
