//! Thin wrapper around `getrusage(2)`, shared by the cpu/user/system clock
//! components. Reports process-level usage (`RUSAGE_SELF`) — a per-thread
//! probe would need `RUSAGE_THREAD`, which is Linux-only; process-level
//! keeps the default components portable across the platforms `libc`
//! already supports for this crate.

use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
}

impl CpuTimes {
    pub fn total(&self) -> Duration {
        self.user + self.system
    }
}

pub fn now() -> CpuTimes {
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            log::warn!("getrusage failed, cpu/user/system clocks will read zero");
            return CpuTimes::default();
        }
        CpuTimes {
            user: timeval_to_duration(usage.ru_utime),
            system: timeval_to_duration(usage.ru_stime),
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::new(tv.tv_sec.max(0) as u64, (tv.tv_usec.max(0) as u32) * 1000)
}
