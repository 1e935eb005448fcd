//! System Resource Sampler
//!
//! Linux sampler backed by `/proc` and the cgroup filesystem. Every source
//! is optional; anything unreadable simply leaves the reading out.

use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::task::{JoinHandle, LocalSet};
use tracing::{debug, info};

use super::{ResourceMonitor, ResourceSnapshot};

const PAGE_SIZE: u64 = 4096;
const CLOCK_TICKS_PER_SEC: f64 = 100.0;
/// cgroup v1 reports "unlimited" as a very large page-aligned number.
const CGROUP_UNLIMITED_FLOOR: u64 = 1 << 60;

// == System Monitor ==
/// Samples process memory, CPU and scheduler lag on a local tokio task.
#[derive(Debug)]
pub struct SystemMonitor {
    latest: Rc<Cell<Option<ResourceSnapshot>>>,
    memory_limit: Option<u64>,
    sampler: RefCell<Option<JoinHandle<()>>>,
}

impl SystemMonitor {
    // == Constructor ==
    /// Creates the monitor and discovers the effective memory ceiling: the
    /// smaller of physical memory and any cgroup limit.
    pub fn new() -> Self {
        let memory_limit = match (physical_memory_bytes(), cgroup_limit_bytes()) {
            (Some(total), Some(cgroup)) => Some(total.min(cgroup)),
            (total, cgroup) => total.or(cgroup),
        };
        debug!(?memory_limit, "Discovered process memory limit");

        Self {
            latest: Rc::new(Cell::new(None)),
            memory_limit,
            sampler: RefCell::new(None),
        }
    }

    // == Start ==
    /// Spawns the sampling task on `local`, replacing a running one.
    pub fn start(&self, local: &LocalSet, interval: Duration) {
        self.stop();

        let latest = Rc::clone(&self.latest);
        let interval = interval.max(Duration::from_millis(1));

        info!("Starting resource sampler with interval of {:?}", interval);
        let handle = local.spawn_local(async move {
            let mut cpu = CpuSampler::new();
            loop {
                let scheduled = Instant::now();
                tokio::time::sleep(interval).await;
                let lag = scheduled.elapsed().saturating_sub(interval);

                let snapshot = ResourceSnapshot {
                    process_memory_bytes: resident_memory_bytes().unwrap_or(0),
                    cpu_utilization: cpu.sample().unwrap_or(0.0),
                    event_loop_utilization: (lag.as_secs_f64() / interval.as_secs_f64())
                        .clamp(0.0, 1.0),
                };
                latest.set(Some(snapshot));
            }
        });
        *self.sampler.borrow_mut() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sampler.borrow_mut().take() {
            handle.abort();
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ResourceMonitor for SystemMonitor {
    fn snapshot(&self) -> Option<ResourceSnapshot> {
        self.latest.get()
    }

    fn memory_limit_bytes(&self) -> Option<u64> {
        self.memory_limit
    }
}

// == CPU Sampler ==
struct CpuSampler {
    last: Option<(Instant, u64)>,
}

impl CpuSampler {
    fn new() -> Self {
        Self {
            last: cpu_ticks().map(|ticks| (Instant::now(), ticks)),
        }
    }

    /// Utilisation since the previous sample, as a fraction of one core.
    fn sample(&mut self) -> Option<f64> {
        let now = Instant::now();
        let ticks = cpu_ticks()?;
        let previous = self.last.replace((now, ticks));
        let (then, then_ticks) = previous?;

        let elapsed = now.duration_since(then).as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let used = ticks.saturating_sub(then_ticks) as f64 / CLOCK_TICKS_PER_SEC;
        Some((used / elapsed).clamp(0.0, 1.0))
    }
}

// == Readers ==
fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn resident_memory_bytes() -> Option<u64> {
    let statm = read_trimmed("/proc/self/statm")?;
    parse_statm_resident(&statm).map(|pages| pages * PAGE_SIZE)
}

fn cpu_ticks() -> Option<u64> {
    parse_stat_cpu_ticks(&read_trimmed("/proc/self/stat")?)
}

fn physical_memory_bytes() -> Option<u64> {
    parse_meminfo_total(&fs::read_to_string("/proc/meminfo").ok()?)
}

fn cgroup_limit_bytes() -> Option<u64> {
    // cgroup v2 first, then v1
    ["/sys/fs/cgroup/memory.max", "/sys/fs/cgroup/memory/memory.limit_in_bytes"]
        .iter()
        .find_map(|path| read_trimmed(path).and_then(|raw| parse_cgroup_limit(&raw)))
}

// == Parsers ==
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

/// Sums utime and stime (fields 14 and 15) of `/proc/self/stat`.
fn parse_stat_cpu_ticks(stat: &str) -> Option<u64> {
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace().skip(11);
    let utime: u64 = fields.next()?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    Some(utime + stime)
}

fn parse_meminfo_total(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|l| l.starts_with("MemTotal:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    let value: u64 = raw.parse().ok()?;
    (value > 0 && value < CGROUP_UNLIMITED_FLOOR).then_some(value)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm_resident("1000 250 100 1 0 300 0"), Some(250));
        assert_eq!(parse_statm_resident(""), None);
    }

    #[test]
    fn test_parse_stat_with_spaces_in_comm() {
        let stat = "42 (my cache) S 1 42 42 0 -1 4194560 100 0 0 0 17 5 0 0 20 0 1 0";
        assert_eq!(parse_stat_cpu_ticks(stat), Some(22));
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16384 kB\nMemFree:         1024 kB\n";
        assert_eq!(parse_meminfo_total(meminfo), Some(16384 * 1024));
    }

    #[test]
    fn test_parse_cgroup_limit() {
        assert_eq!(parse_cgroup_limit("max"), None);
        assert_eq!(parse_cgroup_limit("536870912"), Some(536_870_912));
        assert_eq!(parse_cgroup_limit("9223372036854771712"), None);
        assert_eq!(parse_cgroup_limit("0"), None);
    }

    #[test]
    fn test_snapshot_empty_before_first_sample() {
        let monitor = SystemMonitor::new();
        assert!(monitor.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_sampler_publishes_snapshot() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let monitor = SystemMonitor::new();
                monitor.start(&local, Duration::from_millis(10));
                tokio::time::sleep(Duration::from_millis(60)).await;

                if cfg!(target_os = "linux") {
                    assert!(monitor.snapshot().is_some());
                }
                monitor.stop();
            })
            .await;
    }

    #[tokio::test]
    async fn test_start_outside_local_context() {
        let local = LocalSet::new();
        let monitor = SystemMonitor::new();
        monitor.start(&local, Duration::from_millis(10));

        local.run_until(tokio::time::sleep(Duration::from_millis(60))).await;
        if cfg!(target_os = "linux") {
            assert!(monitor.snapshot().is_some());
        }
        monitor.stop();
    }
}
