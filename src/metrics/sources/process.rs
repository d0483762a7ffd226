//! Top processes by CPU and memory.

use crate::format::safe_percent;
use crate::metrics::data::ProcessInfo;
use crate::metrics::result::{CollectorData, CollectorResult};
use crate::metrics::traits::Collector;
use async_trait::async_trait;
use std::ffi::OsStr;
use sysinfo::{System, Users};

pub const MIN_TOP_N: usize = 1;
pub const MAX_TOP_N: usize = 200;

const MAX_NAME_CHARS: usize = 80;
const MAX_EXE_CHARS: usize = 200;

pub struct ProcessCollector {
    system: System,
    users: Users,
    top_n: usize,
}

impl ProcessCollector {
    /// `top_n` is clamped to `[1, 200]`.
    pub fn new(top_n: usize) -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
            top_n: top_n.clamp(MIN_TOP_N, MAX_TOP_N),
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    fn snapshot_processes(&self) -> Vec<ProcessInfo> {
        let total_memory = self.system.total_memory() as f64;
        // Process CPU usage is per core; normalize to a share of the host.
        let cores = self.system.cpus().len().max(1) as f64;

        self.system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let rss = process.memory();
                let username = process
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|user| user.name().to_string())
                    .unwrap_or_default();
                ProcessInfo {
                    pid: pid.as_u32(),
                    name: truncate(&lossy(process.name()), MAX_NAME_CHARS),
                    cpu_percent: (f64::from(process.cpu_usage()) / cores).clamp(0.0, 100.0),
                    memory_percent: safe_percent(rss as f64, total_memory),
                    memory_rss_mb: rss as f64 / (1024.0 * 1024.0),
                    status: process.status().to_string(),
                    username,
                    create_time: process.start_time() as f64,
                    num_threads: thread_count(process.tasks().map(|tasks| tasks.len())),
                    exe: process
                        .exe()
                        .map(|path| truncate(&path.to_string_lossy(), MAX_EXE_CHARS))
                        .unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Threads of a process from its task list; unknown without one.
fn thread_count(tasks: Option<usize>) -> Option<usize> {
    tasks.map(|count| count.max(1))
}

#[async_trait]
impl Collector for ProcessCollector {
    fn name(&self) -> &'static str {
        "processes"
    }

    async fn collect(&mut self) -> CollectorResult {
        self.system.refresh_all();
        self.users.refresh_list();

        let mut processes = self.snapshot_processes();
        rank_processes(&mut processes);
        processes.truncate(self.top_n);

        CollectorResult::success(CollectorData {
            processes: Some(processes),
            ..Default::default()
        })
    }
}

/// Sort descending by CPU, then by memory.
pub fn rank_processes(processes: &mut [ProcessInfo]) {
    processes.sort_by(|a, b| {
        b.cpu_percent
            .total_cmp(&a.cpu_percent)
            .then_with(|| b.memory_percent.total_cmp(&a.memory_percent))
    });
}

fn lossy<S: AsRef<OsStr>>(s: S) -> String {
    s.as_ref().to_string_lossy().into_owned()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
