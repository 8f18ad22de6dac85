//! Host information for the `info` command.

use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

/// Snapshot of the host the bot runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemReport {
    /// OS name and version, e.g. `Ubuntu 22.04`.
    pub system: String,
    /// Kernel version.
    pub kernel: String,
    /// CPU architecture.
    pub machine: String,
    /// CPU brand string.
    pub processor: String,
    /// Seconds since boot.
    pub uptime_secs: u64,
    /// Global CPU usage in percent.
    pub cpu_percent: f32,
    /// Used memory in percent of total.
    pub memory_percent: f32,
}

impl SystemReport {
    /// Gather the report. Waits one CPU sampling interval for a usable reading.
    pub async fn collect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu();
        sys.refresh_memory();

        let unknown = || "unknown".to_string();
        let system = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{name} {version}"),
            (Some(name), None) => name,
            _ => unknown(),
        };
        let processor = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(unknown);

        let report = Self {
            system,
            kernel: System::kernel_version().unwrap_or_else(unknown),
            machine: std::env::consts::ARCH.to_string(),
            processor,
            uptime_secs: System::uptime(),
            cpu_percent: sys.global_cpu_info().cpu_usage(),
            memory_percent: percent(sys.used_memory(), sys.total_memory()),
        };
        debug!("collected system report: {report:?}");
        report
    }

    /// Uptime in `D days, H:MM:SS` form.
    pub fn uptime(&self) -> String {
        format_uptime(self.uptime_secs)
    }

    /// Name/value pairs in display order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("System", format!("{} (kernel {})", self.system, self.kernel)),
            ("Machine", self.machine.clone()),
            ("Processor", self.processor.clone()),
            ("Uptime", self.uptime()),
            ("CPU Usage", format!("{:.1}%", self.cpu_percent)),
            ("Memory Usage", format!("{:.1}%", self.memory_percent)),
        ]
    }
}

fn percent(used: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64 * 100.0) as f32
}

/// Format seconds as `H:MM:SS`, prefixed with whole days when present.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;
    let clock = format!("{hours}:{minutes:02}:{seconds:02}");
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        days => format!("{days} days, {clock}"),
    }
}
