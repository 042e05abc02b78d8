use std::time::Instant;

/// 进程与系统资源采样器
///
/// 背压循环依赖它读取 RSS 与 CPU 负载。非 Linux 平台一律返回 0，
/// 背压在这些平台上退化为不生效。
#[derive(Debug)]
pub struct SystemSampler;

impl SystemSampler {
    /// 当前进程常驻内存（MB）
    pub fn rss_mb() -> usize {
        #[cfg(target_os = "linux")]
        {
            Self::rss_mb_linux().unwrap_or(0)
        }
        #[cfg(not(target_os = "linux"))]
        {
            0
        }
    }

    #[cfg(target_os = "linux")]
    fn rss_mb_linux() -> Option<usize> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: usize = rest.split_whitespace().next()?.parse().ok()?;
                return Some(kb / 1024);
            }
        }
        None
    }
}

/// 基于 /proc/stat 差值的 CPU 负载采样
///
/// 每次 sample() 返回距上一次调用之间的总体 CPU 占用百分比，
/// 第一次采样没有参照，固定返回 0。
#[derive(Debug)]
pub struct CpuSampler {
    prev: Option<(u64, u64)>,
    last_sample: Instant,
}

impl CpuSampler {
    pub fn new() -> Self {
        Self {
            prev: None,
            last_sample: Instant::now(),
        }
    }

    pub fn sample(&mut self) -> f64 {
        self.last_sample = Instant::now();

        let Some((idle, total)) = Self::read_cpu_times() else {
            return 0.0;
        };

        let load = match self.prev {
            Some((prev_idle, prev_total)) => {
                let d_total = total.saturating_sub(prev_total);
                let d_idle = idle.saturating_sub(prev_idle);
                if d_total == 0 {
                    0.0
                } else {
                    100.0 * (d_total - d_idle.min(d_total)) as f64 / d_total as f64
                }
            }
            None => 0.0,
        };

        self.prev = Some((idle, total));
        load
    }

    #[cfg(target_os = "linux")]
    fn read_cpu_times() -> Option<(u64, u64)> {
        let stat = std::fs::read_to_string("/proc/stat").ok()?;
        let line = stat.lines().next()?;
        if !line.starts_with("cpu ") {
            return None;
        }
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|v| v.parse().ok())
            .collect();
        if fields.len() < 5 {
            return None;
        }
        // idle + iowait 视作空闲
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        let total: u64 = fields.iter().sum();
        Some((idle, total))
    }

    #[cfg(not(target_os = "linux"))]
    fn read_cpu_times() -> Option<(u64, u64)> {
        None
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_zero() {
        let mut sampler = CpuSampler::new();
        assert_eq!(sampler.sample(), 0.0);
    }

    #[test]
    fn test_subsequent_samples_are_bounded() {
        let mut sampler = CpuSampler::new();
        let _ = sampler.sample();
        let load = sampler.sample();
        assert!((0.0..=100.0).contains(&load));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rss_is_nonzero_on_linux() {
        assert!(SystemSampler::rss_mb() > 0);
    }
}
