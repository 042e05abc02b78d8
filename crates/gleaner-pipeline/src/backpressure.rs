use std::sync::Arc;
use std::time::{Duration, Instant};

use gleaner_infrastructure::{CpuSampler, JobQueue, SystemSampler};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 背压阈值配置
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub cpu_interval: Duration,
    /// 高于该负载暂停队列
    pub cpu_high: f64,
    /// 低于该负载恢复队列
    pub cpu_low: f64,
    /// 自动恢复前的最短暂停时长，避免振荡负载下的反复开关
    pub min_pause: Duration,
    pub memory_interval: Duration,
    /// RSS 告警阈值（MB）
    pub memory_warn_mb: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            cpu_interval: Duration::from_secs(5),
            cpu_high: 70.0,
            cpu_low: 40.0,
            min_pause: Duration::from_secs(10),
            memory_interval: Duration::from_secs(30),
            memory_warn_mb: 500,
        }
    }
}

/// 启动 CPU 与内存两条反馈循环
///
/// CPU 循环只管理自己触发的暂停，手动暂停不会被覆盖或解除。
/// 内存循环独立于暂停状态，只做观测与告警。
pub fn spawn_backpressure(
    queue: Arc<dyn JobQueue>,
    config: BackpressureConfig,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(2);

    {
        let queue = Arc::clone(&queue);
        let config = config.clone();
        let mut shutdown_rx = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            let mut sampler = CpuSampler::new();
            let mut tick = interval(config.cpu_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut paused_at: Option<Instant> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("CPU 背压循环收到关闭信号");
                        break;
                    }
                    _ = tick.tick() => {
                        let load = sampler.sample();
                        debug!("CPU 负载采样: {:.1}%", load);

                        if load > config.cpu_high && !queue.is_paused() {
                            warn!(
                                "CPU 负载 {:.1}% 超过 {:.0}%，暂停队列",
                                load, config.cpu_high
                            );
                            queue.pause(true);
                            paused_at = Some(Instant::now());
                        } else if load < config.cpu_low && queue.paused_by_cpu() {
                            let held_long_enough = paused_at
                                .map(|at| at.elapsed() >= config.min_pause)
                                .unwrap_or(true);
                            if held_long_enough {
                                info!(
                                    "CPU 负载 {:.1}% 回落到 {:.0}% 以下，恢复队列",
                                    load, config.cpu_low
                                );
                                queue.resume();
                                paused_at = None;
                            }
                        }
                    }
                }
            }
        }));
    }

    {
        let mut shutdown_rx = shutdown.subscribe();

        handles.push(tokio::spawn(async move {
            let mut tick = interval(config.memory_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("内存观测循环收到关闭信号");
                        break;
                    }
                    _ = tick.tick() => {
                        let rss = SystemSampler::rss_mb();
                        if rss > config.memory_warn_mb {
                            warn!(
                                "进程 RSS {}MB 超过 {}MB 阈值",
                                rss, config.memory_warn_mb
                            );
                        } else {
                            debug!("进程 RSS: {}MB", rss);
                        }
                    }
                }
            }
        }));
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_match_deployment_profile() {
        let config = BackpressureConfig::default();
        assert_eq!(config.cpu_interval, Duration::from_secs(5));
        assert_eq!(config.cpu_high, 70.0);
        assert_eq!(config.cpu_low, 40.0);
        assert_eq!(config.memory_interval, Duration::from_secs(30));
        assert_eq!(config.memory_warn_mb, 500);
        assert!(config.min_pause >= Duration::from_secs(5));
    }
}
