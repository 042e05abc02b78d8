use std::time::Duration;

use anyhow::{Context, Result};
use gleaner::{Application, ShutdownCoordinator};
use gleaner_config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 关闭信号后留给在途条目的排干窗口
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().context("配置加载失败")?;
    info!(
        "gleaner 启动: 并发 {}，超时 {}ms，端口 {}",
        config.scraper.concurrency, config.scraper.timeout_ms, config.api.port
    );

    let coordinator = ShutdownCoordinator::new();

    // 信号监听: 触发广播后若排干超时则强制退出
    {
        let signal_coordinator = ShutdownCoordinator::from_sender(coordinator.sender().clone());
        tokio::spawn(async move {
            signal_coordinator.listen_for_signals().await;

            tokio::time::sleep(SHUTDOWN_GRACE).await;
            error!("排干超过 {:?}，强制退出", SHUTDOWN_GRACE);
            std::process::exit(1);
        });
    }

    let application = Application::build(config).await?;
    application.run(coordinator.sender().clone()).await?;

    Ok(())
}
