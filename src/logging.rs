//! 日志系统配置
//!
//! 控制台输出 + 可选的按天滚动文件输出。

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogConfig;

/// 初始化日志系统
///
/// 启用文件输出时返回 WorkerGuard，调用方需要持有它直到进程退出，
/// 否则缓冲中的日志会丢失。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());
    // RUST_LOG 优先于配置文件
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer().with_timer(timer.clone());

    if config.enable_file {
        std::fs::create_dir_all(&config.log_dir).context("创建日志目录失败")?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, "fastget.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer()
            .with_timer(timer)
            .with_ansi(false)
            .with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("初始化日志系统失败")?;
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("初始化日志系统失败")?;
        Ok(None)
    }
}
