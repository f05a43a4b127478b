//! 日志初始化
//!
//! 基于 tracing 的结构化日志，支持 json / text 两种输出格式。
//! 日志里绝不出现密钥材料，相关类型的 Debug 实现已脱敏。

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// 初始化日志系统
///
/// # Arguments
/// * `level` - 默认日志级别 (trace/debug/info/warn/error)
/// * `format` - 输出格式 ("json" 或 "text")
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("corevault={level},warn")));

    match format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(false)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }

    tracing::info!(level, format, "Logging initialized");
    Ok(())
}
