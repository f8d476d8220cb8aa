//! 结构化日志初始化

use crate::config::LoggingConfig;
use tracing_subscriber::{
    filter::ParseError, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError, EnvFilter, Layer,
};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("global subscriber already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// `RUST_LOG` 优先；否则使用配置的级别，sqlx 的逐条查询日志压到 warn
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = format!("{},sqlx=warn", config.level.to_lowercase());
    Ok(EnvFilter::try_new(directives)?)
}

/// 安装全局 subscriber；格式在配置加载时已校验为 json 或 pretty
pub fn init_telemetry(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let layer = if config.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::fmt::layer().pretty().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_events(FmtSpan::CLOSE)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    tracing::debug!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(())
}
