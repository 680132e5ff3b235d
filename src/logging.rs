// ==========================================
// 钢筋网片 ERP 集成层 - 日志系统初始化
// ==========================================
// 环境变量:
//   RUST_LOG             级别过滤（默认 info），如 RUST_LOG=mesh_erp::engine=debug
//   MESH_ERP_LOG_FORMAT  text（默认）| json，批处理落盘时用 json
// 日志写 stderr，stdout 留给命令行的 JSON 输出
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FORMAT_ENV: &str = "MESH_ERP_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// 宽松解析，未知取值按 Text 处理
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Text)
    }
}

/// 初始化日志系统（重复调用时静默忽略）
pub fn init() {
    init_with(LogFormat::from_env(), "info");
}

pub fn init_with(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let result = match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_current_span(false)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("日志系统已初始化，跳过");
    }
}

/// 测试用：debug 级别，输出交给测试框架捕获
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" text "), LogFormat::Text);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Text);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test();
        init_with(LogFormat::Json, "warn");
    }
}
