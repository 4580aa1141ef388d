// 配置管理模块

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 默认 User-Agent（桌面 Chrome）
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// 默认并发连接数
pub const DEFAULT_CONNECTIONS: usize = 16;

/// HTTP 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 请求默认携带的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 单任务并发连接数
    #[serde(default = "default_connections")]
    pub connections: usize,
    /// 下载完成后是否把文件修改时间设置为服务器报告的时间
    #[serde(default)]
    pub use_server_ctime: bool,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_connections() -> usize {
    DEFAULT_CONNECTIONS
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connections: DEFAULT_CONNECTIONS,
            use_server_ctime: false,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否输出到文件
    #[serde(default)]
    pub enable_file: bool,
    /// 日志目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志级别（trace/debug/info/warn/error）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enable_file: false,
            log_dir: default_log_dir(),
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.connections, 16);
        assert!(config.user_agent.contains("Chrome/116"));
        assert!(!config.use_server_ctime);
    }

    #[test]
    fn test_config_serde_defaults() {
        // 空 JSON 也能反序列化出完整默认值
        let config: HttpConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.connections, 16);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }
}
