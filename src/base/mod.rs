// 基础数据模型
//
// 下载请求、下载选项、探测到的资源信息等跨协议的公共类型。
// 协议相关的扩展字段（method/header/connections 等）以不透明的
// JSON 值挂在 `extra` 上，由各协议自行解析成强类型。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 下载请求（不可变输入）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    /// 资源 URL
    pub url: String,
    /// 协议相关的扩展字段（HTTP: method/header/body）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    /// 代理配置，None 表示直连
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    /// 是否跳过 TLS 证书校验
    #[serde(default)]
    pub skip_verify_cert: bool,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// 代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// 代理协议（http / https / socks5）
    pub scheme: String,
    /// 代理地址，形如 host:port
    pub host: String,
    /// 用户名（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usr: Option<String>,
    /// 密码（可选）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,
}

impl ProxyConfig {
    /// 拼接代理 URL，形如 socks5://127.0.0.1:1080
    pub fn to_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// 下载选项（用户意图）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Options {
    /// 保存文件名，空串表示沿用资源解析出的文件名
    #[serde(default)]
    pub name: String,
    /// 保存目录
    #[serde(default)]
    pub path: String,
    /// 协议相关的扩展字段（HTTP: connections）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// 探测到的资源信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    /// 服务器是否支持 Range 请求（断点续传）
    pub range: bool,
    /// 资源总大小（字节），0 表示未知（chunked 编码等）
    pub size: u64,
    /// 文件信息
    pub file: FileInfo,
}

/// 资源对应的文件信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileInfo {
    /// 文件名
    pub name: String,
    /// 文件大小（字节），与资源大小一致
    pub size: u64,
    /// 服务器报告的修改时间（Last-Modified）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<DateTime<Utc>>,
}
