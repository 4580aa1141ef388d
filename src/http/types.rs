// HTTP 协议扩展类型与错误

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP 请求扩展字段
///
/// 挂在 `Request.extra` 上的不透明 JSON 解析而来，缺省字段取默认值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReqExtra {
    /// 请求方法，空表示 GET
    #[serde(default)]
    pub method: String,
    /// 附加请求头
    #[serde(default)]
    pub header: HashMap<String, String>,
    /// 请求体
    #[serde(default)]
    pub body: String,
}

impl ReqExtra {
    /// 从不透明扩展解析；None 视为全默认
    pub fn from_extra(extra: Option<&serde_json::Value>) -> Result<Self> {
        match extra {
            Some(value) => {
                serde_json::from_value(value.clone()).context("解析 HTTP 请求扩展字段失败")
            }
            None => Ok(Self::default()),
        }
    }
}

/// HTTP 下载选项扩展字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptsExtra {
    /// 并发连接数，0 表示未指定（取全局配置）
    #[serde(default)]
    pub connections: usize,
}

impl OptsExtra {
    pub fn from_extra(extra: Option<&serde_json::Value>) -> Result<Self> {
        match extra {
            Some(value) => {
                serde_json::from_value(value.clone()).context("解析 HTTP 下载选项扩展字段失败")
            }
            None => Ok(Self::default()),
        }
    }
}

/// 请求错误：服务器返回了 200/206 以外的状态码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    /// HTTP 状态码
    pub code: u16,
    /// 状态描述
    pub msg: String,
}

impl RequestError {
    pub fn new(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
        }
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP 请求失败, 状态码: {}", self.code)
    }
}

impl std::error::Error for RequestError {}

/// 下载统计信息（暂为占位）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpStats {}
