// HTTP Fetcher 管理器
//
// 向注册中心暴露协议名、URL 过滤器、构建与存取接口。

use anyhow::Result;
use reqwest::Url;

use crate::config::HttpConfig;
use crate::fetcher::{FetcherMeta, FilterType, SchemeFilter};
use crate::http::fetcher::HttpFetcher;
use crate::http::types::{OptsExtra, ReqExtra};
use crate::persistence::{self, FetcherData};

/// HTTP 协议管理器
#[derive(Debug, Clone, Default)]
pub struct HttpFetcherManager {}

impl HttpFetcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 协议名
    pub fn name(&self) -> &'static str {
        "http"
    }

    /// 本协议处理的 URL scheme
    pub fn filters(&self) -> Vec<SchemeFilter> {
        vec![
            SchemeFilter {
                filter_type: FilterType::Url,
                pattern: "HTTP".to_string(),
            },
            SchemeFilter {
                filter_type: FilterType::Url,
                pattern: "HTTPS".to_string(),
            },
        ]
    }

    /// 构建一个未接线的 Fetcher（调用方负责 setup）
    pub fn build(&self) -> HttpFetcher {
        HttpFetcher::new()
    }

    /// 从 URL 推导显示用文件名：路径基名，为空时退回主机名
    pub fn parse_name(&self, url: &str) -> String {
        let Ok(url) = Url::parse(url) else {
            return String::new();
        };
        let path = url.path().trim_end_matches('/');
        let mut name = path.rsplit('/').next().unwrap_or("").to_string();
        if name.is_empty() || name == "/" || name == "." {
            name = url.host_str().unwrap_or("").to_string();
        }
        name
    }

    /// 同名文件是否自动改名
    pub fn auto_rename(&self) -> bool {
        true
    }

    /// 协议默认配置
    pub fn default_config(&self) -> HttpConfig {
        HttpConfig::default()
    }

    /// 快照 Fetcher 的分片进度为不透明值
    pub fn store(&self, fetcher: &HttpFetcher) -> Result<serde_json::Value> {
        persistence::snapshot(&fetcher.chunks)
    }

    /// 用元信息与快照重建 Fetcher
    ///
    /// 落在 create 之后、start 之前的位置：扩展字段重新校验，文件
    /// 保持关闭，分片进度原样保留（瞬态标记归零）。快照中分片为空
    /// 时留待 start 重新切分。
    pub fn restore(&self, meta: FetcherMeta, data: serde_json::Value) -> Result<HttpFetcher> {
        let fd: FetcherData = persistence::rehydrate(data)?;
        let mut fetcher = self.build();

        // 重新校验扩展字段
        if let Some(req) = &meta.req {
            ReqExtra::from_extra(req.extra.as_ref())?;
        }
        if let Some(opts) = &meta.opts {
            OptsExtra::from_extra(opts.extra.as_ref())?;
        }

        fetcher.meta = meta;
        if !fd.chunks.is_empty() {
            fetcher.chunks = std::sync::Arc::new(fd.chunks);
        }
        Ok(fetcher)
    }
}
