// 外部协作者入口
//
// Fetcher 不直接持有全局配置、文件系统和代理策略，统一经由 Controller
// 获取，便于宿主程序替换实现。

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::base::ProxyConfig;
use crate::config::HttpConfig;

/// 下载控制器
///
/// 提供三类能力：配置获取、目标文件创建（预分配）、代理解析。
#[derive(Debug, Clone, Default)]
pub struct Controller {
    config: HttpConfig,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置创建控制器
    pub fn with_config(config: HttpConfig) -> Self {
        Self { config }
    }

    /// 获取 HTTP 下载配置
    pub fn get_config(&self) -> HttpConfig {
        self.config.clone()
    }

    /// 创建目标文件并预分配空间
    ///
    /// size 为 0（总大小未知）时只创建不预分配。
    /// 返回的标准库句柄供各分片按绝对偏移写入。
    pub async fn touch(&self, path: &Path, size: u64) -> Result<std::fs::File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("创建父目录失败")?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .await
            .context("创建文件失败")?;
        if size > 0 {
            file.set_len(size).await.context("预分配文件空间失败")?;
        }

        info!("文件准备完成: {:?}, 大小: {} bytes", path, size);
        Ok(file.into_std().await)
    }

    /// 解析请求级代理配置为 reqwest 代理
    ///
    /// 请求未配置代理时返回 None（直连）。
    pub fn get_proxy(&self, proxy: Option<&ProxyConfig>) -> Result<Option<reqwest::Proxy>> {
        let Some(cfg) = proxy else {
            return Ok(None);
        };

        let url = cfg.to_url();
        debug!("使用代理: {}", url);
        let mut p = reqwest::Proxy::all(&url).with_context(|| format!("无效的代理地址: {}", url))?;
        if let Some(usr) = &cfg.usr {
            p = p.basic_auth(usr, cfg.pwd.as_deref().unwrap_or(""));
        }
        Ok(Some(p))
    }
}
