// Fetcher 元信息与管理器公共类型

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::base::{Options, Request, Resource};

/// 下载进度：各文件已下载字节数（单文件下载只有一个元素）
pub type Progress = Vec<u64>;

/// Fetcher 元信息
///
/// 请求、资源、选项随生命周期逐步填充：Resolve 填 res，Create 填 opts。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetcherMeta {
    /// 下载请求
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<Request>,
    /// 探测到的资源
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<Resource>,
    /// 下载选项
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<Options>,
}

impl FetcherMeta {
    /// 单文件下载的目标路径：选项目录 + （选项文件名 或 资源文件名）
    pub fn single_filepath(&self) -> Result<PathBuf> {
        let opts = self.opts.as_ref().ok_or_else(|| anyhow!("下载选项未设置"))?;
        let res = self.res.as_ref().ok_or_else(|| anyhow!("资源尚未解析"))?;
        let name = if !opts.name.is_empty() {
            &opts.name
        } else {
            &res.file.name
        };
        if name.is_empty() {
            return Err(anyhow!("无法确定目标文件名"));
        }
        Ok(PathBuf::from(&opts.path).join(name))
    }
}

/// 过滤器匹配维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// 按 URL scheme 匹配
    Url,
}

/// 协议过滤器：管理器注册时声明自己处理哪些 URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeFilter {
    pub filter_type: FilterType,
    pub pattern: String,
}
