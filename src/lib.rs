// Fastget 核心库
// 多连接断点续传 HTTP 下载引擎

// 基础数据模型
pub mod base;

// 配置管理模块
pub mod config;

// 外部协作者入口
pub mod controller;

// Fetcher 元信息与公共类型
pub mod fetcher;

// HTTP 协议实现
pub mod http;

// 日志系统
pub mod logging;

// 任务持久化
pub mod persistence;

// 导出常用类型
pub use base::{FileInfo, Options, ProxyConfig, Request, Resource};
pub use config::{HttpConfig, LogConfig};
pub use controller::Controller;
pub use fetcher::{FetcherMeta, FilterType, Progress, SchemeFilter};
pub use http::{HttpFetcher, HttpFetcherManager, HttpStats, OptsExtra, ReqExtra, RequestError};
pub use persistence::{FetcherData, TaskRecord};
