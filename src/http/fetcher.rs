// HTTP Fetcher
//
// 单个资源下载的生命周期载体：
// setup -> resolve(探测) -> create(选项) -> start(切分并发下载)
//       -> wait / pause / close
//
// 恢复路径由 HttpFetcherManager::restore 重建，落在 create 之后、
// start 之前的位置上。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::base::{FileInfo, Options, Request, Resource};
use crate::config::HttpConfig;
use crate::controller::Controller;
use crate::fetcher::{FetcherMeta, Progress};
use crate::http::chunk::{range_mode, split_chunks, Chunk};
use crate::http::request::{build_client, build_request};
use crate::http::types::{HttpStats, OptsExtra, ReqExtra, RequestError};
use crate::http::worker::{fetch_chunk, is_canceled, FetchContext};

/// HTTP 下载器
pub struct HttpFetcher {
    pub(crate) ctl: Option<Arc<Controller>>,
    pub(crate) config: HttpConfig,
    pub(crate) meta: FetcherMeta,
    pub(crate) chunks: Arc<Vec<Chunk>>,

    /// 目标文件句柄；所有持有方（分片任务/协调任务/自身）都释放后关闭
    file: Option<Arc<std::fs::File>>,
    cancel: Option<CancellationToken>,
    workers: Option<TaskTracker>,

    done_tx: mpsc::Sender<Result<()>>,
    done_rx: mpsc::Receiver<Result<()>>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let (done_tx, done_rx) = mpsc::channel(1);
        Self {
            ctl: None,
            config: HttpConfig::default(),
            meta: FetcherMeta::default(),
            chunks: Arc::new(Vec::new()),
            file: None,
            cancel: None,
            workers: None,
            done_tx,
            done_rx,
        }
    }

    /// 接入控制器并拉取配置；不触碰已有的 meta（恢复场景先有 meta 后 setup）
    pub fn setup(&mut self, ctl: Arc<Controller>) {
        self.config = ctl.get_config();
        self.ctl = Some(ctl);
    }

    fn ctl(&self) -> Result<Arc<Controller>> {
        self.ctl
            .clone()
            .ok_or_else(|| anyhow!("Fetcher 未初始化，请先调用 setup"))
    }

    /// 探测资源：是否支持 Range、总大小、文件名、服务器修改时间
    ///
    /// 用一字节请求（Range: bytes=0-0）试探服务器能力，响应体立即丢弃。
    pub async fn resolve(&mut self, req: Request) -> Result<()> {
        // 先校验扩展字段格式
        let req_extra = ReqExtra::from_extra(req.extra.as_ref())?;
        self.meta.req = Some(req.clone());

        let ctl = self.ctl()?;
        let client = build_client(&ctl, &req)?;
        let mut http_req = build_request(&client, &req, &req_extra, &self.config)?;
        http_req
            .headers_mut()
            .insert(header::RANGE, HeaderValue::from_static("bytes=0-0"));

        let resp = client
            .execute(http_req)
            .await
            .context("发送探测请求失败")?;
        let status = resp.status();
        let headers = resp.headers().clone();
        drop(resp);

        let mut res = Resource::default();
        let accept_ranges = header_str(&headers, header::ACCEPT_RANGES);
        let content_range = header_str(&headers, header::CONTENT_RANGE);
        if status == StatusCode::PARTIAL_CONTENT
            || (status == StatusCode::OK
                && accept_ranges == "bytes"
                && content_range.starts_with("bytes"))
        {
            // 支持断点续传；总大小取 Content-Range 最后一个 '/' 之后的部分
            res.range = true;
            res.size = parse_content_range_total(content_range)?;
        } else if status == StatusCode::OK {
            // 不支持断点续传；Content-Length 缺失视为大小未知（chunked）
            let content_length = header_str(&headers, header::CONTENT_LENGTH);
            if !content_length.is_empty() {
                res.size = content_length
                    .parse()
                    .with_context(|| format!("解析 Content-Length 失败: {}", content_length))?;
            }
        } else {
            return Err(anyhow::Error::new(RequestError::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            )));
        }

        // Last-Modified 解析失败不致命
        let ctime = parse_last_modified(header_str(&headers, header::LAST_MODIFIED));

        // 文件名推导：Content-Disposition -> URL 路径基名 -> 主机名
        let url = Url::parse(&req.url).with_context(|| format!("解析 URL 失败: {}", req.url))?;
        let mut name =
            file_name_from_disposition(header_str(&headers, header::CONTENT_DISPOSITION))
                .unwrap_or_default();
        if name.is_empty() {
            name = file_name_from_url(&url);
        }
        if name.is_empty() || name == "/" || name == "." {
            name = url.host_str().unwrap_or("").to_string();
        }

        res.file = FileInfo {
            name,
            size: res.size,
            ctime,
        };
        info!(
            "资源解析完成: name={}, size={}, range={}",
            res.file.name, res.size, res.range
        );
        self.meta.res = Some(res);
        Ok(())
    }

    /// 固化下载选项；连接数缺省取全局配置，并兜底到 1
    pub fn create(&mut self, opts: Options) -> Result<()> {
        let mut opts = opts;
        let mut extra = OptsExtra::from_extra(opts.extra.as_ref())?;
        if extra.connections == 0 {
            extra.connections = self.config.connections;
            if extra.connections == 0 {
                extra.connections = 1;
            }
        }
        opts.extra = Some(serde_json::to_value(&extra).context("序列化下载选项扩展字段失败")?);
        self.meta.opts = Some(opts);
        Ok(())
    }

    /// 打开（或创建并预分配）目标文件，切分分片，发起并发传输
    pub async fn start(&mut self) -> Result<()> {
        let ctl = self.ctl()?;
        let req = self
            .meta
            .req
            .clone()
            .ok_or_else(|| anyhow!("请求未设置，请先调用 resolve"))?;
        let res = self
            .meta
            .res
            .clone()
            .ok_or_else(|| anyhow!("资源尚未解析，请先调用 resolve"))?;
        let path = self.meta.single_filepath()?;

        // 文件不存在则创建并预分配，已存在则读写打开（续传场景）
        let file = match tokio::fs::metadata(&path).await {
            Ok(_) => tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .await
                .with_context(|| format!("打开目标文件失败: {:?}", path))?
                .into_std()
                .await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctl.touch(&path, res.size).await?
            }
            Err(e) => return Err(e).with_context(|| format!("检查目标文件失败: {:?}", path)),
        };
        let file = Arc::new(file);

        // 启动前重新解析扩展字段，防止中途被外部改坏
        let req_extra = ReqExtra::from_extra(req.extra.as_ref())?;
        let opts_extra =
            OptsExtra::from_extra(self.meta.opts.as_ref().and_then(|o| o.extra.as_ref()))?;

        if self.chunks.is_empty() {
            self.chunks = Arc::new(split_chunks(&res, opts_extra.connections.max(1)));
        }
        info!("开始下载: {:?}, 分片数: {}", path, self.chunks.len());

        self.file = Some(file.clone());
        self.spawn_transfer(ctl, req, req_extra, &res, file);
        Ok(())
    }

    /// 发起传输：每个分片一个任务，外加一个等待汇总的协调任务
    fn spawn_transfer(
        &mut self,
        ctl: Arc<Controller>,
        req: Request,
        req_extra: ReqExtra,
        res: &Resource,
        file: Arc<std::fs::File>,
    ) {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        let ctx = Arc::new(FetchContext {
            req,
            req_extra,
            config: self.config.clone(),
            ctl,
            range: range_mode(res),
            chunks: self.chunks.clone(),
            file,
            ctime: res.file.ctime,
        });

        // 每个分片一个错误槽，worker 只写自己的槽位
        let slots: Arc<Vec<tokio::sync::Mutex<Option<anyhow::Error>>>> = Arc::new(
            (0..self.chunks.len())
                .map(|_| tokio::sync::Mutex::new(None))
                .collect(),
        );

        for index in 0..self.chunks.len() {
            let ctx = ctx.clone();
            let token = token.clone();
            let slots = slots.clone();
            tracker.spawn(async move {
                match fetch_chunk(ctx, index, token).await {
                    Ok(()) => {}
                    Err(e) if is_canceled(&e) => debug!("分片 #{} 已取消", index),
                    Err(e) => *slots[index].lock().await = Some(e),
                }
            });
        }
        tracker.close();

        let done_tx = self.done_tx.clone();
        let wait_tracker = tracker.clone();
        let wait_token = token.clone();
        tokio::spawn(async move {
            wait_tracker.wait().await;
            // 暂停路径：静默退出，不投递结果
            if wait_token.is_cancelled() {
                debug!("传输已取消，跳过结果投递");
                return;
            }

            // 按分片序扫描错误槽，第一个错误即终态
            let mut result = Ok(());
            for slot in slots.iter() {
                if let Some(e) = slot.lock().await.take() {
                    result = Err(e);
                    break;
                }
            }

            // 成功后按需回写服务器时间（尽力而为，失败忽略）
            if result.is_ok() && ctx.config.use_server_ctime {
                if let Some(ctime) = ctx.ctime {
                    let t = std::time::SystemTime::from(ctime);
                    let times = std::fs::FileTimes::new().set_accessed(t).set_modified(t);
                    let _ = ctx.file.set_times(times);
                }
            }

            match &result {
                Ok(()) => info!("下载完成"),
                Err(e) => error!("下载失败: {:#}", e),
            }
            let _ = done_tx.send(result).await;
        });

        self.cancel = Some(token);
        self.workers = Some(tracker);
    }

    /// 暂停：触发取消并等待所有分片任务退出，然后释放文件句柄
    pub async fn pause(&mut self) -> Result<()> {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            if let Some(tracker) = self.workers.take() {
                tracker.wait().await;
            }
            self.file = None;
            info!("下载已暂停");
        }
        Ok(())
    }

    /// 关闭等价于暂停
    pub async fn close(&mut self) -> Result<()> {
        self.pause().await
    }

    /// 阻塞等待传输终态（成功为 Ok；暂停不投递，恢复启动后可继续等待）
    pub async fn wait(&mut self) -> Result<()> {
        match self.done_rx.recv().await {
            Some(result) => result,
            None => Err(anyhow!("完成通知通道已关闭")),
        }
    }

    pub fn meta(&self) -> &FetcherMeta {
        &self.meta
    }

    /// 已下载总字节数（单文件下载只有一个元素）
    pub fn progress(&self) -> Progress {
        if self.chunks.is_empty() {
            return Vec::new();
        }
        vec![self.chunks.iter().map(|c| c.downloaded()).sum()]
    }

    pub fn stats(&self) -> HttpStats {
        HttpStats::default()
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// 解析 Content-Range 的总大小
///
/// 形如 `bytes 0-0/10000`，取最后一个 '/' 之后的部分；空或 `*`
/// 表示总大小未知（返回 0），其余内容解析失败视为致命错误。
fn parse_content_range_total(value: &str) -> Result<u64> {
    let total = value.rsplit('/').next().unwrap_or("");
    if total.is_empty() || total == "*" {
        return Ok(0);
    }
    total
        .parse()
        .with_context(|| format!("解析 Content-Range 总大小失败: {}", value))
}

/// RFC 1123 格式的 Last-Modified；解析失败返回 None
fn parse_last_modified(value: &str) -> Option<DateTime<Utc>> {
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// 从 Content-Disposition 的 filename 参数推导文件名
///
/// MIME encoded-word（=? 开头）先把 UTF8 归一化为 UTF-8 再解码，
/// 解码失败返回 None，交给下一级推导。
fn file_name_from_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        // 参数值允许任意 UTF-8，按字节切片前先确认字符边界；
        // 字节 9 落在多字节字符中间的参数一定不是 filename=
        let Some(prefix) = part.get(..9) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case("filename=") {
            continue;
        }
        let raw = part[9..].trim_matches('"');
        if raw.is_empty() {
            continue;
        }
        if raw.starts_with("=?") {
            let normalized = raw.replacen("UTF8", "UTF-8", 1);
            return decode_encoded_word(&normalized);
        }
        return Some(raw.to_string());
    }
    None
}

/// 解码单个 MIME encoded-word（=?charset?B|Q?payload?=）
fn decode_encoded_word(word: &str) -> Option<String> {
    let inner = word.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let charset = parts.next()?;
    let encoding = parts.next()?;
    let payload = parts.next()?;

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("us-ascii") {
        return None;
    }
    let bytes = match encoding {
        "B" | "b" => {
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, payload).ok()?
        }
        "Q" | "q" => decode_q_encoding(payload)?,
        _ => return None,
    };
    String::from_utf8(bytes).ok()
}

/// Q 编码：下划线代表空格，=XX 为十六进制字节
fn decode_q_encoding(payload: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();
    while let Some(b) = bytes.next() {
        match b {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = [bytes.next()?, bytes.next()?];
                let hex = std::str::from_utf8(&hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
            }
            _ => out.push(b),
        }
    }
    Some(out)
}

/// URL 路径基名（URL 解码后）；解码失败返回空串走下一级推导
fn file_name_from_url(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    let base = path.rsplit('/').next().unwrap_or("");
    match urlencoding::decode(base) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::new(),
    }
}
