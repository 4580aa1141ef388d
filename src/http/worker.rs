// 分片下载 worker
//
// 每个分片一个任务，循环发起 Range 请求并把响应流写到文件的绝对偏移，
// 失败后退避重试，直到分片完成、被取消或全局失败升级触顶。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::base::Request;
use crate::config::HttpConfig;
use crate::controller::Controller;
use crate::http::chunk::Chunk;
use crate::http::request::{build_client, build_request};
use crate::http::types::{ReqExtra, RequestError};

/// 空闲读超时：两次成功读取之间允许的最长间隔
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// 失败重试前的退避时长
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// 读缓冲大小
const BUF_SIZE: usize = 8192;

/// 全局失败时每个分片允许的重试轮数
const MAX_RETRY_ROUNDS: u32 = 3;

/// 一次传输的共享上下文，worker 与协调任务共用
pub(crate) struct FetchContext {
    pub req: Request,
    pub req_extra: ReqExtra,
    pub config: HttpConfig,
    pub ctl: Arc<Controller>,
    /// 是否按 Range 分片下载（服务器支持且总大小已知）
    pub range: bool,
    pub chunks: Arc<Vec<Chunk>>,
    pub file: Arc<std::fs::File>,
    /// 服务器报告的修改时间，下载完成后可回写到文件
    pub ctime: Option<DateTime<Utc>>,
}

/// 取消标记，用于与普通传输错误区分
#[derive(Debug)]
pub(crate) struct Canceled;

impl std::fmt::Display for Canceled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "下载已取消")
    }
}

impl std::error::Error for Canceled {}

pub(crate) fn is_canceled(err: &anyhow::Error) -> bool {
    err.is::<Canceled>()
}

/// 下载单个分片直到终态
///
/// 返回 Ok 表示分片完成；Err 要么是取消标记，要么是重试耗尽后的
/// 最后一个错误。瞬态失败在循环内部消化，不向上传播。
pub(crate) async fn fetch_chunk(
    ctx: Arc<FetchContext>,
    index: usize,
    token: CancellationToken,
) -> Result<()> {
    let chunk = &ctx.chunks[index];
    chunk.reset_transient();

    let client = build_client(&ctx.ctl, &ctx.req)?;
    let mut buf = vec![0u8; BUF_SIZE];
    let mut last_err: Option<anyhow::Error> = None;

    loop {
        if token.is_cancelled() {
            return Err(anyhow::Error::new(Canceled));
        }
        // 分片已完成
        if ctx.range && chunk.remain() == 0 {
            debug!("分片 #{} 已无剩余字节", index);
            return Ok(());
        }
        // 全局失败检测：所有分片同时处于失败态时，限制整体重试轮数。
        // 扫描允许读到旧值，误判只多等一轮退避。
        if chunk.is_failed() && ctx.chunks.iter().all(|c| c.is_failed()) {
            if chunk.retry_times() >= MAX_RETRY_ROUNDS {
                warn!("分片 #{} 重试轮数耗尽，放弃", index);
                return Err(last_err.unwrap_or_else(|| anyhow!("分片 #{} 重试轮数耗尽", index)));
            }
            chunk.bump_retry();
        }

        let result = tokio::select! {
            _ = token.cancelled() => return Err(anyhow::Error::new(Canceled)),
            r = attempt_once(&ctx, index, &client, &mut buf) => r,
        };
        match result {
            Ok(()) => {
                debug!("分片 #{} 下载完成，共 {} bytes", index, chunk.downloaded());
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "分片 #{} 本次尝试失败: {:#}，{} 秒后重试",
                    index,
                    e,
                    RETRY_DELAY.as_secs()
                );
                chunk.set_failed(true);
                last_err = Some(e);
                tokio::select! {
                    _ = token.cancelled() => return Err(anyhow::Error::new(Canceled)),
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }
}

/// 单次请求-流式写入尝试
async fn attempt_once(
    ctx: &FetchContext,
    index: usize,
    client: &Client,
    buf: &mut [u8],
) -> Result<()> {
    let chunk = &ctx.chunks[index];

    let mut req = build_request(client, &ctx.req, &ctx.req_extra, &ctx.config)?;
    if ctx.range {
        let range = format!("bytes={}-{}", chunk.begin + chunk.downloaded(), chunk.end);
        req.headers_mut().insert(
            header::RANGE,
            HeaderValue::from_str(&range).context("构造 Range 头失败")?,
        );
        debug!("分片 #{} 发起请求: Range: {}", index, range);
    } else {
        // 非 Range 流无法续传，每次尝试都从偏移 0 重新开始
        chunk.set_downloaded(0);
    }

    let resp = client.execute(req).await.context("发送下载请求失败")?;
    let status = resp.status();
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(anyhow::Error::new(RequestError::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
        )));
    }
    chunk.set_failed(false);

    let stream = resp.bytes_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    loop {
        let read = match tokio::time::timeout(READ_TIMEOUT, reader.read(buf)).await {
            Ok(r) => r.context("读取响应数据失败")?,
            Err(_) => anyhow::bail!("读取响应数据超时（{}s 内无数据）", READ_TIMEOUT.as_secs()),
        };
        if read == 0 {
            // 流结束
            return Ok(());
        }

        let mut n = read;
        let mut finished = false;
        if ctx.range {
            // 服务器多给的字节直接丢弃，防止越界写
            let remain = chunk.remain();
            if remain < n as u64 {
                n = remain as usize;
                finished = true;
            }
        }
        write_at(&ctx.file, &buf[..n], chunk.begin + chunk.downloaded())
            .context("写入文件失败")?;
        chunk.add_downloaded(n as u64);
        if finished {
            return Ok(());
        }
    }
}

/// 在绝对偏移处写入整个缓冲区
///
/// 各分片的写入区间互不重叠，按偏移写无需任何锁。
#[cfg(unix)]
pub(crate) fn write_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
pub(crate) fn write_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        written += n;
    }
    Ok(())
}
