// 分片模型与切分
//
// 每个分片是目标资源上一段双闭区间 [begin, end]，由一个 worker 独占下载。
// 进度字段用原子量承载：worker 写自己的分片，progress/快照从任意任务读，
// 读到的旧值只影响展示，不影响正确性。

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::info;

use crate::base::Resource;

/// 分片信息
///
/// 持久化时只保留 begin/end/downloaded，failed 与 retry_times
/// 是单次运行内的瞬态标记，恢复后归零。
#[derive(Debug, Serialize, Deserialize)]
pub struct Chunk {
    /// 起始偏移（含）
    pub begin: u64,
    /// 结束偏移（含）
    pub end: u64,
    /// 已下载字节数
    #[serde(default)]
    downloaded: AtomicU64,
    /// 最近一次尝试是否失败
    #[serde(skip)]
    failed: AtomicBool,
    /// 全局失败升级时的重试计数
    #[serde(skip)]
    retry_times: AtomicU32,
}

impl Chunk {
    pub fn new(begin: u64, end: u64) -> Self {
        Self {
            begin,
            end,
            downloaded: AtomicU64::new(0),
            failed: AtomicBool::new(false),
            retry_times: AtomicU32::new(0),
        }
    }

    /// 分片总大小
    pub fn size(&self) -> u64 {
        self.end - self.begin + 1
    }

    /// 已下载字节数
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn set_downloaded(&self, n: u64) {
        self.downloaded.store(n, Ordering::Relaxed);
    }

    pub fn add_downloaded(&self, n: u64) {
        self.downloaded.fetch_add(n, Ordering::Relaxed);
    }

    /// 剩余待下载字节数（仅 Range 模式有意义）
    pub fn remain(&self) -> u64 {
        self.size().saturating_sub(self.downloaded())
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn set_failed(&self, failed: bool) {
        self.failed.store(failed, Ordering::Relaxed);
    }

    pub fn retry_times(&self) -> u32 {
        self.retry_times.load(Ordering::Relaxed)
    }

    pub fn bump_retry(&self) {
        self.retry_times.fetch_add(1, Ordering::Relaxed);
    }

    /// 重置瞬态标记（worker 启动时调用）
    pub fn reset_transient(&self) {
        self.failed.store(false, Ordering::Relaxed);
        self.retry_times.store(0, Ordering::Relaxed);
    }
}

/// 是否可以按 Range 分片下载
///
/// 服务器声明支持 Range 但总大小未知（Content-Range 总长为 *）时，
/// 没有可切分的字节空间，退化为单连接顺序下载。
pub fn range_mode(res: &Resource) -> bool {
    res.range && res.size > 0
}

/// 把资源切分为待下载的分片
///
/// Range 模式下切出 connections 个连续分片，平均分配，余数并入最后
/// 一个分片；资源小于连接数时压缩连接数，保证每个分片至少 1 字节。
/// 非 Range 模式只有一个 [0, 0] 占位分片，表示从头顺序写入。
pub fn split_chunks(res: &Resource, connections: usize) -> Vec<Chunk> {
    if !range_mode(res) {
        // 只支持单连接下载
        return vec![Chunk::new(0, 0)];
    }

    let connections = (connections as u64).min(res.size).max(1);
    let chunk_size = res.size / connections;
    let mut chunks = Vec::with_capacity(connections as usize);
    for i in 0..connections {
        let begin = chunk_size * i;
        let end = if i == connections - 1 {
            // 最后一个分片兜住整个文件
            res.size - 1
        } else {
            begin + chunk_size - 1
        };
        chunks.push(Chunk::new(begin, end));
    }
    info!(
        "资源切分完成: 大小={} bytes, 分片数量={}",
        res.size,
        chunks.len()
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::FileInfo;

    fn resource(range: bool, size: u64) -> Resource {
        Resource {
            range,
            size,
            file: FileInfo::default(),
        }
    }

    #[test]
    fn test_chunk_accounting() {
        let chunk = Chunk::new(2500, 4999);
        assert_eq!(chunk.size(), 2500);
        assert_eq!(chunk.remain(), 2500);

        chunk.add_downloaded(1000);
        assert_eq!(chunk.downloaded(), 1000);
        assert_eq!(chunk.remain(), 1500);

        chunk.add_downloaded(1500);
        assert_eq!(chunk.remain(), 0);
    }

    #[test]
    fn test_split_even() {
        let chunks = split_chunks(&resource(true, 10000), 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!((chunks[0].begin, chunks[0].end), (0, 2499));
        assert_eq!((chunks[1].begin, chunks[1].end), (2500, 4999));
        assert_eq!((chunks[2].begin, chunks[2].end), (5000, 7499));
        assert_eq!((chunks[3].begin, chunks[3].end), (7500, 9999));
    }

    #[test]
    fn test_split_remainder_goes_last() {
        let chunks = split_chunks(&resource(true, 100), 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!((chunks[0].begin, chunks[0].end), (0, 32));
        assert_eq!((chunks[1].begin, chunks[1].end), (33, 65));
        assert_eq!((chunks[2].begin, chunks[2].end), (66, 99));

        // 分片两两相接，并集覆盖 [0, size-1]
        let total: u64 = chunks.iter().map(|c| c.size()).sum();
        assert_eq!(total, 100);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].begin);
        }
    }

    #[test]
    fn test_split_tiny_resource_clamps_connections() {
        let chunks = split_chunks(&resource(true, 3), 16);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.begin <= c.end);
            assert_eq!(c.size(), 1);
        }
    }

    #[test]
    fn test_split_no_range() {
        let chunks = split_chunks(&resource(false, 5000), 4);
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].begin, chunks[0].end), (0, 0));
    }

    #[test]
    fn test_split_range_unknown_size() {
        // 支持 Range 但总大小未知，退化为单连接
        let chunks = split_chunks(&resource(true, 0), 4);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_persist_shape() {
        let chunk = Chunk::new(0, 99);
        chunk.add_downloaded(40);
        chunk.set_failed(true);
        chunk.bump_retry();

        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["begin"], 0);
        assert_eq!(json["end"], 99);
        assert_eq!(json["downloaded"], 40);
        // 瞬态标记不持久化
        assert!(json.get("failed").is_none());
        assert!(json.get("retry_times").is_none());

        let back: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(back.downloaded(), 40);
        assert!(!back.is_failed());
        assert_eq!(back.retry_times(), 0);
    }
}
