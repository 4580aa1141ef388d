//! 任务持久化
//!
//! 分片进度快照为不透明 JSON 值，跨进程恢复时原样回灌；宿主也可以用
//! 这里的文件读写函数把快照连同元信息落成 `.task.json` 文件。
//!
//! ## 文件格式
//!
//! ```json
//! {
//!   "task_id": "xxx",
//!   "meta": { ... },
//!   "data": { "chunks": [ { "begin": 0, "end": 2499, "downloaded": 1000 } ] },
//!   "updated_at": 1733300000
//! }
//! ```

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::fetcher::FetcherMeta;
use crate::http::chunk::Chunk;

/// 任务文件扩展名
const TASK_EXTENSION: &str = "task.json";

/// 可持久化的 Fetcher 状态：仅分片进度
///
/// failed / retry_times 等瞬态标记不入快照，恢复后归零。
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetcherData {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

#[derive(Serialize)]
struct FetcherDataRef<'a> {
    chunks: &'a [Chunk],
}

/// 把分片进度快照为不透明 JSON 值
pub fn snapshot(chunks: &[Chunk]) -> Result<serde_json::Value> {
    serde_json::to_value(FetcherDataRef { chunks }).context("序列化分片进度失败")
}

/// 从不透明 JSON 值还原分片进度
pub fn rehydrate(value: serde_json::Value) -> Result<FetcherData> {
    serde_json::from_value(value).context("解析分片进度快照失败")
}

/// 落盘的任务记录：元信息 + 分片快照
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskRecord {
    /// 任务 ID
    pub task_id: String,
    /// Fetcher 元信息
    pub meta: FetcherMeta,
    /// 分片进度快照（不透明值）
    pub data: serde_json::Value,
    /// 最近更新时间 (Unix timestamp)
    pub updated_at: i64,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, meta: FetcherMeta, data: serde_json::Value) -> Self {
        Self {
            task_id: task_id.into(),
            meta,
            data,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// 刷新更新时间
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// 任务文件完整路径：`{dir}/{task_id}.task.json`
pub fn task_path(dir: &Path, task_id: &str) -> PathBuf {
    dir.join(format!("{}.{}", task_id, TASK_EXTENSION))
}

/// 保存任务记录
///
/// 先写临时文件再原子重命名，防止写入中断留下损坏的记录。
pub fn save_task(dir: &Path, record: &TaskRecord) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).context("创建任务目录失败")?;
    }

    let path = task_path(dir, &record.task_id);
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path).context("创建临时任务文件失败")?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record).context("序列化任务记录失败")?;
    writer.flush().context("刷新任务文件失败")?;
    drop(writer);

    fs::rename(&temp_path, &path).context("重命名任务文件失败")?;
    debug!("已保存任务记录: {:?} (task_id={})", path, record.task_id);
    Ok(())
}

/// 加载任务记录；文件不存在或解析失败返回 None
pub fn load_task(dir: &Path, task_id: &str) -> Option<TaskRecord> {
    let path = task_path(dir, task_id);
    if !path.exists() {
        return None;
    }

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            warn!("打开任务文件失败 {:?}: {}", path, e);
            return None;
        }
    };
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(record) => {
            debug!("已加载任务记录: {:?}", path);
            Some(record)
        }
        Err(e) => {
            warn!("解析任务文件失败 {:?}: {}", path, e);
            None
        }
    }
}
