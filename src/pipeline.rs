// src/pipeline.rs

//! 一次运行: 选择提供者 -> 检查环境 -> 解析 -> 展开 -> 逐个下载 -> 清理

use crate::{
    constants,
    error::AppResult,
    models::{
        CancellationHandle, DownloadOptions, DownloadResult, DownloadSettings, Phase,
        ProgressEvent, ProgressSink,
    },
    provider::{Provider, ProviderRegistry},
};
use log::{debug, info, warn};
use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// 文件系统时间戳精度有限，清理时放宽的时间窗口
const MTIME_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub source: String,
    /// 指定后跳过自动识别
    pub provider_id: Option<String>,
    pub settings: DownloadSettings,
}

impl PipelineRequest {
    pub fn new(source: impl Into<String>, settings: DownloadSettings) -> Self {
        Self {
            source: source.into(),
            provider_id: None,
            settings,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub provider_id: String,
    pub title: String,
    /// 展开后的曲目总数
    pub total: usize,
    /// 已处理条目的结果，按处理顺序; 被取消的条目不在其中
    pub results: Vec<DownloadResult>,
    pub cancelled: bool,
}

impl RunOutcome {
    pub fn completed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.is_failure() && !r.is_already_downloaded())
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_already_downloaded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }
}

pub struct Pipeline<'a> {
    registry: &'a ProviderRegistry,
    progress: ProgressSink,
    cancel: CancellationHandle,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a ProviderRegistry) -> Self {
        Self {
            registry,
            progress: ProgressSink::noop(),
            cancel: CancellationHandle::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }

    fn select_provider(&self, request: &PipelineRequest) -> AppResult<&'a dyn Provider> {
        match request.provider_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => self.registry.get(id),
            _ => self.registry.find_for_reference(&request.source),
        }
    }

    pub async fn run(&self, request: &PipelineRequest) -> AppResult<RunOutcome> {
        let settings = &request.settings;
        let started_at = SystemTime::now();
        tokio::fs::create_dir_all(&settings.output_dir).await?;

        let provider = self.select_provider(request)?;
        info!("使用提供者 '{}' 处理: {}", provider.id(), request.source);
        provider.check_environment(settings).await?;

        let item = provider.resolve(&request.source, &self.progress).await?;
        let archive_path = resolve_archive_path(settings).await;
        let options = DownloadOptions::from_settings(settings, archive_path, self.cancel.clone());

        let tracks = item.flatten_tracks();
        let total = tracks.len();
        let mut outcome = RunOutcome {
            provider_id: provider.id().to_string(),
            title: item.title().to_string(),
            total,
            results: Vec::with_capacity(total),
            cancelled: false,
        };
        if total == 0 {
            warn!("'{}' 没有可下载的曲目", request.source);
        }

        for (offset, track) in tracks.into_iter().enumerate() {
            let index = offset + 1;
            if self.cancel.is_signalled() {
                info!("已取消，剩余 {} 个条目不再处理", total - offset);
                outcome.cancelled = true;
                break;
            }

            let sink = self.progress.remapped(index, total);
            sink.emit(
                ProgressEvent::new(
                    provider.id(),
                    Phase::Download,
                    format!("[{}/{}] {}", index, total, track.title),
                )
                .with_progress(0.0),
            );

            match provider.download(track, &options, &sink).await {
                Ok(result) if result.cancelled => {
                    info!("[{}/{}] '{}' 被取消", index, total, track.title);
                    outcome.cancelled = true;
                    break;
                }
                Ok(result) => {
                    debug!("[{}/{}] '{}' 完成: {:?}", index, total, track.title, result.files);
                    outcome.results.push(result);
                }
                Err(e) if e.is_item_level() => {
                    warn!("[{}/{}] '{}' 失败: {}", index, total, track.title, e);
                    outcome
                        .results
                        .push(DownloadResult::failed(provider.id(), &track.title, e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        if outcome.cancelled {
            self.progress
                .emit(ProgressEvent::new(provider.id(), Phase::Download, "运行已取消"));
        }

        let since = started_at.checked_sub(MTIME_SLACK).unwrap_or(started_at);
        let mut removed = remove_leftovers(&settings.output_dir, since).await;
        if let Some(tmp) = &settings.tmp_dir {
            removed += remove_leftovers(tmp, since).await;
        }
        if removed > 0 {
            self.progress.emit(ProgressEvent::new(
                provider.id(),
                Phase::Postprocess,
                format!("已清理 {} 个临时文件", removed),
            ));
        }
        Ok(outcome)
    }
}

/// 显式指定的路径优先; 否则使用 `<输出目录>/_logs/archive.txt`。
/// 无法创建所在目录时不使用历史记录，而不是让整次运行失败。
async fn resolve_archive_path(settings: &DownloadSettings) -> Option<PathBuf> {
    if !settings.use_archive {
        return None;
    }
    let path = settings.archive_path.clone().unwrap_or_else(|| {
        settings
            .output_dir
            .join(constants::ARCHIVE_DIR_NAME)
            .join(constants::ARCHIVE_FILE_NAME)
    });
    match ensure_parent(&path).await {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("无法创建历史记录目录，本次不使用历史记录 ({}): {}", path.display(), e);
            None
        }
    }
}

/// 删除目录 (不递归) 中本次运行期间产生的中间文件，返回删除的数量。
/// 早于 `since` 的同类文件不属于本次运行，保持不动。
pub async fn remove_leftovers(dir: &Path, since: SystemTime) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("无法读取目录 {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_leftover = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| constants::LEFTOVER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !is_leftover {
            continue;
        }
        let recent = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta.modified().is_ok_and(|m| m >= since),
            _ => false,
        };
        if !recent {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("已删除临时文件: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("删除临时文件 {} 失败: {}", path.display(), e),
        }
    }
    if removed > 0 {
        info!("清理了 {} 中的 {} 个临时文件", dir.display(), removed);
    }
    removed
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
