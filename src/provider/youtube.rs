// src/provider/youtube.rs

use super::{Provider, command};
use crate::{
    constants::{self, providers, ytdlp},
    error::{AppError, AppResult},
    executor::{JobEnvironment, JobExecutor, JobResult, probe},
    models::{
        Collection, DownloadOptions, DownloadResult, DownloadSettings, ItemWarning, MediaItem,
        Phase, ProgressEvent, ProgressSink, ProviderRef, Track,
    },
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::PathBuf, process::Stdio, sync::OnceLock};
use tokio::process::Command;
use url::Url;

const HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

/// `yt-dlp -J --flat-playlist` 输出中用到的字段
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<YtDlpThumbnail>>,
    artist: Option<String>,
    album: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    playlist_count: Option<u64>,
    ie_key: Option<String>,
    extractor_key: Option<String>,
    /// 不可用的条目在 JSON 中可能是 null
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: Option<String>,
}

impl YtDlpInfo {
    fn is_collection(&self) -> bool {
        self.entries.is_some()
            || matches!(self.kind.as_deref(), Some("playlist") | Some("multi_video"))
    }

    fn is_url_reference(&self) -> bool {
        matches!(self.kind.as_deref(), Some("url") | Some("url_transparent"))
    }

    /// 可以交给下载程序的页面地址
    fn page_url(&self) -> Option<Url> {
        let mut candidates: Vec<&str> = Vec::new();
        candidates.extend(self.webpage_url.as_deref());
        if self.is_url_reference() {
            candidates.extend(self.url.as_deref());
        }
        candidates.extend(self.original_url.as_deref());

        candidates
            .into_iter()
            .find_map(entry_url)
            .or_else(|| self.id.as_deref().and_then(watch_url))
    }

    fn thumbnail_url(&self) -> Option<Url> {
        self.thumbnail
            .as_deref()
            .or_else(|| {
                self.thumbnails
                    .iter()
                    .flatten()
                    .rev()
                    .find_map(|t| t.url.as_deref())
            })
            .and_then(|raw| Url::parse(raw).ok())
    }

    fn meta(&self) -> BTreeMap<String, Value> {
        let mut meta = BTreeMap::new();
        let pairs = [
            ("id", &self.id),
            ("uploader", &self.uploader),
            ("channel", &self.channel),
            ("extractor", &self.extractor_key),
            ("ie_key", &self.ie_key),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                meta.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        meta
    }
}

/// 完整的 http(s) 地址原样使用; 裸 ID 重建为观看页地址
fn entry_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(_) => None,
        Err(_) => watch_url(raw),
    }
}

fn watch_url(id: &str) -> Option<Url> {
    let id = id.trim();
    let is_bare_id = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !is_bare_id {
        return None;
    }
    Url::parse(&format!("{}{}", ytdlp::WATCH_URL_PREFIX, id)).ok()
}

fn convert_info(info: YtDlpInfo, source: &str, provider: &ProviderRef) -> MediaItem {
    let title = info
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| info.id.clone())
        .unwrap_or_else(|| source.to_string());
    let url = info.page_url();
    let thumbnail = info.thumbnail_url();
    let meta = info.meta();

    if info.is_collection() {
        let entries: Vec<MediaItem> = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .map(|entry| {
                let entry_source = entry
                    .page_url()
                    .map(String::from)
                    .or_else(|| entry.id.clone())
                    .unwrap_or_default();
                convert_info(entry, &entry_source, provider)
            })
            .collect();
        return MediaItem::Collection(Collection {
            provider: provider.clone(),
            title,
            source: source.to_string(),
            url,
            thumbnail,
            total: info.playlist_count.or(Some(entries.len() as u64)),
            entries,
            meta,
        });
    }

    let mut track = Track::new(provider.clone(), title, source).with_url(url);
    track.duration_secs = info
        .duration
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.round() as u64);
    track.thumbnail = thumbnail;
    track.artist = info.artist.or(info.uploader).or(info.channel);
    track.album = info.album;
    track.meta = meta;
    MediaItem::Track(track)
}

/// 解析 JSON 文档; 列表中的条目数量会写入日志
fn parse_resolved(stdout: &[u8], reference: &str, provider: &ProviderRef) -> serde_json::Result<MediaItem> {
    let info: YtDlpInfo = serde_json::from_slice(stdout)?;
    let item = convert_info(info, reference, provider);
    if let MediaItem::Collection(c) = &item {
        debug!("解析得到集合 '{}'，共 {} 个条目", c.title, c.entries.len());
    }
    Ok(item)
}

fn last_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// 把执行器的结果转换为下载结果; 失败的退出状态成为条目级错误
fn lift_job_result(
    provider_id: &str,
    track: &Track,
    options: &DownloadOptions,
    job: JobResult,
) -> AppResult<DownloadResult> {
    let mut result = DownloadResult {
        provider_id: provider_id.to_string(),
        item_title: track.title.clone(),
        files: job.output_paths.clone(),
        warnings: Vec::new(),
        cancelled: false,
    };

    if job.cancelled {
        result.cancelled = true;
        result.warnings.push(ItemWarning::Cancelled);
        return Ok(result);
    }

    if !job.success() {
        let mut tail = job.tail;
        if job.timed_out {
            tail.push("(长时间没有输出，已被终止)".to_string());
        }
        return Err(AppError::ItemFailed {
            reference: track.download_source().to_string(),
            provider_id: provider_id.to_string(),
            exit_code: job.exit_code,
            tail,
        });
    }

    if job.already_present && !options.overwrite {
        result.warnings.push(ItemWarning::AlreadyDownloaded);
    }
    Ok(result)
}

/// 通过 yt-dlp 处理 YouTube 与 YouTube Music
#[derive(Debug, Clone)]
pub struct YouTubeProvider {
    tool: PathBuf,
    cookies: Option<PathBuf>,
    executor: JobExecutor,
    /// 检查通过后记录的 yt-dlp 版本，同一进程内不再重复检查
    tool_version: OnceLock<String>,
}

impl YouTubeProvider {
    pub fn new(tool: impl Into<PathBuf>, executor: JobExecutor) -> Self {
        Self {
            tool: tool.into(),
            cookies: None,
            executor,
            tool_version: OnceLock::new(),
        }
    }

    /// 解析阶段使用的 cookies 文件; 下载阶段使用 `DownloadOptions` 中的设置
    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    fn provider_ref(&self) -> ProviderRef {
        ProviderRef::new(self.id(), self.display_name())
    }
}

#[async_trait]
impl Provider for YouTubeProvider {
    fn id(&self) -> &str {
        providers::YOUTUBE
    }

    fn display_name(&self) -> &str {
        "YouTube"
    }

    fn can_handle(&self, reference: &str) -> bool {
        let Ok(url) = Url::parse(reference.trim()) else {
            return false;
        };
        matches!(url.scheme(), "http" | "https")
            && url
                .host_str()
                .is_some_and(|host| HOSTS.contains(&host.to_ascii_lowercase().as_str()))
    }

    async fn check_environment(&self, settings: &DownloadSettings) -> AppResult<()> {
        if self.tool_version.get().is_none() {
            let version = probe::probe_version("yt-dlp", &self.tool, "--version").await?;
            let _ = self.tool_version.set(version);
        }

        // --extract-audio 即使只是复制音频流也要调用 ffmpeg
        let ffmpeg = probe::ffmpeg_program(settings.ffmpeg_path.as_deref());
        probe::probe_version("ffmpeg", &ffmpeg, "-version").await?;
        Ok(())
    }

    async fn resolve(&self, reference: &str, progress: &ProgressSink) -> AppResult<MediaItem> {
        let reference = reference.trim();
        progress.emit(ProgressEvent::new(self.id(), Phase::Resolve, "正在解析链接…"));

        let job = command::build_resolve_command(&self.tool, reference, self.cookies.as_deref());
        debug!("执行解析命令: {}", job);
        let output = Command::new(&job.program)
            .args(&job.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AppError::Execution {
                program: job.program.display().to_string(),
                source,
            })?;

        let provider = self.provider_ref();
        match parse_resolved(&output.stdout, reference, &provider) {
            Ok(item) => {
                if !output.status.success() {
                    // 播放列表中部分条目不可用时 yt-dlp 仍会输出完整的 JSON
                    warn!("解析命令以 {} 退出，但输出了有效的 JSON，继续使用", output.status);
                }
                let summary = match &item {
                    MediaItem::Track(t) => format!("解析完成: {}", t.title),
                    MediaItem::Collection(c) => {
                        format!("解析完成: {} ({} 个条目)", c.title, c.entries.len())
                    }
                };
                info!("[{}] {}", self.id(), summary);
                progress.emit(ProgressEvent::new(self.id(), Phase::Resolve, summary));
                Ok(item)
            }
            Err(e) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let mut detail = format!("退出状态 {}，无法读取元数据 ({})", output.status, e);
                let tail = last_lines(&stderr, constants::executor::DEFAULT_TAIL_LINES);
                if !tail.is_empty() {
                    detail.push_str("\n\n");
                    detail.push_str(&tail.join("\n"));
                }
                Err(AppError::Resolution {
                    reference: reference.to_string(),
                    provider_id: self.id().to_string(),
                    detail,
                })
            }
        }
    }

    async fn download(
        &self,
        track: &Track,
        options: &DownloadOptions,
        progress: &ProgressSink,
    ) -> AppResult<DownloadResult> {
        let command = command::build_download_command(&self.tool, track.download_source(), options);
        let environment = JobEnvironment {
            working_dir: None,
            env: vec![("PYTHONIOENCODING".to_string(), "utf-8".to_string())],
        };
        let job = self
            .executor
            .run(&command, &environment, &options.cancel, self.id(), progress)
            .await?;
        lift_job_result(self.id(), track, options, job)
    }
}
