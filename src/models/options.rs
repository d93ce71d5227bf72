// src/models/options.rs

use super::progress::CancellationHandle;
use crate::{constants, utils};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// 一次运行的可序列化设置，由配置层和命令行合并得到
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSettings {
    pub output_dir: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
    pub overwrite: bool,
    pub cookies_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub use_archive: bool,
    /// 为 None 且启用历史记录时，使用输出目录下的默认位置
    pub archive_path: Option<PathBuf>,
    pub loudnorm: bool,
    pub embed_thumbnail: bool,
    pub parse_metadata_artist_title: bool,
    pub strip_emojis: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(constants::DEFAULT_SAVE_DIR),
            audio_format: constants::DEFAULT_AUDIO_FORMAT.to_string(),
            audio_quality: constants::DEFAULT_AUDIO_QUALITY.to_string(),
            overwrite: false,
            cookies_path: None,
            ffmpeg_path: None,
            tmp_dir: None,
            use_archive: true,
            archive_path: None,
            loudnorm: false,
            embed_thumbnail: false,
            parse_metadata_artist_title: true,
            strip_emojis: false,
        }
    }
}

/// 每次运行构建一次、按值传给每个条目的下载选项快照。
/// 提供者遇到不支持的字段时应当忽略，而不是报错。
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
    pub overwrite: bool,
    pub cookies_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub use_archive: bool,
    /// 已解析的最终路径; 未启用或无法创建时为 None
    pub archive_path: Option<PathBuf>,
    pub loudnorm: bool,
    pub embed_thumbnail: bool,
    pub parse_metadata_artist_title: bool,
    pub strip_emojis: bool,
    pub cancel: CancellationHandle,
}

impl DownloadOptions {
    pub fn from_settings(
        settings: &DownloadSettings,
        archive_path: Option<PathBuf>,
        cancel: CancellationHandle,
    ) -> Self {
        Self {
            output_dir: settings.output_dir.clone(),
            audio_format: settings.audio_format.trim().to_lowercase(),
            audio_quality: settings.audio_quality.trim().to_string(),
            overwrite: settings.overwrite,
            cookies_path: settings.cookies_path.clone(),
            ffmpeg_path: settings.ffmpeg_path.clone(),
            tmp_dir: settings.tmp_dir.clone(),
            use_archive: settings.use_archive && archive_path.is_some(),
            archive_path,
            loudnorm: settings.loudnorm,
            embed_thumbnail: settings.embed_thumbnail,
            parse_metadata_artist_title: settings.parse_metadata_artist_title,
            strip_emojis: settings.strip_emojis,
            cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemWarning {
    AlreadyDownloaded,
    Cancelled,
    Failed(String),
}

impl fmt::Display for ItemWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemWarning::AlreadyDownloaded => f.write_str("已下载过，跳过 (已存在或已记录在历史中)"),
            ItemWarning::Cancelled => f.write_str("下载已被用户取消"),
            ItemWarning::Failed(reason) => write!(f, "下载失败: {}", reason),
        }
    }
}

/// 单个曲目的下载结果
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    pub provider_id: String,
    pub item_title: String,
    pub files: Vec<PathBuf>,
    pub warnings: Vec<ItemWarning>,
    pub cancelled: bool,
}

impl DownloadResult {
    pub fn failed(provider_id: &str, item_title: &str, reason: String) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            item_title: item_title.to_string(),
            files: Vec::new(),
            warnings: vec![ItemWarning::Failed(reason)],
            cancelled: false,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.warnings.iter().any(|w| matches!(w, ItemWarning::Failed(_)))
    }

    pub fn is_already_downloaded(&self) -> bool {
        self.warnings.contains(&ItemWarning::AlreadyDownloaded)
    }

    pub fn display_title(&self) -> String {
        utils::truncate_text(&self.item_title, constants::TITLE_TRUNCATE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_normalize_format_and_disable_archive_without_path() {
        let settings = DownloadSettings {
            audio_format: " MP3 ".into(),
            use_archive: true,
            ..Default::default()
        };
        let options = DownloadOptions::from_settings(&settings, None, CancellationHandle::new());
        assert_eq!(options.audio_format, "mp3");
        assert!(!options.use_archive);

        let options = DownloadOptions::from_settings(
            &settings,
            Some(PathBuf::from("out/_logs/archive.txt")),
            CancellationHandle::new(),
        );
        assert!(options.use_archive);
    }

    #[test]
    fn test_result_classification() {
        let failed = DownloadResult::failed("youtube", "x", "boom".into());
        assert!(failed.is_failure());
        assert!(!failed.is_already_downloaded());
        assert!(failed.files.is_empty());
    }
}
