// src/config.rs

pub mod env;
pub mod file;

use self::file::load_or_create_external_config;
use crate::{
    cli::Cli,
    constants,
    error::AppResult,
    executor::ExecutorSettings,
    models::DownloadSettings,
    utils,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub grace_secs: u64,
    pub tail_lines: usize,
    /// 长时间无输出时终止下载程序; 为空表示不限制
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            grace_secs: constants::executor::DEFAULT_GRACE.as_secs(),
            tail_lines: constants::executor::DEFAULT_TAIL_LINES,
            idle_timeout_secs: None,
        }
    }
}

/// `~/.audio-dl/config.json` 的内容。路径以字符串保存，读取时再展开 `~` 和环境变量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub download_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<String>,
    pub yt_dlp_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_path: Option<String>,
    pub audio_format: String,
    pub audio_quality: String,
    pub overwrite: bool,
    pub use_archive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
    pub loudnorm: bool,
    pub embed_thumbnail: bool,
    pub parse_metadata: bool,
    pub strip_emojis: bool,
    pub executor: ExecutorConfig,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        let defaults = DownloadSettings::default();
        Self {
            download_dir: constants::DEFAULT_SAVE_DIR.to_string(),
            tmp_dir: None,
            yt_dlp_path: constants::DEFAULT_YT_DLP.to_string(),
            ffmpeg_path: None,
            cookies_path: None,
            audio_format: defaults.audio_format,
            audio_quality: defaults.audio_quality,
            overwrite: defaults.overwrite,
            use_archive: defaults.use_archive,
            archive_path: None,
            loudnorm: defaults.loudnorm,
            embed_thumbnail: defaults.embed_thumbnail,
            parse_metadata: defaults.parse_metadata_artist_title,
            strip_emojis: defaults.strip_emojis,
            executor: ExecutorConfig::default(),
        }
    }
}

/// 合并完成的运行配置: 命令行 > 环境变量 > 配置文件 > 默认值
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub download: DownloadSettings,
    pub yt_dlp_path: PathBuf,
    pub executor: ExecutorSettings,
    /// 强制使用的提供者
    pub provider_id: Option<String>,
}

fn non_empty_path(raw: Option<&str>) -> Option<PathBuf> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(utils::expand_path)
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let mut external = load_or_create_external_config(args.config.as_deref())?;
        env::apply_env_overrides(&mut external, |key| std::env::var(key).ok());
        Ok(Self::from_sources(external, args))
    }

    pub fn from_sources(external: ExternalConfig, args: &Cli) -> Self {
        let mut config = Self::from_external(external);
        config.apply_cli(args);
        config
    }

    pub fn from_external(external: ExternalConfig) -> Self {
        let download = DownloadSettings {
            output_dir: utils::expand_path(&external.download_dir),
            audio_format: external.audio_format.trim().to_lowercase(),
            audio_quality: external.audio_quality.trim().to_string(),
            overwrite: external.overwrite,
            cookies_path: non_empty_path(external.cookies_path.as_deref()),
            ffmpeg_path: non_empty_path(external.ffmpeg_path.as_deref()),
            tmp_dir: non_empty_path(external.tmp_dir.as_deref()),
            use_archive: external.use_archive,
            archive_path: non_empty_path(external.archive_path.as_deref()),
            loudnorm: external.loudnorm,
            embed_thumbnail: external.embed_thumbnail,
            parse_metadata_artist_title: external.parse_metadata,
            strip_emojis: external.strip_emojis,
        };
        let executor = ExecutorSettings {
            grace: Duration::from_secs(external.executor.grace_secs),
            tail_lines: external.executor.tail_lines,
            idle_timeout: external
                .executor
                .idle_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            ..ExecutorSettings::default()
        };
        Self {
            download,
            yt_dlp_path: utils::expand_path(&external.yt_dlp_path),
            executor,
            provider_id: None,
        }
    }

    fn apply_cli(&mut self, args: &Cli) {
        let d = &mut self.download;
        if let Some(output) = &args.output {
            d.output_dir = output.clone();
        }
        if let Some(format) = &args.format {
            d.audio_format = format.trim().to_lowercase();
        }
        if let Some(quality) = &args.quality {
            d.audio_quality = quality.trim().to_string();
        }
        if args.overwrite {
            d.overwrite = true;
        }
        if args.no_archive {
            d.use_archive = false;
        }
        if let Some(archive) = &args.archive {
            d.archive_path = Some(archive.clone());
        }
        if args.loudnorm {
            d.loudnorm = true;
        }
        if args.embed_thumbnail {
            d.embed_thumbnail = true;
        }
        if args.no_parse_metadata {
            d.parse_metadata_artist_title = false;
        }
        if args.strip_emojis {
            d.strip_emojis = true;
        }
        if let Some(cookies) = &args.cookies {
            d.cookies_path = Some(cookies.clone());
        }
        if let Some(ffmpeg) = &args.ffmpeg {
            d.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(tmp) = &args.tmp_dir {
            d.tmp_dir = Some(tmp.clone());
        }
        if let Some(yt_dlp) = &args.yt_dlp {
            self.yt_dlp_path = yt_dlp.clone();
        }
        if let Some(secs) = args.idle_timeout {
            self.executor.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self.provider_id = args
            .provider
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty());
    }
}

#[cfg(feature = "testing")]
impl Default for AppConfig {
    fn default() -> Self {
        Self::from_external(ExternalConfig::default())
    }
}
