// src/constants.rs

use std::time::Duration;

pub const UI_WIDTH: usize = 88;
pub const TITLE_TRUNCATE_LENGTH: usize = 60;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = concat!(clap::crate_name!(), ".log");
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const DEFAULT_SAVE_DIR: &str = "downloads";
pub const DEFAULT_AUDIO_FORMAT: &str = "mp3";
pub const DEFAULT_AUDIO_QUALITY: &str = "0";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

/// 历史记录 (archive) 的默认位置，相对于输出目录
pub const ARCHIVE_DIR_NAME: &str = "_logs";
pub const ARCHIVE_FILE_NAME: &str = "archive.txt";
/// 运行结束后清理的中间文件扩展名
pub const LEFTOVER_EXTENSIONS: &[&str] = &["part", "ytdl", "webp", "temp", "tmp"];

pub mod executor {
    use super::Duration;

    /// 每一级终止信号之后等待进程退出的时间
    pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);
    /// 没有新输出时检查取消标志的间隔
    pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
    /// 失败时保留用于诊断的输出行数
    pub const DEFAULT_TAIL_LINES: usize = 30;
    pub const LINE_CHANNEL_CAPACITY: usize = 256;
    /// 运行前 `--version` 检查的超时
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
}

pub mod ytdlp {
    /// 通过 --progress-template 注入的稳定进度标记
    pub const PROGRESS_MARKER: &str = "AUDIODL_PROGRESS:";
    pub const PROGRESS_TEMPLATE: &str = "download:AUDIODL_PROGRESS:%(progress._percent_str)s";
    /// 通过 --print 输出最终文件路径时使用的前缀
    pub const FILE_MARKER: &str = "FILE:";
    pub const PRINT_FINAL_PATH: &str = "after_move:FILE:%(filepath)s";
    pub const OUTPUT_TEMPLATE: &str = "%(title).120s.%(ext)s";
    pub const TRIM_FILENAMES: &str = "180";
    pub const ARTIST_TITLE_PATTERN: &str = r"title:(?P<artist>.+?)\s*-\s*(?P<title>.+)";
    pub const NON_LATIN_PATTERN: &str = r"[^\x00-\x7F\u00C0-\u024F\u1E00-\u1EFF]+";
    pub const THUMBNAIL_ARGS: &str = "ThumbnailsConvertor+ffmpeg_o:-vf scale=500:500 -q:v 3";
    pub const LOUDNORM_ARGS: &str = "ExtractAudio+ffmpeg_o:-af loudnorm";
    pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";
}

pub mod providers {
    pub const YOUTUBE: &str = "youtube";
    pub const SPOTIFY: &str = "spotify";
    pub const APPLE_MUSIC: &str = "apple_music";
}

pub const HELP_PROVIDERS_GUIDE: &str = r#"
- youtube      YouTube / YouTube Music 的视频或播放列表链接，由 yt-dlp 下载。
- spotify      只识别链接。Spotify 不提供合法的直接下载途径。
- apple_music  只识别链接。Apple Music 不提供合法的直接下载途径。

可以通过 --provider <ID> 强制指定提供者。"#;
