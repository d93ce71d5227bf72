// src/provider/command.rs

//! yt-dlp 命令行的构建。相同的 (来源, 选项) 总是得到相同的命令。

use crate::{constants::ytdlp, executor::JobCommand, models::DownloadOptions};
use log::warn;
use std::path::Path;

/// 流选择与后处理方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatPlan {
    /// 直接取用已有的音频流，不转码
    StreamCopy { selector: &'static str },
    /// 需要转码到指定编码和质量
    Convert {
        selector: &'static str,
        codec: String,
        quality: String,
    },
}

const ANY_AUDIO: &str = "251/140/139/bestaudio/best";
const PREFER_M4A: &str = "140/139/bestaudio[ext=m4a]/bestaudio/best";
const PREFER_OPUS: &str = "251/bestaudio[ext=opus]/bestaudio/best";

impl FormatPlan {
    pub fn for_request(audio_format: &str, audio_quality: &str) -> Self {
        let quality = if audio_quality.trim().is_empty() {
            crate::constants::DEFAULT_AUDIO_QUALITY.to_string()
        } else {
            audio_quality.trim().to_string()
        };
        match audio_format.trim().to_lowercase().as_str() {
            "" | "best" => FormatPlan::StreamCopy { selector: ANY_AUDIO },
            "m4a" => FormatPlan::StreamCopy { selector: PREFER_M4A },
            "opus" => FormatPlan::StreamCopy { selector: PREFER_OPUS },
            other => FormatPlan::Convert {
                selector: ANY_AUDIO,
                codec: other.to_string(),
                quality,
            },
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, FormatPlan::Convert { .. })
    }

    fn push_args(&self, cmd: &mut JobCommand) {
        match self {
            FormatPlan::StreamCopy { selector } => {
                cmd.args(["-f", *selector, "--extract-audio", "--audio-format", "best"]);
            }
            FormatPlan::Convert {
                selector,
                codec,
                quality,
            } => {
                cmd.args(["-f", *selector, "--extract-audio", "--audio-format"])
                    .arg(codec.as_str())
                    .arg("--audio-quality")
                    .arg(quality.as_str());
            }
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// 单个曲目的下载命令
pub fn build_download_command(tool: &Path, source: &str, options: &DownloadOptions) -> JobCommand {
    let mut cmd = JobCommand::new(tool);

    // --print 隐含 --quiet，需要显式恢复进度和日志输出
    cmd.args([
        "--newline",
        "--no-warnings",
        "--no-quiet",
        "--progress",
        "--progress-template",
        ytdlp::PROGRESS_TEMPLATE,
        "--no-mtime",
        "--no-part",
    ]);
    cmd.arg("-o")
        .arg(path_arg(&options.output_dir.join(ytdlp::OUTPUT_TEMPLATE)));
    cmd.args(["--print", ytdlp::PRINT_FINAL_PATH]);

    if cfg!(windows) {
        cmd.args(["--windows-filenames", "--trim-filenames", ytdlp::TRIM_FILENAMES]);
    }

    // --- 元数据 ---
    if options.parse_metadata_artist_title {
        cmd.args(["--parse-metadata", ytdlp::ARTIST_TITLE_PATTERN]);
    }
    cmd.arg("--add-metadata");
    // 避免 yt-dlp 把来源地址写进 comment / purl
    cmd.args(["--parse-metadata", ":(?P<meta_comment>)", "--parse-metadata", ":(?P<meta_purl>)"]);

    if options.strip_emojis {
        cmd.args(["--replace-in-metadata", "title", ytdlp::NON_LATIN_PATTERN, ""]);
    }

    if options.embed_thumbnail {
        cmd.args(["--embed-thumbnail", "--convert-thumbnails", "jpg"]);
        cmd.args(["--postprocessor-args", ytdlp::THUMBNAIL_ARGS]);
    }

    let plan = FormatPlan::for_request(&options.audio_format, &options.audio_quality);
    // 直接取流时 ffmpeg 只做 copy，无法同时套用滤镜
    if options.loudnorm && plan.is_conversion() {
        cmd.args(["--postprocessor-args", ytdlp::LOUDNORM_ARGS]);
    } else if options.loudnorm {
        warn!("格式 '{}' 不转码，忽略响度归一化", options.audio_format);
    }

    plan.push_args(&mut cmd);

    if let Some(cookies) = &options.cookies_path {
        cmd.arg("--cookies").arg(path_arg(cookies));
    }
    if let Some(ffmpeg) = &options.ffmpeg_path {
        cmd.arg("--ffmpeg-location").arg(path_arg(ffmpeg));
    }
    if let Some(tmp) = &options.tmp_dir {
        cmd.arg("-P").arg(format!("temp:{}", tmp.to_string_lossy()));
    }
    if options.use_archive
        && let Some(archive) = &options.archive_path
    {
        cmd.arg("--download-archive").arg(path_arg(archive));
    }

    cmd.arg(if options.overwrite {
        "--force-overwrites"
    } else {
        "--no-overwrites"
    });

    cmd.arg("--").arg(source);
    cmd
}

/// 只取元数据的解析命令。--ignore-errors 让不可用的播放列表条目不至于中止整个列表
pub fn build_resolve_command(tool: &Path, reference: &str, cookies: Option<&Path>) -> JobCommand {
    let mut cmd = JobCommand::new(tool);
    cmd.args(["-J", "--flat-playlist", "--no-warnings", "--ignore-errors"]);
    if let Some(cookies) = cookies {
        cmd.arg("--cookies").arg(path_arg(cookies));
    }
    cmd.arg("--").arg(reference.trim());
    cmd
}
