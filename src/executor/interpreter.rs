// src/executor/interpreter.rs

//! 把外部工具的单行输出转换为结构化信号。
//!
//! yt-dlp 的人类可读格式随版本、语言环境和终端宽度变化，这里只做防御式匹配:
//! 优先识别我们通过 `--progress-template` 注入的稳定标记，缺失时才回退到宽松匹配。

use crate::constants::ytdlp;
use regex::Regex;
use std::{path::PathBuf, sync::LazyLock};

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"{}\s*(\d+(?:\.\d+)?)",
        regex::escape(ytdlp::PROGRESS_MARKER)
    ))
    .unwrap()
});
static FALLBACK_PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)\s?%").unwrap());
static FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^{}\s*(.+)$", regex::escape(ytdlp::FILE_MARKER))).unwrap()
});
static DESTINATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Destination:\s+(.+)$").unwrap());
static ALREADY_DOWNLOADED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[download\]\s+(.+?)\s+has already been downloaded").unwrap());
static ALREADY_PRESENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(has already been downloaded|already been recorded in the archive|already in archive)")
        .unwrap()
});

/// 属于后处理阶段的输出前缀
const POSTPROCESS_PREFIXES: &[&str] = &[
    "[ExtractAudio]",
    "[ffmpeg]",
    "[Metadata]",
    "[EmbedThumbnail]",
    "[ThumbnailsConvertor]",
    "[FixupM4a]",
    "[Merger]",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrigin {
    /// 由 `--print after_move:FILE:...` 明确输出
    Printed,
    /// 从 "Destination: ..." 之类的日志中提取，可信度较低
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// 0..=1
    Progress(f64),
    ResolvedPath { path: PathBuf, origin: PathOrigin },
    AlreadyPresent,
    Noteworthy(String),
}

pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    ANSI_RE.replace_all(line, "")
}

/// 纯函数，不保存任何状态
pub fn classify(raw_line: &str) -> Vec<Signal> {
    let cleaned = strip_ansi(raw_line);
    let line = cleaned.trim();
    let mut signals = Vec::new();
    if line.is_empty() {
        return signals;
    }

    if let Some(fraction) = parse_progress(line) {
        signals.push(Signal::Progress(fraction));
    }

    let printed = FILE_RE.captures(line);
    if let Some(path) = printed.as_ref().and_then(|c| non_empty(&c[1])) {
        signals.push(Signal::ResolvedPath {
            path,
            origin: PathOrigin::Printed,
        });
    } else if let Some(path) = DESTINATION_RE.captures(line).and_then(|c| non_empty(&c[1])) {
        signals.push(Signal::ResolvedPath {
            path,
            origin: PathOrigin::Destination,
        });
    } else if let Some(path) = ALREADY_DOWNLOADED_RE.captures(line).and_then(|c| non_empty(&c[1])) {
        signals.push(Signal::ResolvedPath {
            path,
            origin: PathOrigin::Destination,
        });
    }

    // FILE: 行是文件路径，标题里的字样不算
    if printed.is_none() && ALREADY_PRESENT_RE.is_match(line) {
        signals.push(Signal::AlreadyPresent);
    }

    if POSTPROCESS_PREFIXES.iter().any(|p| line.starts_with(p)) {
        signals.push(Signal::Noteworthy(line.to_string()));
    }

    signals
}

/// 同一行出现多个标记时取最后一个。回退匹配只认紧跟 `[download]` 的百分比
fn parse_progress(line: &str) -> Option<f64> {
    let from_marker = MARKER_RE
        .captures_iter(line)
        .last()
        .and_then(|c| c[1].parse::<f64>().ok());
    let percent = match from_marker {
        Some(p) => Some(p),
        None if line.contains(ytdlp::PROGRESS_MARKER) => None, // 例如 "N/A"
        None => FALLBACK_PERCENT_RE
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok()),
    }?;
    Some(percent.clamp(0.0, 100.0) / 100.0)
}

fn non_empty(s: &str) -> Option<PathBuf> {
    let s = s.trim().trim_matches('"');
    (!s.is_empty()).then(|| PathBuf::from(s))
}
