// src/cli.rs

use clap::{Parser, ValueEnum, command, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    arg_required_else_help = true,
    disable_help_flag = true,
    disable_version_flag = true,
)]
#[command(group(
    clap::ArgGroup::new("mode")
        .required(true)
        .args(&["interactive", "url", "batch_file", "list_providers"]),
))]
pub struct Cli {
    // --- 运行模式 (Mode) ---
    /// 启动交互式会话，逐一输入链接
    #[arg(short, long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub interactive: bool,
    /// 下载单个链接 (单曲或播放列表)
    #[arg(short, long, value_name = "REFERENCE", help_heading = "Mode")]
    pub url: Option<String>,
    /// 从文本文件批量下载 (每行一个链接，忽略空行和 # 注释)
    #[arg(short, long, value_name = "FILE", help_heading = "Mode")]
    pub batch_file: Option<PathBuf>,
    /// 列出已注册的提供者并退出
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub list_providers: bool,

    // --- 下载选项 (Options) ---
    /// 设置文件保存目录
    #[arg(short, long, value_name = "DIR", help_heading = "Options")]
    pub output: Option<PathBuf>,
    /// 强制使用指定的提供者，跳过自动识别
    #[arg(long, value_name = "ID", help_heading = "Options")]
    pub provider: Option<String>,
    /// 音频格式: 'best', 'm4a', 'opus' (不转码) 或 'mp3', 'flac', 'wav' 等
    #[arg(short, long, value_name = "FORMAT", help_heading = "Options")]
    pub format: Option<String>,
    /// 转码质量: 0 (最好) 到 10，或 '320K' 这样的码率
    #[arg(short, long, value_name = "QUALITY", help_heading = "Options")]
    pub quality: Option<String>,
    /// 覆盖已存在的文件
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub overwrite: bool,
    /// 不使用下载历史记录 (archive)
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options", conflicts_with = "archive")]
    pub no_archive: bool,
    /// 指定下载历史记录文件的位置
    #[arg(long, value_name = "FILE", help_heading = "Options")]
    pub archive: Option<PathBuf>,
    /// 使用 ffmpeg loudnorm 统一响度
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub loudnorm: bool,
    /// 嵌入封面缩略图
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub embed_thumbnail: bool,
    /// 不从 "艺术家 - 标题" 格式的标题中提取元数据
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub no_parse_metadata: bool,
    /// 移除标题中的表情符号和非拉丁字符
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub strip_emojis: bool,
    /// yt-dlp 使用的 cookies 文件 (Netscape 格式)
    #[arg(long, value_name = "FILE", help_heading = "Options")]
    pub cookies: Option<PathBuf>,
    /// ffmpeg 可执行文件或其所在目录
    #[arg(long, value_name = "PATH", help_heading = "Options")]
    pub ffmpeg: Option<PathBuf>,
    /// yt-dlp 可执行文件
    #[arg(long, value_name = "PATH", help_heading = "Options")]
    pub yt_dlp: Option<PathBuf>,
    /// 下载过程中的临时文件目录
    #[arg(long, value_name = "DIR", help_heading = "Options")]
    pub tmp_dir: Option<PathBuf>,
    /// 下载程序在指定秒数内没有任何输出时终止该条目 (0 表示不限制)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64), help_heading = "Options")]
    pub idle_timeout: Option<u64>,
    /// 使用指定的配置文件，而不是 ~/.audio-dl/config.json
    #[arg(long, value_name = "FILE", help_heading = "Options")]
    pub config: Option<PathBuf>,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Off, global = true, hide = true)]
    pub log_level: LogLevel,
}
