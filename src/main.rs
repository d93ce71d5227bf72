// src/main.rs

use audio_dl::{cli::Cli, logging, models::CancellationHandle, run_from_cli};
use clap::{CommandFactory, FromArgMatches};
use colored::*;
use std::{env, sync::Arc, time::Duration};

#[tokio::main]
async fn main() {
    // 为 Windows 终端启用 ANSI 颜色支持
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "audio-dl".to_string());
    let after_help = format!(
        "示例:\n  # 下载单个视频的音频\n  {bin} -u \"https://www.youtube.com/watch?v=...\"\n\n  # 下载整个播放列表为 opus (不转码)\n  {bin} -u \"https://music.youtube.com/playlist?list=...\" -f opus\n\n  # 批量下载\n  {bin} -b my_links.txt -o ~/Music\n\n  # 启动交互模式\n  {bin} -i",
        bin = bin_name
    );
    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };

    logging::setup_logging(args.log_level);

    // 第一次 Ctrl+C 请求取消当前下载，第二次直接退出
    let cancel = CancellationHandle::new();
    let signal_handle = cancel.clone();
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if signal_handle.is_signalled() {
                println!("\n{} 用户强制中断程序。", "[!]".yellow());
                tokio::time::sleep(Duration::from_millis(100)).await;
                std::process::exit(130);
            }
            log::info!("收到 Ctrl+C，开始取消");
            println!(
                "\n{} 正在停止当前下载… 再按一次 Ctrl+C 强制退出。",
                "[!]".yellow()
            );
            signal_handle.signal();
        }
    });

    match run_from_cli(args, cancel).await {
        Ok(status) => {
            let code = status.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Err(audio_dl::error::AppError::UserInterrupt) => std::process::exit(130),
        Err(e) => {
            log::error!("程序执行出错: {}", e);
            eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
            std::process::exit(1);
        }
    }
}
