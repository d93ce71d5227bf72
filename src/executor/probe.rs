// src/executor/probe.rs

//! 运行前检查外部工具是否可用

use crate::{
    constants,
    error::{AppError, AppResult},
};
use log::{debug, info};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::{process::Command, time::timeout};

/// 执行 `<program> <version_arg>`，返回输出的第一行 (通常是版本号)
pub async fn probe_version(tool: &str, program: &Path, version_arg: &str) -> AppResult<String> {
    let unavailable = |detail: String| AppError::ToolUnavailable {
        tool: tool.to_string(),
        program: program.display().to_string(),
        detail,
    };

    debug!("检查外部工具: {} {}", program.display(), version_arg);
    let run = Command::new(program)
        .arg(version_arg)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match timeout(constants::executor::PROBE_TIMEOUT, run).await {
        Err(_) => return Err(unavailable("没有响应".to_string())),
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            return Err(unavailable("未找到该程序".to_string()));
        }
        Ok(Err(e)) => return Err(unavailable(e.to_string())),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(unavailable(format!("退出状态 {} {}", output.status, reason.trim())));
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("未知版本")
        .to_string();
    info!("{}: {}", tool, version);
    Ok(version)
}

/// `--ffmpeg-location` 既可以是可执行文件，也可以是所在目录
pub fn ffmpeg_program(location: Option<&Path>) -> PathBuf {
    match location {
        Some(path) if path.is_dir() => {
            path.join(format!("ffmpeg{}", std::env::consts::EXE_SUFFIX))
        }
        Some(path) => path.to_path_buf(),
        None => PathBuf::from("ffmpeg"),
    }
}
