// src/executor/mod.rs

pub mod interpreter;
pub mod probe;
pub mod process_tree;

use self::{
    interpreter::{PathOrigin, Signal},
    process_tree::TreeGuard,
};
use crate::{
    constants,
    error::{AppError, AppResult},
    models::{CancellationHandle, Phase, ProgressEvent, ProgressSink},
};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use std::{
    collections::VecDeque,
    fmt,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
    sync::mpsc,
};

/// 要执行的外部命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for JobCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobEnvironment {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub grace: Duration,
    pub poll_interval: Duration,
    pub tail_lines: usize,
    /// 长时间没有输出时主动终止; None 表示不限制
    pub idle_timeout: Option<Duration>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            grace: constants::executor::DEFAULT_GRACE,
            poll_interval: constants::executor::POLL_INTERVAL,
            tail_lines: constants::executor::DEFAULT_TAIL_LINES,
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// 被信号终止时为 None
    pub exit_code: Option<i32>,
    /// 去重且保持首次出现顺序
    pub output_paths: Vec<PathBuf>,
    pub already_present: bool,
    pub cancelled: bool,
    pub timed_out: bool,
    /// 最后若干行输出，用于失败诊断
    pub tail: Vec<String>,
}

impl JobResult {
    fn cancelled_before_start() -> Self {
        Self {
            exit_code: None,
            output_paths: Vec::new(),
            already_present: false,
            cancelled: true,
            timed_out: false,
            tail: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        !self.cancelled && !self.timed_out && self.exit_code == Some(0)
    }
}

/// 运行过程中由输出累积的状态
struct OutputState {
    tail: VecDeque<String>,
    tail_limit: usize,
    printed: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
    already_present: bool,
}

impl OutputState {
    fn new(tail_limit: usize) -> Self {
        Self {
            tail: VecDeque::with_capacity(tail_limit),
            tail_limit,
            printed: Vec::new(),
            destinations: Vec::new(),
            already_present: false,
        }
    }

    fn push_tail(&mut self, line: &str) {
        if self.tail_limit == 0 {
            return;
        }
        if self.tail.len() == self.tail_limit {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
    }

    fn into_result(self, exit_code: Option<i32>, cancelled: bool, timed_out: bool) -> JobResult {
        // 明确打印的路径优先，只有完全没有时才使用 "Destination:" 行
        let paths = if self.printed.is_empty() {
            self.destinations
        } else {
            self.printed
        };
        JobResult {
            exit_code,
            output_paths: paths.into_iter().unique().collect(),
            already_present: self.already_present,
            cancelled,
            timed_out,
            tail: self.tail.into_iter().collect(),
        }
    }
}

/// 为每个下载条目启动一个外部进程，逐行解析输出并支持协作式取消
#[derive(Debug, Clone, Default)]
pub struct JobExecutor {
    settings: ExecutorSettings,
}

impl JobExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    /// 只有在进程根本无法启动时才返回 `AppError::Execution`。
    /// 非零退出码通过 `JobResult::exit_code` 报告，由调用方决定是否视为失败。
    pub async fn run(
        &self,
        command: &JobCommand,
        environment: &JobEnvironment,
        cancel: &CancellationHandle,
        provider_id: &str,
        progress: &ProgressSink,
    ) -> AppResult<JobResult> {
        if cancel.is_signalled() {
            info!("任务开始前已收到取消请求，不启动进程: {}", command);
            return Ok(JobResult::cancelled_before_start());
        }

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &environment.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &environment.env {
            cmd.env(key, value);
        }
        process_tree::isolate_process_group(&mut cmd);

        debug!("执行命令: {}", command);
        let mut child = cmd.spawn().map_err(|source| AppError::Execution {
            program: command.program.display().to_string(),
            source,
        })?;
        let mut guard = TreeGuard::new(child.id());
        info!("已启动进程 {:?}: {}", child.id(), command.program.display());

        progress.emit(
            ProgressEvent::new(provider_id, Phase::Download, "正在启动下载程序…").with_progress(0.0),
        );

        // stdout 与 stderr 合并为一个按行的流; 每行整体发送，不会在行中间交错
        let (tx, mut rx) = mpsc::channel::<String>(constants::executor::LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut state = OutputState::new(self.settings.tail_lines);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_output = Instant::now();
        let mut cancelled = false;
        let mut timed_out = false;

        loop {
            if cancel.is_signalled() {
                cancelled = true;
                break;
            }
            tokio::select! {
                line = rx.recv() => match line {
                    Some(line) => {
                        last_output = Instant::now();
                        handle_line(&line, &mut state, provider_id, progress);
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if let Some(limit) = self.settings.idle_timeout
                        && last_output.elapsed() >= limit
                    {
                        warn!("进程 {:?} 已 {:?} 没有输出，判定为卡住", child.id(), limit);
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        if cancelled || timed_out {
            if cancelled {
                info!("收到取消请求，正在终止进程组 {:?}", child.id());
                progress.emit(ProgressEvent::new(provider_id, Phase::Download, "正在取消下载…"));
            }
            process_tree::stop_process_tree(&mut child, self.settings.grace).await;
            let exit_code = match child.try_wait() {
                Ok(Some(status)) => status.code(),
                _ => None,
            };
            if has_exited_or_reaped(&mut child) {
                guard.disarm();
            }
            if cancelled {
                progress.emit(ProgressEvent::new(provider_id, Phase::Download, "下载已取消"));
            }
            return Ok(state.into_result(exit_code, cancelled, timed_out));
        }

        let status = child.wait().await?;
        guard.disarm();
        let exit_code = status.code();
        debug!("进程退出: {}", status);
        if exit_code == Some(0) {
            progress.emit(
                ProgressEvent::new(provider_id, Phase::Download, "下载程序已完成").with_progress(1.0),
            );
        } else {
            warn!("进程以非零状态退出: {}", status);
        }
        Ok(state.into_result(exit_code, false, false))
    }
}

fn has_exited_or_reaped(child: &mut tokio::process::Child) -> bool {
    child.id().is_none() || !matches!(child.try_wait(), Ok(None))
}

fn handle_line(line: &str, state: &mut OutputState, provider_id: &str, progress: &ProgressSink) {
    trace!("[{}] {}", provider_id, line);
    state.push_tail(line);
    for signal in interpreter::classify(line) {
        match signal {
            Signal::Progress(fraction) => progress.emit(
                ProgressEvent::new(
                    provider_id,
                    Phase::Download,
                    format!("下载中… {:.1}%", fraction * 100.0),
                )
                .with_progress(fraction),
            ),
            Signal::ResolvedPath { path, origin } => {
                debug!("识别到输出文件 ({:?}): {}", origin, path.display());
                match origin {
                    PathOrigin::Printed => state.printed.push(path),
                    PathOrigin::Destination => state.destinations.push(path),
                }
            }
            Signal::AlreadyPresent => {
                if !state.already_present {
                    info!("检测到已下载过的条目: {}", line);
                }
                state.already_present = true;
            }
            Signal::Noteworthy(text) => {
                progress.emit(ProgressEvent::new(provider_id, Phase::Postprocess, text))
            }
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                // 进度行有时用 \r 覆盖刷新，只保留最后一段
                let line = line.rsplit('\r').next().unwrap_or(line);
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("读取子进程输出失败: {}", e);
                break;
            }
        }
    }
}
