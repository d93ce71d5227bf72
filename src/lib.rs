// src/lib.rs

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod symbols;
pub mod ui;
pub mod utils;

use crate::{
    cli::Cli,
    config::AppConfig,
    error::{AppError, AppResult},
    executor::JobExecutor,
    models::CancellationHandle,
    pipeline::{Pipeline, PipelineRequest, RunOutcome},
    provider::{ProviderRegistry, command::FormatPlan, youtube::YouTubeProvider},
    report::RunReport,
};
use colored::*;
use log::{debug, error, info, warn};
use std::{path::Path, sync::Arc};

/// 一次命令行调用的最终状态，决定进程退出码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    HadFailures,
    Cancelled,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::HadFailures => 1,
            RunStatus::Cancelled => 130,
        }
    }

    fn of(outcome: &RunOutcome) -> Self {
        if outcome.cancelled {
            RunStatus::Cancelled
        } else if outcome.has_failures() {
            RunStatus::HadFailures
        } else {
            RunStatus::Completed
        }
    }

    /// 取消优先于失败
    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (RunStatus::Cancelled, _) | (_, RunStatus::Cancelled) => RunStatus::Cancelled,
            (RunStatus::HadFailures, _) | (_, RunStatus::HadFailures) => RunStatus::HadFailures,
            _ => RunStatus::Completed,
        }
    }
}

pub fn build_registry(config: &AppConfig) -> AppResult<ProviderRegistry> {
    let youtube = YouTubeProvider::new(
        config.yt_dlp_path.clone(),
        JobExecutor::new(config.executor.clone()),
    )
    .with_cookies(config.download.cookies_path.clone());
    ProviderRegistry::with_defaults(youtube)
}

/// 所有运行模式共享的状态
struct RunContext {
    config: AppConfig,
    registry: ProviderRegistry,
    cancel: CancellationHandle,
}

impl RunContext {
    async fn run_reference(&self, reference: &str) -> AppResult<RunOutcome> {
        let request = PipelineRequest {
            source: reference.trim().to_string(),
            provider_id: self.config.provider_id.clone(),
            settings: self.config.download.clone(),
        };
        info!("开始处理: {}", request.source);
        ui::info(&format!("正在处理: {}", request.source));

        let pbar = ui::new_run_progress_bar("总进度");
        let result = Pipeline::new(&self.registry)
            .with_progress(ui::progress_sink_for(&pbar))
            .with_cancellation(self.cancel.clone())
            .run(&request)
            .await;
        pbar.finish_and_clear();

        let outcome = result?;
        RunReport::from_outcome(&outcome).print();
        Ok(outcome)
    }
}

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Arc<Cli>, cancel: CancellationHandle) -> AppResult<RunStatus> {
    debug!("CLI 参数: {:?}", args);
    if args.list_providers {
        list_providers()?;
        return Ok(RunStatus::Completed);
    }

    let config = AppConfig::new(&args)?;
    debug!("加载的应用配置: {:?}", config);
    ui::info(&format!(
        "保存目录: {}",
        utils::display_path(&config.download.output_dir)
    ));
    let download = &config.download;
    if download.loudnorm
        && !FormatPlan::for_request(&download.audio_format, &download.audio_quality).is_conversion()
    {
        ui::warn(&format!(
            "格式 '{}' 直接提取音频流，无法进行响度归一化。需要时请改用 -f mp3 等转码格式。",
            download.audio_format
        ));
    }

    let context = RunContext {
        registry: build_registry(&config)?,
        config,
        cancel,
    };

    if args.interactive {
        handle_interactive_mode(&context).await
    } else if let Some(batch_file) = &args.batch_file {
        process_batch_tasks(batch_file, &context).await
    } else if let Some(url) = &args.url {
        let outcome = context.run_reference(url).await?;
        Ok(RunStatus::of(&outcome))
    } else {
        Err(AppError::UserInputError("未指定运行模式".to_string()))
    }
}

fn list_providers() -> AppResult<()> {
    let registry = build_registry(&AppConfig::from_external(config::ExternalConfig::default()))?;
    let lines: Vec<String> = registry
        .providers()
        .map(|p| format!("{:<12} {}", p.id(), p.display_name()))
        .collect();
    let mut content: Vec<&str> = lines.iter().map(String::as_str).collect();
    content.extend(constants::HELP_PROVIDERS_GUIDE.lines());
    ui::box_message("已注册的提供者", &content, |s| s.cyan());
    Ok(())
}

/// 单个任务的错误只打印，不中断批量或交互会话
fn report_task_error(reference: &str, e: &AppError) {
    error!("任务 '{}' 失败: {}", reference, e);
    match e {
        AppError::ProviderUnavailable { guidance, .. } => ui::warn(guidance),
        _ => ui::error(&format!("处理任务时发生错误: {}", e)),
    }
}

async fn handle_interactive_mode(context: &RunContext) -> AppResult<RunStatus> {
    ui::print_header("交互模式");
    println!(
        "在此模式下，你可以逐一输入链接进行下载。直接按回车退出，按 {} 可取消当前下载。",
        *symbols::CTRL_C
    );

    let mut status = RunStatus::Completed;
    loop {
        let input = match ui::prompt("请输入链接", None) {
            Ok(input) if !input.is_empty() => input,
            Ok(_) => break,
            Err(_) => return Err(AppError::UserInterrupt),
        };
        match context.run_reference(&input).await {
            Ok(outcome) => status = status.merge(RunStatus::of(&outcome)),
            Err(e) => {
                report_task_error(&input, &e);
                status = status.merge(RunStatus::HadFailures);
            }
        }
        if context.cancel.is_signalled() {
            warn!("交互模式中收到取消请求，退出");
            status = RunStatus::Cancelled;
            break;
        }
    }

    println!("\n{} 退出交互模式。", *symbols::INFO);
    Ok(status)
}

async fn process_batch_tasks(batch_file: &Path, context: &RunContext) -> AppResult<RunStatus> {
    let content = std::fs::read_to_string(batch_file).map_err(|e| {
        error!("读取批量文件 '{}' 失败: {}", batch_file.display(), e);
        AppError::from(e)
    })?;

    let tasks = utils::parse_reference_lines(&content);
    if tasks.is_empty() {
        warn!("批量文件 '{}' 为空或不含有效行。", batch_file.display());
        ui::warn(&format!("批量文件 '{}' 为空。", batch_file.display()));
        return Ok(RunStatus::Completed);
    }

    ui::print_header(&format!(
        "开始批量处理任务 (按 {} 可取消)",
        *symbols::CTRL_C
    ));
    let mut success = 0;
    let mut failed = 0;
    let mut status = RunStatus::Completed;
    for (i, task) in tasks.iter().enumerate() {
        if context.cancel.is_signalled() {
            status = RunStatus::Cancelled;
            break;
        }
        ui::print_sub_header(&format!(
            "批量任务 {}/{} - {}",
            i + 1,
            tasks.len(),
            utils::truncate_text(task, constants::TITLE_TRUNCATE_LENGTH)
        ));
        match context.run_reference(task).await {
            Ok(outcome) => {
                let task_status = RunStatus::of(&outcome);
                if task_status == RunStatus::HadFailures {
                    failed += 1;
                } else if task_status == RunStatus::Completed {
                    success += 1;
                }
                status = status.merge(task_status);
            }
            Err(e) => {
                failed += 1;
                report_task_error(task, &e);
                status = status.merge(RunStatus::HadFailures);
            }
        }
    }

    ui::print_header("批量任务报告");
    println!(
        "{} | {} | 总计: {}",
        format!("成功任务: {}", success).green(),
        format!("失败任务: {}", failed).red(),
        tasks.len()
    );
    if status == RunStatus::Cancelled {
        ui::warn("批量任务已被取消。");
    }
    Ok(status)
}
