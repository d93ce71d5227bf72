// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("无法启动外部程序 '{program}': {source}")]
    Execution {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("[{provider_id}] 无法解析 '{reference}': {detail}")]
    Resolution {
        reference: String,
        provider_id: String,
        detail: String,
    },
    #[error("[{provider_id}] 暂不支持该来源: {guidance}")]
    ProviderUnavailable {
        provider_id: String,
        guidance: String,
    },
    #[error("外部工具 {tool} 不可用 ({program}): {detail}")]
    ToolUnavailable {
        tool: String,
        program: String,
        detail: String,
    },
    #[error("没有可处理 '{reference}' 的提供者。已注册: {}", format_registered(.registered))]
    NoProvider {
        reference: String,
        registered: Vec<String>,
    },
    #[error("提供者 '{0}' 已注册")]
    DuplicateProvider(String),
    #[error("提供者 ID 不能为空")]
    InvalidProviderId,
    #[error("[{provider_id}] 下载 '{reference}' 失败 (退出码: {}){}", format_exit_code(.exit_code), format_tail(.tail))]
    ItemFailed {
        reference: String,
        provider_id: String,
        exit_code: Option<i32>,
        tail: Vec<String>,
    },
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("用户中断")]
    UserInterrupt,
    #[error("{0}")] // 只打印内部信息，不加任何前缀
    UserInputError(String),
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 只影响单个条目的错误。批量运行时记录为该条目的失败并继续下一个。
    pub fn is_item_level(&self) -> bool {
        matches!(self, AppError::Execution { .. } | AppError::ItemFailed { .. })
    }
}

fn format_registered(registered: &[String]) -> String {
    if registered.is_empty() {
        "(无)".to_string()
    } else {
        registered.join(", ")
    }
}

fn format_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "无".to_string(), |c| c.to_string())
}

fn format_tail(tail: &[String]) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n\n最后的输出:\n{}", tail.join("\n"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
