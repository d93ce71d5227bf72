// src/models/progress.rs

use serde::Serialize;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Resolve,
    Download,
    Postprocess,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Resolve => "resolve",
            Phase::Download => "download",
            Phase::Postprocess => "postprocess",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub provider_id: String,
    pub phase: Phase,
    pub message: String,
    /// 0..=1，未知时为 None
    pub progress: Option<f64>,
}

impl ProgressEvent {
    pub fn new(provider_id: &str, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            phase,
            message: message.into(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, fraction: f64) -> Self {
        self.progress = Some(fraction.clamp(0.0, 1.0));
        self
    }
}

type Callback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// 进度回调。回调在工作任务中被同步调用，调用方需要自行处理线程归属。
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<Callback>,
}

impl ProgressSink {
    pub fn new(callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    /// 把第 `index` 个 (从 1 开始，共 `total` 个) 条目的局部进度映射到整个批次
    pub fn remapped(&self, index: usize, total: usize) -> Self {
        let Some(inner) = self.callback.clone() else {
            return Self::noop();
        };
        Self::new(move |mut event| {
            if let Some(local) = event.progress {
                event.progress = Some(remap_progress(index, total, local));
            }
            inner(event);
        })
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

/// `((i-1) + p) / n`，结果落在 `[(i-1)/n, i/n]` 内
pub fn remap_progress(index: usize, total: usize, local: f64) -> f64 {
    let local = if local.is_nan() { 0.0 } else { local.clamp(0.0, 1.0) };
    if total == 0 {
        return local;
    }
    let index = index.clamp(1, total);
    ((index - 1) as f64 + local) / total as f64
}

/// 调用方与所有运行中的任务共享的取消标志
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
