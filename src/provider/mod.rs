// src/provider/mod.rs

pub mod catalog;
pub mod command;
pub mod registry;
pub mod youtube;

pub use registry::ProviderRegistry;

use crate::{
    error::AppResult,
    models::{DownloadOptions, DownloadResult, DownloadSettings, MediaItem, ProgressSink, Track},
};
use async_trait::async_trait;

/// 一个媒体来源。实现应当是无状态的，运行期的状态通过参数传入。
#[async_trait]
pub trait Provider: Send + Sync {
    /// 稳定的标识，例如 "youtube"
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// 只做字符串或 URL 解析，不做任何 I/O
    fn can_handle(&self, reference: &str) -> bool;

    /// 运行开始前检查所需的外部工具，按本次设置判断哪些是必需的
    async fn check_environment(&self, _settings: &DownloadSettings) -> AppResult<()> {
        Ok(())
    }

    /// 把引用解析为单个曲目或完整的集合，一次性全部解析完成
    async fn resolve(&self, reference: &str, progress: &ProgressSink) -> AppResult<MediaItem>;

    /// 下载单个曲目。集合由 `Pipeline` 展开后逐个调用
    async fn download(
        &self,
        track: &Track,
        options: &DownloadOptions,
        progress: &ProgressSink,
    ) -> AppResult<DownloadResult>;
}
