// src/models/mod.rs

pub mod options;
pub mod progress;

pub use options::{DownloadOptions, DownloadResult, DownloadSettings, ItemWarning};
pub use progress::{CancellationHandle, Phase, ProgressEvent, ProgressSink};

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

/// 指向能处理该条目的提供者，只保存标识，不持有提供者本身
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRef {
    pub id: String,
    pub display_name: String,
}

impl ProviderRef {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// 一个可下载的音频单元
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub provider: ProviderRef,
    pub title: String,
    /// 用户输入或规范化后的来源
    pub source: String,
    /// 可直接作为下载来源的绝对地址
    pub url: Option<Url>,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<Url>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub meta: BTreeMap<String, Value>,
}

impl Track {
    pub fn new(provider: ProviderRef, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            provider,
            title: title.into(),
            source: source.into(),
            url: None,
            duration_secs: None,
            thumbnail: None,
            artist: None,
            album: None,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_url(mut self, url: Option<Url>) -> Self {
        self.url = url;
        self
    }

    /// 传给下载程序的输入: 优先使用 `url`，否则回退到原始 `source`
    pub fn download_source(&self) -> &str {
        self.url.as_ref().map_or(self.source.as_str(), Url::as_str)
    }
}

/// 播放列表、专辑等，按顺序包含若干条目 (可以嵌套)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub provider: ProviderRef,
    pub title: String,
    pub source: String,
    pub url: Option<Url>,
    pub thumbnail: Option<Url>,
    pub entries: Vec<MediaItem>,
    /// 来源声明的总数，可能与实际解析到的条目数不同
    pub total: Option<u64>,
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaItem {
    Track(Track),
    Collection(Collection),
}

impl MediaItem {
    pub fn title(&self) -> &str {
        match self {
            MediaItem::Track(t) => &t.title,
            MediaItem::Collection(c) => &c.title,
        }
    }

    /// 深度优先展开为线性的曲目列表，嵌套的集合原地展开
    pub fn flatten_tracks(&self) -> Vec<&Track> {
        let mut out = Vec::new();
        collect_tracks(self, &mut out);
        out
    }
}

fn collect_tracks<'a>(item: &'a MediaItem, out: &mut Vec<&'a Track>) {
    match item {
        MediaItem::Track(track) => out.push(track),
        MediaItem::Collection(collection) => {
            for entry in &collection.entries {
                collect_tracks(entry, out);
            }
        }
    }
}
