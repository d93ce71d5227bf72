// src/provider/catalog.rs

//! 只识别链接、不提供下载途径的音乐目录服务

use super::Provider;
use crate::{
    constants::providers,
    error::{AppError, AppResult},
    models::{DownloadOptions, DownloadResult, MediaItem, ProgressSink, Track},
};
use async_trait::async_trait;
use log::info;
use url::Url;

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

fn parse_web_url(reference: &str) -> Option<Url> {
    Url::parse(reference.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn is_spotify_reference(reference: &str) -> bool {
    let reference = reference.trim();
    // spotify:track:<id>
    if let Some(rest) = reference.strip_prefix("spotify:") {
        let mut parts = rest.splitn(2, ':');
        return matches!(parts.next(), Some("track" | "album" | "playlist"))
            && parts.next().is_some_and(|id| !id.is_empty());
    }

    let Some(url) = parse_web_url(reference) else {
        return false;
    };
    if !matches!(url.host_str(), Some("open.spotify.com" | "play.spotify.com")) {
        return false;
    }
    let segments = path_segments(&url);
    // 地区化的地址形如 /intl-de/track/<id>
    let segments = match segments.first() {
        Some(first) if first.starts_with("intl-") => &segments[1..],
        _ => &segments[..],
    };
    matches!(segments, [kind, _id, ..] if matches!(*kind, "track" | "album" | "playlist"))
}

fn is_apple_music_reference(reference: &str) -> bool {
    let Some(url) = parse_web_url(reference) else {
        return false;
    };
    if url.host_str() != Some("music.apple.com") {
        return false;
    }
    match path_segments(&url).as_slice() {
        [country, kind, _rest, ..] => {
            country.len() == 2
                && country.chars().all(|c| c.is_ascii_alphabetic())
                && matches!(*kind, "song" | "album" | "playlist")
        }
        _ => false,
    }
}

/// 目录类提供者: 能识别自己的链接，但解析和下载都会给出使用指引
#[derive(Debug, Clone)]
pub struct CatalogProvider {
    id: &'static str,
    display_name: &'static str,
    guidance: &'static str,
    matcher: fn(&str) -> bool,
}

impl CatalogProvider {
    pub fn spotify() -> Self {
        Self {
            id: providers::SPOTIFY,
            display_name: "Spotify",
            guidance: "Spotify 的内容受 DRM 保护，没有合法的直接下载途径。请在 YouTube Music 上搜索同名曲目或播放列表，然后使用该链接。",
            matcher: is_spotify_reference,
        }
    }

    pub fn apple_music() -> Self {
        Self {
            id: providers::APPLE_MUSIC,
            display_name: "Apple Music",
            guidance: "Apple Music 的内容受 DRM 保护，没有合法的直接下载途径。请在 YouTube Music 上搜索同名曲目或专辑，然后使用该链接。",
            matcher: is_apple_music_reference,
        }
    }

    fn unavailable(&self) -> AppError {
        info!("[{}] 请求了不提供下载的来源", self.id);
        AppError::ProviderUnavailable {
            provider_id: self.id.to_string(),
            guidance: self.guidance.to_string(),
        }
    }
}

#[async_trait]
impl Provider for CatalogProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> &str {
        self.display_name
    }

    fn can_handle(&self, reference: &str) -> bool {
        (self.matcher)(reference)
    }

    async fn resolve(&self, _reference: &str, _progress: &ProgressSink) -> AppResult<MediaItem> {
        Err(self.unavailable())
    }

    async fn download(
        &self,
        _track: &Track,
        _options: &DownloadOptions,
        _progress: &ProgressSink,
    ) -> AppResult<DownloadResult> {
        Err(self.unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spotify_detection() {
        let p = CatalogProvider::spotify();
        assert!(p.can_handle("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"));
        assert!(p.can_handle("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3?si=x"));
        assert!(p.can_handle("https://open.spotify.com/intl-de/playlist/37i9dQZF1DXcBWIGoYBM5M"));
        assert!(p.can_handle("https://play.spotify.com/track/abc"));
        assert!(p.can_handle("spotify:track:4uLU6hMCjMI75M1A2tKUQC"));
        assert!(!p.can_handle("spotify:artist:abc"));
        assert!(!p.can_handle("https://open.spotify.com/artist/abc"));
        assert!(!p.can_handle("https://open.spotify.com/track/"));
        assert!(!p.can_handle("https://www.youtube.com/watch?v=x"));
    }

    #[test]
    fn test_apple_music_detection() {
        let p = CatalogProvider::apple_music();
        assert!(p.can_handle("https://music.apple.com/us/album/some-album/1440857781"));
        assert!(p.can_handle("https://music.apple.com/gb/playlist/today/pl.f4d106fed2bd41149aaacabb233eb5eb"));
        assert!(p.can_handle("https://music.apple.com/jp/song/name/1440857790"));
        assert!(!p.can_handle("https://music.apple.com/us/artist/x/1"));
        assert!(!p.can_handle("https://music.apple.com/album/x"));
        assert!(!p.can_handle("https://apple.com/us/album/x/1"));
    }

    #[tokio::test]
    async fn test_resolve_reports_guidance() {
        let p = CatalogProvider::spotify();
        let err = p
            .resolve("https://open.spotify.com/track/abc", &ProgressSink::noop())
            .await
            .unwrap_err();
        match err {
            AppError::ProviderUnavailable { provider_id, guidance } => {
                assert_eq!(provider_id, "spotify");
                assert!(guidance.contains("YouTube Music"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
