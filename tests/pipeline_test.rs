// tests/pipeline_test.rs

mod common;

use async_trait::async_trait;
use audio_dl::{
    error::{AppError, AppResult},
    models::{
        CancellationHandle, Collection, DownloadOptions, DownloadResult, DownloadSettings,
        ItemWarning, MediaItem, ProgressEvent, ProgressSink, ProviderRef, Track,
    },
    pipeline::{Pipeline, PipelineRequest},
    provider::{Provider, ProviderRegistry},
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::tempdir;

#[derive(Clone, Copy)]
enum Step {
    Download,
    AlreadyPresent,
    Fail,
    CancelMidFlight,
}

/// 按预定步骤返回结果的提供者，用于验证编排逻辑
struct ScriptedProvider {
    steps: Vec<Step>,
    collection: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProvider {
    fn provider_ref() -> ProviderRef {
        ProviderRef::new("scripted", "Scripted")
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }

    fn can_handle(&self, reference: &str) -> bool {
        reference.starts_with("scripted:")
    }

    async fn resolve(&self, reference: &str, _progress: &ProgressSink) -> AppResult<MediaItem> {
        let tracks: Vec<MediaItem> = (1..=self.steps.len())
            .map(|i| {
                MediaItem::Track(Track::new(
                    Self::provider_ref(),
                    format!("Track {}", i),
                    format!("{}#{}", reference, i),
                ))
            })
            .collect();
        if !self.collection {
            return Ok(tracks.into_iter().next().unwrap());
        }
        Ok(MediaItem::Collection(Collection {
            provider: Self::provider_ref(),
            title: "Scripted Mix".into(),
            source: reference.into(),
            url: None,
            thumbnail: None,
            total: Some(tracks.len() as u64),
            entries: tracks,
            meta: BTreeMap::new(),
        }))
    }

    async fn download(
        &self,
        track: &Track,
        options: &DownloadOptions,
        progress: &ProgressSink,
    ) -> AppResult<DownloadResult> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(track.title.clone());
            calls.len() - 1
        };
        progress.emit(
            ProgressEvent::new(self.id(), audio_dl::models::Phase::Download, "half").with_progress(0.5),
        );
        let mut result = DownloadResult {
            provider_id: self.id().into(),
            item_title: track.title.clone(),
            files: Vec::new(),
            warnings: Vec::new(),
            cancelled: false,
        };
        match self.steps[index] {
            Step::Download => result
                .files
                .push(options.output_dir.join(format!("{}.mp3", track.title))),
            Step::AlreadyPresent => result.warnings.push(ItemWarning::AlreadyDownloaded),
            Step::Fail => {
                return Err(AppError::ItemFailed {
                    reference: track.source.clone(),
                    provider_id: self.id().into(),
                    exit_code: Some(1),
                    tail: vec!["ERROR: scripted failure".into()],
                });
            }
            Step::CancelMidFlight => {
                // 用户在这个条目下载过程中按下了 Ctrl+C
                options.cancel.signal();
                result.cancelled = true;
                result.warnings.push(ItemWarning::Cancelled);
            }
        }
        Ok(result)
    }
}

fn scripted_registry(steps: Vec<Step>, collection: bool) -> (ProviderRegistry, Arc<Mutex<Vec<String>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ProviderRegistry::new();
    registry
        .register(Box::new(ScriptedProvider {
            steps,
            collection,
            calls: calls.clone(),
        }))
        .unwrap();
    (registry, calls)
}

fn settings(dir: &Path) -> DownloadSettings {
    DownloadSettings {
        output_dir: dir.join("out"),
        ..Default::default()
    }
}

fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink = ProgressSink::new(move |e| sink_events.lock().unwrap().push(e));
    (sink, events)
}

#[tokio::test]
async fn test_single_track_produces_one_file() {
    let dir = tempdir().unwrap();
    let (registry, calls) = scripted_registry(vec![Step::Download], false);
    let request = PipelineRequest::new("scripted:one", settings(dir.path()));

    let outcome = Pipeline::new(&registry).run(&request).await.unwrap();

    assert_eq!(outcome.provider_id, "scripted");
    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].files.len(), 1);
    assert!(outcome.results[0].warnings.is_empty());
    assert!(!outcome.cancelled);
    assert_eq!(*calls.lock().unwrap(), vec!["Track 1"]);
    assert!(dir.path().join("out").is_dir());
}

#[tokio::test]
async fn test_cancel_during_second_item_stops_the_run() {
    let dir = tempdir().unwrap();
    let (registry, calls) =
        scripted_registry(vec![Step::Download, Step::CancelMidFlight, Step::Download], true);
    let cancel = CancellationHandle::new();
    let request = PipelineRequest::new("scripted:mix", settings(dir.path()));

    let outcome = Pipeline::new(&registry)
        .with_cancellation(cancel.clone())
        .run(&request)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].item_title, "Track 1");
    assert_eq!(outcome.completed_count(), 1);
    // 第三个条目从未开始
    assert_eq!(*calls.lock().unwrap(), vec!["Track 1", "Track 2"]);
    assert!(cancel.is_signalled());
}

#[tokio::test]
async fn test_already_present_item_is_reported_as_skipped() {
    let dir = tempdir().unwrap();
    let (registry, _) = scripted_registry(vec![Step::AlreadyPresent], false);
    let request = PipelineRequest::new("scripted:seen", settings(dir.path()));

    let outcome = Pipeline::new(&registry).run(&request).await.unwrap();

    assert_eq!(outcome.results.len(), 1);
    assert!(outcome.results[0].is_already_downloaded());
    assert!(outcome.results[0].files.is_empty());
    assert_eq!(outcome.skipped_count(), 1);
    assert_eq!(outcome.completed_count(), 0);
}

#[tokio::test]
async fn test_item_failure_does_not_stop_the_run() {
    let dir = tempdir().unwrap();
    let (registry, calls) = scripted_registry(vec![Step::Download, Step::Fail, Step::Download], true);
    let request = PipelineRequest::new("scripted:mix", settings(dir.path()));

    let outcome = Pipeline::new(&registry).run(&request).await.unwrap();

    assert_eq!(calls.lock().unwrap().len(), 3);
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.failed_count(), 1);
    assert_eq!(outcome.completed_count(), 2);
    let failed = &outcome.results[1];
    assert!(failed.files.is_empty());
    assert!(matches!(&failed.warnings[0], ItemWarning::Failed(reason) if reason.contains("scripted failure")));
}

#[tokio::test]
async fn test_progress_is_remapped_across_the_batch() {
    let dir = tempdir().unwrap();
    let (registry, _) = scripted_registry(vec![Step::Download, Step::Download], true);
    let (sink, events) = recording_sink();
    let request = PipelineRequest::new("scripted:mix", settings(dir.path()));

    Pipeline::new(&registry).with_progress(sink).run(&request).await.unwrap();

    let events = events.lock().unwrap();
    let fractions: Vec<f64> = events.iter().filter_map(|e| e.progress).collect();
    // 每个条目: 开始 0.0，中途 0.5
    assert_eq!(fractions, vec![0.0, 0.25, 0.5, 0.75]);
    let headers: Vec<&str> = events
        .iter()
        .map(|e| e.message.as_str())
        .filter(|m| m.starts_with('['))
        .collect();
    assert_eq!(headers, vec!["[1/2] Track 1", "[2/2] Track 2"]);
}

#[tokio::test]
async fn test_pre_cancelled_run_downloads_nothing() {
    let dir = tempdir().unwrap();
    let (registry, calls) = scripted_registry(vec![Step::Download, Step::Download], true);
    let cancel = CancellationHandle::new();
    cancel.signal();
    let request = PipelineRequest::new("scripted:mix", settings(dir.path()));

    let outcome = Pipeline::new(&registry)
        .with_cancellation(cancel)
        .run(&request)
        .await
        .unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.results.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_reference_and_unknown_override() {
    let dir = tempdir().unwrap();
    let (registry, _) = scripted_registry(vec![Step::Download], false);

    let request = PipelineRequest::new("https://example.com/a.mp3", settings(dir.path()));
    match Pipeline::new(&registry).run(&request).await {
        Err(AppError::NoProvider { registered, .. }) => assert_eq!(registered, vec!["scripted"]),
        other => panic!("应当找不到提供者: {:?}", other.map(|o| o.title)),
    }

    let mut request = PipelineRequest::new("scripted:one", settings(dir.path()));
    request.provider_id = Some("missing".into());
    assert!(matches!(
        Pipeline::new(&registry).run(&request).await,
        Err(AppError::NoProvider { .. })
    ));
}

#[cfg(unix)]
mod with_fake_yt_dlp {
    use super::*;
    use audio_dl::{
        executor::{ExecutorSettings, JobExecutor},
        provider::youtube::YouTubeProvider,
    };
    use std::time::Duration;

    fn registry(dir: &Path) -> ProviderRegistry {
        let tool = common::fake_yt_dlp(dir);
        let executor = JobExecutor::new(ExecutorSettings {
            grace: Duration::from_millis(500),
            poll_interval: Duration::from_millis(50),
            ..ExecutorSettings::default()
        });
        ProviderRegistry::with_defaults(YouTubeProvider::new(tool, executor)).unwrap()
    }

    fn out(dir: &Path) -> PathBuf {
        dir.join("out")
    }

    fn yt_settings(dir: &Path) -> DownloadSettings {
        DownloadSettings {
            ffmpeg_path: Some(common::fake_ffmpeg(dir)),
            ..settings(dir)
        }
    }

    #[tokio::test]
    async fn test_single_video_is_downloaded() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let request = PipelineRequest::new("https://www.youtube.com/watch?v=solo", yt_settings(dir.path()));

        let outcome = Pipeline::new(&registry).run(&request).await.unwrap();

        assert_eq!(outcome.provider_id, "youtube");
        assert_eq!(outcome.title, "Song solo");
        assert_eq!(outcome.results.len(), 1);
        let result = &outcome.results[0];
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.files, vec![out(dir.path()).join("solo.mp3")]);
        assert!(out(dir.path()).join("solo.mp3").is_file());

        let archive = std::fs::read_to_string(out(dir.path()).join("_logs").join("archive.txt")).unwrap();
        assert!(archive.contains("youtube solo"));
    }

    #[tokio::test]
    async fn test_second_run_is_skipped_through_the_archive() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let request = PipelineRequest::new("https://youtu.be/x?v=again", yt_settings(dir.path()));

        let first = Pipeline::new(&registry).run(&request).await.unwrap();
        assert_eq!(first.completed_count(), 1);

        let second = Pipeline::new(&registry).run(&request).await.unwrap();
        assert_eq!(second.results.len(), 1);
        assert!(second.results[0].is_already_downloaded());
        assert!(second.results[0].files.is_empty());
        assert_eq!(second.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_playlist_with_a_failing_entry() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let request =
            PipelineRequest::new("https://www.youtube.com/playlist?list=mix", yt_settings(dir.path()));

        let outcome = Pipeline::new(&registry).run(&request).await.unwrap();

        assert_eq!(outcome.title, "Fake Mix");
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.failed_count(), 1);
        assert!(matches!(
            &outcome.results[1].warnings[0],
            ItemWarning::Failed(reason) if reason.contains("Video unavailable")
        ));
        assert!(out(dir.path()).join("aaa.mp3").is_file());
        assert!(out(dir.path()).join("ccc.mp3").is_file());
    }

    #[tokio::test]
    async fn test_cancel_while_second_entry_is_running() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let cancel = CancellationHandle::new();
        let trigger = cancel.clone();
        // 第二个条目报告自己的进度后立即取消 (全局进度落在 1/3 与 2/3 之间)
        let sink = ProgressSink::new(move |e| {
            if e.progress.is_some_and(|p| p > 0.34 && p < 0.66) {
                trigger.signal();
            }
        });
        let request =
            PipelineRequest::new("https://www.youtube.com/playlist?list=slow", yt_settings(dir.path()));

        let started = std::time::Instant::now();
        let outcome = Pipeline::new(&registry)
            .with_progress(sink)
            .with_cancellation(cancel.clone())
            .run(&request)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(cancel.is_signalled());
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].item_title, "First");
        assert!(!out(dir.path()).join("ccc.mp3").exists());
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_unparseable_resolve_output_is_a_resolution_error() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let request = PipelineRequest::new("https://www.youtube.com/watch?v=broken", yt_settings(dir.path()));

        match Pipeline::new(&registry).run(&request).await {
            Err(AppError::Resolution { provider_id, detail, .. }) => {
                assert_eq!(provider_id, "youtube");
                assert!(detail.contains("Unsupported URL"), "{}", detail);
            }
            other => panic!("应当解析失败: {:?}", other.map(|o| o.title)),
        }
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_stops_the_run_before_downloading() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let settings = DownloadSettings {
            ffmpeg_path: Some(dir.path().join("no-such-ffmpeg")),
            ..settings(dir.path())
        };
        let request =
            PipelineRequest::new("https://www.youtube.com/playlist?list=mix", settings);

        match Pipeline::new(&registry).run(&request).await {
            Err(AppError::ToolUnavailable { tool, .. }) => assert_eq!(tool, "ffmpeg"),
            other => panic!("应当在下载前失败: {:?}", other.map(|o| o.title)),
        }
        assert!(!out(dir.path()).join("aaa.mp3").exists());
        assert!(!out(dir.path()).join("_logs").exists());
    }

    #[tokio::test]
    async fn test_broken_downloader_is_named_before_resolving() {
        let dir = tempdir().unwrap();
        let tool = common::write_script(
            dir.path(),
            "yt-dlp",
            "#!/bin/sh
echo 'ImportError: No module named yt_dlp' >&2
exit 2
",
        );
        let registry =
            ProviderRegistry::with_defaults(YouTubeProvider::new(tool, JobExecutor::default())).unwrap();
        let request = PipelineRequest::new("https://youtu.be/x?v=solo", yt_settings(dir.path()));

        match Pipeline::new(&registry).run(&request).await {
            Err(AppError::ToolUnavailable { tool, detail, .. }) => {
                assert_eq!(tool, "yt-dlp");
                assert!(detail.contains("ImportError"), "{}", detail);
            }
            other => panic!("应当报告 yt-dlp 不可用: {:?}", other.map(|o| o.title)),
        }
    }

    #[tokio::test]
    async fn test_catalog_override_reports_guidance() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let mut request = PipelineRequest::new("https://www.youtube.com/watch?v=solo", yt_settings(dir.path()));
        request.provider_id = Some("Spotify".into());

        assert!(matches!(
            Pipeline::new(&registry).run(&request).await,
            Err(AppError::ProviderUnavailable { .. })
        ));
    }
}
