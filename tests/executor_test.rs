// tests/executor_test.rs

#![cfg(unix)]

mod common;

use audio_dl::{
    error::AppError,
    executor::{ExecutorSettings, JobCommand, JobEnvironment, JobExecutor},
    models::{CancellationHandle, Phase, ProgressEvent, ProgressSink},
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tempfile::tempdir;

fn quick_settings() -> ExecutorSettings {
    ExecutorSettings {
        grace: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
        ..ExecutorSettings::default()
    }
}

fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink = ProgressSink::new(move |e| sink_events.lock().unwrap().push(e));
    (sink, events)
}

fn sh(script: &std::path::Path) -> JobCommand {
    JobCommand::new(script)
}

#[tokio::test]
async fn test_output_is_streamed_and_interpreted() {
    let dir = tempdir().unwrap();
    let script = common::write_script(
        dir.path(),
        "job.sh",
        "#!/bin/sh\n\
         echo '[download] Destination: /tmp/x.webm'\n\
         echo 'AUDIODL_PROGRESS:  25.0%'\n\
         echo 'AUDIODL_PROGRESS:  50.0%' >&2\n\
         echo '[download] 75.0% of 3.00MiB'\n\
         echo '[ExtractAudio] Destination: /tmp/x.mp3'\n\
         echo 'FILE:/tmp/x.mp3'\n",
    );
    let (sink, events) = recording_sink();
    let result = JobExecutor::new(quick_settings())
        .run(&sh(&script), &JobEnvironment::default(), &CancellationHandle::new(), "youtube", &sink)
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.output_paths, vec![PathBuf::from("/tmp/x.mp3")]);
    assert_eq!(result.tail.len(), 6);

    let events = events.lock().unwrap();
    let fractions: Vec<f64> = events
        .iter()
        .filter(|e| e.phase == Phase::Download)
        .filter_map(|e| e.progress)
        .collect();
    for expected in [0.25, 0.5, 0.75, 1.0] {
        assert!(
            fractions.iter().any(|f| (f - expected).abs() < 1e-9),
            "缺少进度 {}: {:?}",
            expected,
            fractions
        );
    }
    assert!(events.iter().any(|e| e.phase == Phase::Postprocess && e.message.starts_with("[ExtractAudio]")));
    assert!(events.iter().all(|e| e.provider_id == "youtube"));
}

#[tokio::test]
async fn test_tail_keeps_only_last_lines() {
    let dir = tempdir().unwrap();
    let script = common::write_script(
        dir.path(),
        "job.sh",
        "#!/bin/sh\ni=1\nwhile [ $i -le 100 ]; do echo \"line $i\"; i=$((i+1)); done\n",
    );
    let settings = ExecutorSettings {
        tail_lines: 5,
        ..quick_settings()
    };
    let result = JobExecutor::new(settings)
        .run(&sh(&script), &JobEnvironment::default(), &CancellationHandle::new(), "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert_eq!(result.tail, vec!["line 96", "line 97", "line 98", "line 99", "line 100"]);
}

#[tokio::test]
async fn test_pre_signalled_cancel_does_not_spawn() {
    let cancel = CancellationHandle::new();
    cancel.signal();
    // 程序不存在: 如果真的尝试启动，会得到 Execution 错误
    let command = JobCommand::new("/nonexistent/definitely-not-a-program");
    let result = JobExecutor::new(quick_settings())
        .run(&command, &JobEnvironment::default(), &cancel, "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert!(result.cancelled);
    assert_eq!(result.exit_code, None);
    assert!(result.output_paths.is_empty());
}

#[tokio::test]
async fn test_spawn_failure_is_execution_error() {
    let command = JobCommand::new("/nonexistent/definitely-not-a-program");
    let err = JobExecutor::new(quick_settings())
        .run(&command, &JobEnvironment::default(), &CancellationHandle::new(), "t", &ProgressSink::noop())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Execution { .. }));
    assert!(err.is_item_level());
}

#[tokio::test]
async fn test_non_zero_exit_is_reported_not_raised() {
    let dir = tempdir().unwrap();
    let script = common::write_script(
        dir.path(),
        "job.sh",
        "#!/bin/sh\necho 'working'\necho 'ERROR: boom' >&2\nexit 3\n",
    );
    let result = JobExecutor::new(quick_settings())
        .run(&sh(&script), &JobEnvironment::default(), &CancellationHandle::new(), "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert_eq!(result.exit_code, Some(3));
    assert!(!result.success());
    assert!(result.tail.contains(&"ERROR: boom".to_string()));
}

#[tokio::test]
async fn test_environment_and_working_dir_are_applied() {
    let dir = tempdir().unwrap();
    let script = common::write_script(
        dir.path(),
        "job.sh",
        "#!/bin/sh\necho \"FILE:$(pwd)/$AUDIODL_TEST_NAME\"\n",
    );
    let environment = JobEnvironment {
        working_dir: Some(dir.path().to_path_buf()),
        env: vec![("AUDIODL_TEST_NAME".into(), "song.opus".into())],
    };
    let result = JobExecutor::new(quick_settings())
        .run(&sh(&script), &environment, &CancellationHandle::new(), "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert_eq!(result.output_paths.len(), 1);
    assert!(result.output_paths[0].ends_with("song.opus"));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_mid_flight_cancel_stops_whole_process_group() {
    let dir = tempdir().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    let script = common::write_script(
        dir.path(),
        "job.sh",
        &format!(
            "#!/bin/sh\nsleep 60 &\necho $! > '{}'\necho 'AUDIODL_PROGRESS: 5.0%'\nwait\n",
            pid_file.display()
        ),
    );

    let cancel = CancellationHandle::new();
    let trigger = cancel.clone();
    let watched = pid_file.clone();
    tokio::spawn(async move {
        while !watched.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.signal();
    });

    let started = Instant::now();
    let result = JobExecutor::new(quick_settings())
        .run(&sh(&script), &JobEnvironment::default(), &cancel, "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert!(result.cancelled);
    assert!(!result.success());
    assert!(started.elapsed() < Duration::from_secs(10));

    let grandchild: u32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while common::process_alive(grandchild) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!common::process_alive(grandchild), "孙进程 {} 仍在运行", grandchild);
}

#[tokio::test]
async fn test_cancel_escalates_when_interrupt_is_ignored() {
    let dir = tempdir().unwrap();
    let ready = dir.path().join("ready");
    let script = common::write_script(
        dir.path(),
        "job.sh",
        &format!(
            "#!/bin/sh\ntrap '' INT\ntouch '{}'\nwhile true; do sleep 1; done\n",
            ready.display()
        ),
    );

    let cancel = CancellationHandle::new();
    let trigger = cancel.clone();
    let watched = ready.clone();
    tokio::spawn(async move {
        while !watched.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        trigger.signal();
    });

    let settings = quick_settings();
    let grace = settings.grace;
    let started = Instant::now();
    let result = JobExecutor::new(settings)
        .run(&sh(&script), &JobEnvironment::default(), &cancel, "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert!(result.cancelled);
    // 中断被忽略，至少等待了一个宽限期后才升级
    assert!(started.elapsed() >= grace);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_idle_timeout_stops_silent_job() {
    let dir = tempdir().unwrap();
    let script = common::write_script(dir.path(), "job.sh", "#!/bin/sh\necho start\nsleep 30\n");
    let settings = ExecutorSettings {
        idle_timeout: Some(Duration::from_millis(300)),
        ..quick_settings()
    };
    let started = Instant::now();
    let result = JobExecutor::new(settings)
        .run(&sh(&script), &JobEnvironment::default(), &CancellationHandle::new(), "t", &ProgressSink::noop())
        .await
        .unwrap();
    assert!(result.timed_out);
    assert!(!result.cancelled);
    assert!(!result.success());
    assert!(started.elapsed() < Duration::from_secs(10));
}
