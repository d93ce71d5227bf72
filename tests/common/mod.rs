// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

/// 模拟 yt-dlp 的 shell 脚本。
///
/// 解析 (`-J`):
/// - `list=mix`  -> 3 个条目 aaa / fail / ccc
/// - `list=slow` -> 3 个条目 aaa / slow / ccc
/// - `v=broken`  -> 非 JSON 输出，退出码 1
/// - `v=<id>`    -> 单个视频
///
/// `--version` 输出固定的版本号。
///
/// 下载: `fail` 以退出码 1 结束，`slow` 一直等待，其余创建 `<id>.mp3`。
/// 传入 `--download-archive` 时按 "youtube <id>" 记录，重复下载会报告已记录。
pub const FAKE_YT_DLP: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "2025.01.01"
  exit 0
fi
for last; do :; done
out=""
archive=""
prev=""
json=0
for a in "$@"; do
  [ "$a" = "-J" ] && json=1
  [ "$prev" = "-o" ] && out="$a"
  [ "$prev" = "--download-archive" ] && archive="$a"
  prev="$a"
done

if [ "$json" = "1" ]; then
  case "$last" in
    *list=mix*)
      echo '{"_type":"playlist","id":"mix","title":"Fake Mix","entries":[{"_type":"url","id":"aaa","url":"aaa","title":"First"},{"_type":"url","id":"fail","url":"fail","title":"Broken"},{"_type":"url","id":"ccc","url":"ccc","title":"Third"}]}'
      ;;
    *list=slow*)
      echo '{"_type":"playlist","id":"slow","title":"Slow Mix","entries":[{"_type":"url","id":"aaa","url":"aaa","title":"First"},{"_type":"url","id":"slow","url":"slow","title":"Slow"},{"_type":"url","id":"ccc","url":"ccc","title":"Third"}]}'
      ;;
    *v=broken*)
      echo "ERROR: [youtube] broken: Unsupported URL" >&2
      exit 1
      ;;
    *)
      id="${last##*v=}"
      echo "{\"id\":\"$id\",\"title\":\"Song $id\",\"webpage_url\":\"https://www.youtube.com/watch?v=$id\"}"
      ;;
  esac
  exit 0
fi

dir=$(dirname "$out")
id="${last##*v=}"

if [ -n "$archive" ] && grep -qx "youtube $id" "$archive" 2>/dev/null; then
  echo "[download] $id: has already been recorded in the archive"
  exit 0
fi

case "$id" in
  fail)
    echo "[youtube] fail: Downloading webpage"
    echo "ERROR: [youtube] fail: Video unavailable" >&2
    exit 1
    ;;
  slow)
    echo "AUDIODL_PROGRESS:  10.0%"
    sleep 60 &
    wait
    exit 0
    ;;
esac

echo "[download] Destination: $dir/$id.webm"
echo "AUDIODL_PROGRESS:  50.0%"
echo "AUDIODL_PROGRESS: 100.0%"
echo "[ExtractAudio] Destination: $dir/$id.mp3"
touch "$dir/$id.mp3"
echo "FILE:$dir/$id.mp3"
[ -n "$archive" ] && echo "youtube $id" >> "$archive"
exit 0
"#;

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(unix)]
pub fn fake_yt_dlp(dir: &Path) -> PathBuf {
    write_script(dir, "yt-dlp", FAKE_YT_DLP)
}

/// 只回答 `-version` 的 ffmpeg
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        "#!/bin/sh
echo 'ffmpeg version 6.1-fake Copyright (c) 2000-2023'
",
    )
}

/// 进程仍在运行 (不存在或已成为僵尸进程都视为已结束)
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // 格式: pid (comm) state ...
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}
