// src/config/env.rs

//! `AUDIODL_*` 环境变量覆盖配置文件中的值

use crate::{config::ExternalConfig, utils::parse_bool};
use log::{debug, warn};

pub const ENV_PREFIX: &str = "AUDIODL_";

fn set_bool(target: &mut bool, key: &str, value: &str) {
    match parse_bool(value) {
        Some(v) => *target = v,
        None => warn!("忽略环境变量 {}{}: '{}' 不是有效的布尔值", ENV_PREFIX, key, value),
    }
}

/// `lookup` 接收带前缀的完整变量名。空值和无法解析的布尔值不覆盖原值。
pub fn apply_env_overrides(config: &mut ExternalConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(&format!("{}{}", ENV_PREFIX, key)).filter(|v| !v.trim().is_empty())
    };

    if let Some(v) = get("DOWNLOAD_DIR") {
        config.download_dir = v;
    }
    if let Some(v) = get("TMP_DIR") {
        config.tmp_dir = Some(v);
    }
    if let Some(v) = get("YT_DLP_PATH") {
        config.yt_dlp_path = v;
    }
    if let Some(v) = get("FFMPEG_PATH") {
        config.ffmpeg_path = Some(v);
    }
    if let Some(v) = get("COOKIES_PATH") {
        config.cookies_path = Some(v);
    }
    if let Some(v) = get("AUDIO_FORMAT") {
        config.audio_format = v;
    }
    if let Some(v) = get("AUDIO_QUALITY") {
        config.audio_quality = v;
    }
    if let Some(v) = get("ARCHIVE_PATH") {
        config.archive_path = Some(v);
    }

    let flags: [(&str, &mut bool); 6] = [
        ("OVERWRITE", &mut config.overwrite),
        ("USE_ARCHIVE", &mut config.use_archive),
        ("LOUDNORM", &mut config.loudnorm),
        ("EMBED_THUMBNAIL", &mut config.embed_thumbnail),
        ("PARSE_METADATA", &mut config.parse_metadata),
        ("STRIP_EMOJIS", &mut config.strip_emojis),
    ];
    for (key, target) in flags {
        if let Some(v) = get(key) {
            set_bool(target, key, &v);
        }
    }
    debug!("已应用环境变量覆盖");
}
