// src/provider/registry.rs

use super::{Provider, catalog::CatalogProvider, youtube::YouTubeProvider};
use crate::error::{AppError, AppResult};
use log::{debug, warn};
use std::panic::{self, AssertUnwindSafe};

fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

struct Entry {
    id: String,
    provider: Box<dyn Provider>,
}

/// 按注册顺序保存提供者。查找时第一个匹配的胜出。
#[derive(Default)]
pub struct ProviderRegistry {
    entries: Vec<Entry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置的提供者: YouTube、Spotify、Apple Music
    pub fn with_defaults(youtube: YouTubeProvider) -> AppResult<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(youtube))?;
        registry.register(Box::new(CatalogProvider::spotify()))?;
        registry.register(Box::new(CatalogProvider::apple_music()))?;
        Ok(registry)
    }

    /// 重复的 ID 会被拒绝，此时注册表保持不变
    pub fn register(&mut self, provider: Box<dyn Provider>) -> AppResult<()> {
        let id = normalize_id(provider.id());
        if id.is_empty() {
            return Err(AppError::InvalidProviderId);
        }
        if self.entries.iter().any(|e| e.id == id) {
            return Err(AppError::DuplicateProvider(id));
        }
        debug!("注册提供者: {}", id);
        self.entries.push(Entry { id, provider });
        Ok(())
    }

    /// 已注册的 ID，按注册顺序
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &dyn Provider> {
        self.entries.iter().map(|e| e.provider.as_ref())
    }

    pub fn get(&self, id: &str) -> AppResult<&dyn Provider> {
        let wanted = normalize_id(id);
        self.entries
            .iter()
            .find(|e| e.id == wanted)
            .map(|e| e.provider.as_ref())
            .ok_or_else(|| AppError::NoProvider {
                reference: id.to_string(),
                registered: self.ids(),
            })
    }

    pub fn find_for_reference(&self, reference: &str) -> AppResult<&dyn Provider> {
        for entry in &self.entries {
            let matched = panic::catch_unwind(AssertUnwindSafe(|| entry.provider.can_handle(reference)))
                .unwrap_or_else(|_| {
                    warn!("提供者 '{}' 在识别 '{}' 时崩溃，视为不匹配", entry.id, reference);
                    false
                });
            if matched {
                debug!("'{}' 由提供者 '{}' 处理", reference, entry.id);
                return Ok(entry.provider.as_ref());
            }
        }
        Err(AppError::NoProvider {
            reference: reference.to_string(),
            registered: self.ids(),
        })
    }
}
