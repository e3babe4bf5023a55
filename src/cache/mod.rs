use anyhow::Result;
use chrono::Utc;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

use crate::config::CacheConfig;
use crate::llm::client::types::TokenUsage;

pub mod performance_monitor;
pub use performance_monitor::{CachePerformanceMonitor, CachePerformanceReport};

/// On-disk cache of structured LLM results, keyed by the md5 of the prompt.
pub struct CacheManager {
    config: CacheConfig,
    performance_monitor: CachePerformanceMonitor,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Unix seconds at write time
    pub timestamp: i64,
    pub prompt_hash: String,
    pub token_usage: Option<TokenUsage>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            performance_monitor: CachePerformanceMonitor::new(),
        }
    }

    pub fn hash_prompt(&self, prompt: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn get_cache_path(&self, category: &str, hash: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(category)
            .join(format!("{}.json", hash))
    }

    fn is_expired(&self, timestamp: i64) -> bool {
        let expire_seconds = (self.config.expire_hours * 3600) as i64;
        Utc::now().timestamp() - timestamp > expire_seconds
    }

    pub async fn get<T>(&self, category: &str, prompt: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }

        let hash = self.hash_prompt(prompt);
        let cache_path = self.get_cache_path(category, &hash);

        if !cache_path.exists() {
            self.performance_monitor.record_cache_miss(category);
            return Ok(None);
        }

        let content = match fs::read_to_string(&cache_path).await {
            Ok(content) => content,
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("read failed: {}", e));
                return Ok(None);
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&content) {
            Ok(entry) if self.is_expired(entry.timestamp) => {
                let _ = fs::remove_file(&cache_path).await;
                self.performance_monitor.record_cache_miss(category);
                Ok(None)
            }
            Ok(entry) => {
                self.performance_monitor
                    .record_cache_hit(category, entry.token_usage.unwrap_or_default());
                Ok(Some(entry.data))
            }
            Err(e) => {
                self.performance_monitor
                    .record_cache_error(category, &format!("deserialization failed: {}", e));
                Ok(None)
            }
        }
    }

    pub async fn set<T>(&self, category: &str, prompt: &str, data: T) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(category, prompt, data, None).await
    }

    pub async fn set_with_tokens<T>(
        &self,
        category: &str,
        prompt: &str,
        data: T,
        token_usage: TokenUsage,
    ) -> Result<()>
    where
        T: Serialize,
    {
        self.write_entry(category, prompt, data, Some(token_usage))
            .await
    }

    async fn write_entry<T>(
        &self,
        category: &str,
        prompt: &str,
        data: T,
        token_usage: Option<TokenUsage>,
    ) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let hash = self.hash_prompt(prompt);
        let cache_path = self.get_cache_path(category, &hash);

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            data,
            timestamp: Utc::now().timestamp(),
            prompt_hash: hash,
            token_usage,
        };

        let content = serde_json::to_string_pretty(&entry).inspect_err(|e| {
            self.performance_monitor
                .record_cache_error(category, &format!("serialization failed: {}", e))
        })?;
        fs::write(&cache_path, content).await.inspect_err(|e| {
            self.performance_monitor
                .record_cache_error(category, &format!("write failed: {}", e))
        })?;
        self.performance_monitor.record_cache_write(category);
        Ok(())
    }

    pub fn generate_performance_report(&self) -> CachePerformanceReport {
        self.performance_monitor.generate_report()
    }
}
