use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::llm::client::types::TokenUsage;

/// Hit/miss accounting for the LLM result cache.
#[derive(Clone, Default)]
pub struct CachePerformanceMonitor {
    metrics: Arc<CacheMetrics>,
}

#[derive(Default)]
pub struct CacheMetrics {
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
    pub cache_writes: AtomicUsize,
    pub cache_errors: AtomicUsize,
    pub total_input_tokens_saved: AtomicUsize,
    pub total_output_tokens_saved: AtomicUsize,
    pub category_metrics: RwLock<HashMap<String, CategoryMetrics>>,
}

#[derive(Default)]
pub struct CategoryMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachePerformanceReport {
    pub hit_rate: f64,
    pub total_operations: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_writes: usize,
    pub cache_errors: usize,
    pub input_tokens_saved: usize,
    pub output_tokens_saved: usize,
    pub category_stats: HashMap<String, CategoryPerformanceStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryPerformanceStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

fn ratio(hits: f64, total: f64) -> f64 {
    if total > 0.0 { hits / total } else { 0.0 }
}

impl CachePerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self, category: &str, token_usage: TokenUsage) {
        self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_input_tokens_saved
            .fetch_add(token_usage.input_tokens, Ordering::Relaxed);
        self.metrics
            .total_output_tokens_saved
            .fetch_add(token_usage.output_tokens, Ordering::Relaxed);

        if let Ok(mut category_map) = self.metrics.category_metrics.write() {
            let category_metrics = category_map.entry(category.to_string()).or_default();
            category_metrics.hits.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            category,
            input_tokens = token_usage.input_tokens,
            output_tokens = token_usage.output_tokens,
            "Cache hit"
        );
    }

    pub fn record_cache_miss(&self, category: &str) {
        self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut category_map) = self.metrics.category_metrics.write() {
            let category_metrics = category_map.entry(category.to_string()).or_default();
            category_metrics.misses.fetch_add(1, Ordering::Relaxed);
        }

        debug!(category, "Cache miss");
    }

    pub fn record_cache_write(&self, category: &str) {
        self.metrics.cache_writes.fetch_add(1, Ordering::Relaxed);
        debug!(category, "Cache write");
    }

    pub fn record_cache_error(&self, category: &str, error: &str) {
        self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
        warn!(category, error, "Cache error");
    }

    pub fn generate_report(&self) -> CachePerformanceReport {
        let hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let misses = self.metrics.cache_misses.load(Ordering::Relaxed);
        let total_operations = hits + misses;

        let category_stats = match self.metrics.category_metrics.read() {
            Ok(category_map) => category_map
                .iter()
                .map(|(category, metrics)| {
                    let cat_hits = metrics.hits.load(Ordering::Relaxed);
                    let cat_misses = metrics.misses.load(Ordering::Relaxed);
                    (
                        category.clone(),
                        CategoryPerformanceStats {
                            hits: cat_hits,
                            misses: cat_misses,
                            hit_rate: ratio(cat_hits as f64, (cat_hits + cat_misses) as f64),
                        },
                    )
                })
                .collect(),
            Err(_) => HashMap::new(),
        };

        CachePerformanceReport {
            hit_rate: ratio(hits as f64, total_operations as f64),
            total_operations,
            cache_hits: hits,
            cache_misses: misses,
            cache_writes: self.metrics.cache_writes.load(Ordering::Relaxed),
            cache_errors: self.metrics.cache_errors.load(Ordering::Relaxed),
            input_tokens_saved: self.metrics.total_input_tokens_saved.load(Ordering::Relaxed),
            output_tokens_saved: self
                .metrics
                .total_output_tokens_saved
                .load(Ordering::Relaxed),
            category_stats,
        }
    }
}
