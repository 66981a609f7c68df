//! Admission Gate
//!
//! Rate limits checked before each list page and each file request. The
//! gateway only sees the [`AdmissionGate`] trait; the fixed-window limiter
//! here is the implementation the binary wires in from configuration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;

/// Decides whether one more operation against a bucket may proceed
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Returns false when the bucket's budget is exhausted
    async fn check(&self, bucket_key: &str) -> bool;
}

/// Gate that admits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AdmissionGate for AllowAll {
    async fn check(&self, _bucket_key: &str) -> bool {
        true
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    limit: u32,
    period: Duration,
}

/// Fixed-window rate limiter keyed by bucket
///
/// Buckets without a rule are always admitted.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    rules: HashMap<String, Rule>,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Create a limiter with no rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a limiter from configured rules
    pub fn from_config(rules: &[RateLimitConfig]) -> Self {
        rules.iter().fold(Self::new(), |limiter, rule| {
            limiter.with_rule(&rule.bucket, rule.limit, rule.period())
        })
    }

    /// Admit at most `limit` operations on `bucket` per `period`
    pub fn with_rule(mut self, bucket: &str, limit: u32, period: Duration) -> Self {
        self.rules.insert(bucket.to_string(), Rule { limit, period });
        self
    }

    /// Number of buckets with a rule
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    async fn check_at(&self, bucket_key: &str, now: Instant) -> bool {
        let Some(rule) = self.rules.get(bucket_key).copied() else {
            return true;
        };

        let mut windows = self.windows.lock().await;
        let window = windows
            .entry(bucket_key.to_string())
            .or_insert(Window { started: now, used: 0 });

        if now.duration_since(window.started) >= rule.period {
            window.started = now;
            window.used = 0;
        }

        if window.used >= rule.limit {
            tracing::warn!("Rate limit reached for bucket {}", bucket_key);
            return false;
        }

        window.used += 1;
        true
    }
}

#[async_trait]
impl AdmissionGate for FixedWindowLimiter {
    async fn check(&self, bucket_key: &str) -> bool {
        self.check_at(bucket_key, Instant::now()).await
    }
}
