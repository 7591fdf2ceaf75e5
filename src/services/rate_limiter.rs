//! Rate limiter for login attempts
//!
//! Two sliding windows guard the login route:
//! - failed attempts per username (5 per 15 minutes)
//! - requests per IP address (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps per key, trimmed to a fixed window
struct SlidingWindow<K> {
    window: Duration,
    limit: usize,
    hits: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(window: Duration, limit: usize) -> Self {
        Self {
            window,
            limit,
            hits: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut hits = self.hits.write().await;
        let entry = hits.entry(key).or_default();
        entry.retain(|t| *t > cutoff);
        entry.len() >= self.limit
    }

    async fn record(&self, key: K, now: DateTime<Utc>) {
        self.hits.write().await.entry(key).or_default().push(now);
    }

    async fn clear(&self, key: &K) {
        self.hits.write().await.remove(key);
    }

    async fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.hits.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    async fn len(&self) -> usize {
        self.hits.read().await.len()
    }
}

/// Login rate limiter
pub struct LoginRateLimiter {
    usernames: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            usernames: SlidingWindow::new(Duration::minutes(15), 5),
            ips: SlidingWindow::new(Duration::minutes(1), 10),
        }
    }

    /// Usernames are case-insensitive
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames
            .is_limited(username.to_lowercase(), Utc::now())
            .await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames
            .record(username.to_lowercase(), Utc::now())
            .await;
    }

    /// Forget failed attempts after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(ip, Utc::now()).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip, Utc::now()).await;
    }

    /// Drop expired entries. Run periodically by the scheduler.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.usernames.prune(now).await;
        self.ips.prune(now).await;
    }

    /// Number of usernames and IPs currently tracked
    pub async fn tracked(&self) -> (usize, usize) {
        (self.usernames.len().await, self.ips.len().await)
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
