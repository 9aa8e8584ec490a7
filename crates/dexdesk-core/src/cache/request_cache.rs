use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Consider cached query data stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

/// Composite cache key, e.g. `["tokens", "2"]`.
///
/// `invalidate` and `remove` match by prefix, so `["tokens"]` addresses every
/// cached page of the tokens resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Key for one page of a resource listing
    pub fn page(resource: &str, page: u32) -> Self {
        Self::new([resource.to_string(), page.to_string()])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl From<&str> for QueryKey {
    fn from(segment: &str) -> Self {
        Self(vec![segment.to_string()])
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(segments: [&str; N]) -> Self {
        Self::new(segments)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug)]
struct Entry {
    cached: CachedData<Value>,
    invalidated: bool,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        !self.invalidated && !self.cached.is_stale()
    }
}

/// Process-wide, key-addressed cache of fetched values.
///
/// Holds the in-memory mirror of the credential keys alongside cached domain
/// query results. It also carries the credential generation: a counter bumped
/// on every credential write so dependent readers can tell that the token they
/// used is no longer current.
pub struct RequestCache {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    generation: watch::Sender<u64>,
}

impl RequestCache {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            generation,
        }
    }

    /// Read a value regardless of staleness
    pub fn read(&self, key: &QueryKey) -> Option<Value> {
        self.entries.read().get(key).map(|e| e.cached.data.clone())
    }

    /// Read a value only if it has been neither invalidated nor aged out
    pub fn read_fresh(&self, key: &QueryKey) -> Option<Value> {
        self.entries
            .read()
            .get(key)
            .filter(|e| e.is_fresh())
            .map(|e| e.cached.data.clone())
    }

    pub fn read_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        Self::decode(key, self.read(key)?)
    }

    pub fn read_fresh_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        Self::decode(key, self.read_fresh(key)?)
    }

    fn decode<T: DeserializeOwned>(key: &QueryKey, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    pub fn write(&self, key: QueryKey, value: Value) {
        self.entries.write().insert(
            key,
            Entry {
                cached: CachedData::new(value),
                invalidated: false,
            },
        );
    }

    pub fn write_as<T: Serialize + ?Sized>(&self, key: QueryKey, data: &T) -> Result<(), serde_json::Error> {
        self.write(key, serde_json::to_value(data)?);
        Ok(())
    }

    /// Mark every entry under `prefix` stale. Returns how many were marked.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.starts_with(prefix) {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(prefix = %prefix, count, "Invalidated cache entries");
        count
    }

    /// Drop every entry under `prefix`. Returns how many were dropped.
    pub fn remove(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    /// Mark every entry stale except the exact keys in `keep`
    pub fn invalidate_except(&self, keep: &[QueryKey]) -> usize {
        let mut entries = self.entries.write();
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if !keep.contains(key) {
                entry.invalidated = true;
                count += 1;
            }
        }
        debug!(count, "Invalidated all cached queries");
        count
    }

    /// Drop every entry
    pub fn remove_all(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.read().get(key).map(|e| !e.is_fresh()).unwrap_or(true)
    }

    /// Age of an entry for display, e.g. `5m ago`
    pub fn age_display(&self, key: &QueryKey) -> Option<String> {
        self.entries.read().get(key).map(|e| e.cached.age_display())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn credential_generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub(crate) fn bump_credential_generation(&self) -> u64 {
        let mut next = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            next = *g;
        });
        next
    }

    /// Watch credential changes. The value is the credential generation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_cached_data_age_display_just_now() {
        let cached = CachedData::new(vec![1, 2, 3]);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_age_display_rounding() {
        let mut cached = CachedData::new(());
        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");
        cached.cached_at = Utc::now() - Duration::hours(30);
        assert_eq!(cached.age_display(), "1d ago");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_invalidate_by_prefix_covers_all_pages() {
        let cache = RequestCache::new();
        cache.write(QueryKey::page("tokens", 0), json!({"total": 1}));
        cache.write(QueryKey::page("tokens", 1), json!({"total": 1}));
        cache.write(QueryKey::page("trades", 0), json!({"total": 2}));

        assert_eq!(cache.invalidate(&"tokens".into()), 2);
        assert!(cache.read_fresh(&QueryKey::page("tokens", 0)).is_none());
        assert!(cache.read_fresh(&QueryKey::page("tokens", 1)).is_none());
        // Still readable, just not fresh
        assert!(cache.read(&QueryKey::page("tokens", 1)).is_some());
        assert!(cache.read_fresh(&QueryKey::page("trades", 0)).is_some());
    }

    #[test]
    fn test_write_after_invalidate_is_fresh_again() {
        let cache = RequestCache::new();
        let key = QueryKey::page("tokens", 0);
        cache.write(key.clone(), json!(1));
        cache.invalidate(&key);
        assert!(cache.is_stale(&key));
        cache.write(key.clone(), json!(2));
        assert_eq!(cache.read_fresh(&key), Some(json!(2)));
    }

    #[test]
    fn test_remove_drops_entries() {
        let cache = RequestCache::new();
        cache.write("access_token".into(), json!("a-1"));
        cache.write(["tokens", "0"].into(), json!([]));
        assert_eq!(cache.remove(&"access_token".into()), 1);
        assert!(cache.read(&"access_token".into()).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_except_keeps_listed_keys_fresh() {
        let cache = RequestCache::new();
        cache.write("access_token".into(), json!("a-1"));
        cache.write(["tokens", "0"].into(), json!([]));
        cache.write(["trades", "detail", "3"].into(), json!({}));

        assert_eq!(cache.invalidate_except(&[QueryKey::from("access_token")]), 2);
        assert!(!cache.is_stale(&"access_token".into()));
        assert!(cache.is_stale(&["tokens", "0"].into()));
        assert!(cache.is_stale(&["trades", "detail", "3"].into()));

        assert_eq!(cache.remove_all(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prefix_matching_is_segment_wise() {
        let key: QueryKey = ["tokens", "10"].into();
        assert!(key.starts_with(&"tokens".into()));
        assert!(!key.starts_with(&["tokens", "1"].into()));
        assert!(!QueryKey::from("token-dropdown").starts_with(&"token".into()));
    }

    #[test]
    fn test_typed_round_trip_and_bad_shape() {
        let cache = RequestCache::new();
        let key: QueryKey = "numbers".into();
        cache.write_as(key.clone(), &vec![1u32, 2]).expect("serialize");
        assert_eq!(cache.read_as::<Vec<u32>>(&key), Some(vec![1, 2]));
        assert_eq!(cache.read_as::<String>(&key), None);
    }

    #[tokio::test]
    async fn test_generation_bump_notifies_subscribers() {
        let cache = RequestCache::new();
        let mut rx = cache.subscribe();
        assert_eq!(cache.bump_credential_generation(), 1);
        rx.changed().await.expect("sender alive");
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(cache.credential_generation(), 1);
    }
}
