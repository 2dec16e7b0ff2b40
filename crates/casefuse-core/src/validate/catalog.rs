use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::sanitize::{fold_char, sanitize};
use crate::{Error, Result};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
    #[error("Catalog lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogCategory {
    Authority,
    AreaCode,
    StateCode,
    ProductCode,
}

impl CatalogCategory {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authority => "authority",
            Self::AreaCode => "area_code",
            Self::StateCode => "state_code",
            Self::ProductCode => "product_code",
        }
    }
}

impl std::fmt::Display for CatalogCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CatalogCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "authority" => Ok(Self::Authority),
            "area_code" => Ok(Self::AreaCode),
            "state_code" => Ok(Self::StateCode),
            "product_code" => Ok(Self::ProductCode),
            _ => Err(Error::UnknownCatalogCategory(s.to_string())),
        }
    }
}

/// Authoritative vocabulary owned outside the engine.
#[async_trait::async_trait]
pub trait CatalogSource: Send + Sync {
    async fn contains(
        &self,
        category: CatalogCategory,
        value: &str,
    ) -> std::result::Result<bool, CatalogError>;
}

/// Lowercase, accent-folded, single-spaced key used for catalog comparison.
#[must_use]
pub fn catalog_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .map(fold_char)
        .collect()
}

/// Catalog backed by in-process lists, typically loaded from a TOML file of the form
/// `authority = ["...", ...]`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: HashMap<CatalogCategory, HashSet<String>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries<I, S>(mut self, category: CatalogCategory, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self.entries.entry(category).or_default();
        set.extend(values.into_iter().map(|v| catalog_key(v.as_ref())));
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> = toml::from_str(content)?;
        let mut catalog = Self::new();
        for (name, values) in raw {
            let category: CatalogCategory = name.parse()?;
            catalog = catalog.with_entries(category, values);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    #[must_use]
    pub fn len(&self, category: CatalogCategory) -> usize {
        self.entries.get(&category).map_or(0, HashSet::len)
    }
}

#[async_trait::async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn contains(
        &self,
        category: CatalogCategory,
        value: &str,
    ) -> std::result::Result<bool, CatalogError> {
        Ok(self
            .entries
            .get(&category)
            .is_some_and(|set| set.contains(&catalog_key(value))))
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    present: bool,
    stored_at: Instant,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<(CatalogCategory, String), CacheEntry>,
    last_sweep: Instant,
}

impl CacheState {
    fn sweep(&mut self, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        self.last_sweep = Instant::now();
        before - self.entries.len()
    }
}

/// Time-bounded lookup cache shared by concurrent reconciliation runs.
///
/// Expired entries are swept on insert at most once per TTL, so the map
/// stays bounded by what was looked up within roughly two TTLs.
#[derive(Debug)]
pub struct CatalogCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl CatalogCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, category: CatalogCategory, key: &str) -> Option<bool> {
        let state = self.state.read().await;
        let entry = state.entries.get(&(category, key.to_string()))?;
        (entry.stored_at.elapsed() < self.ttl).then_some(entry.present)
    }

    pub async fn insert(&self, category: CatalogCategory, key: String, present: bool) {
        let mut state = self.state.write().await;
        if state.last_sweep.elapsed() >= self.ttl {
            let removed = state.sweep(self.ttl);
            if removed > 0 {
                tracing::debug!(removed, "Swept expired catalog cache entries");
            }
        }
        let entry = CacheEntry {
            present,
            stored_at: Instant::now(),
        };
        state.entries.insert((category, key), entry);
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.state.write().await.sweep(self.ttl)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }
}

/// Checks values against an authoritative catalog.
///
/// A missing, failing, or slow catalog degrades to "not validated" (`false`);
/// catalog membership only ever boosts confidence.
#[derive(Clone)]
pub struct CatalogValidator {
    source: Arc<dyn CatalogSource>,
    cache: Arc<CatalogCache>,
    timeout: Duration,
}

impl CatalogValidator {
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, cache: Arc<CatalogCache>) -> Self {
        Self {
            source,
            cache,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    pub async fn is_in_catalog(&self, category: CatalogCategory, value: &str) -> bool {
        let Some(clean) = sanitize(Some(value)) else {
            return false;
        };
        let key = catalog_key(&clean);

        if let Some(present) = self.cache.get(category, &key).await {
            return present;
        }

        match tokio::time::timeout(self.timeout, self.source.contains(category, &clean)).await {
            Ok(Ok(present)) => {
                self.cache.insert(category, key, present).await;
                present
            }
            Ok(Err(e)) => {
                tracing::warn!("Catalog {} lookup degraded to unvalidated: {}", category, e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Catalog {} lookup timed out after {:?}; treating as unvalidated",
                    category,
                    self.timeout
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for CatalogValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogValidator")
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCatalog {
        inner: InMemoryCatalog,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogSource for CountingCatalog {
        async fn contains(
            &self,
            category: CatalogCategory,
            value: &str,
        ) -> std::result::Result<bool, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.contains(category, value).await
        }
    }

    struct DownCatalog;

    #[async_trait::async_trait]
    impl CatalogSource for DownCatalog {
        async fn contains(
            &self,
            _category: CatalogCategory,
            _value: &str,
        ) -> std::result::Result<bool, CatalogError> {
            Err(CatalogError::Unavailable("connection refused".into()))
        }
    }

    struct SlowCatalog;

    #[async_trait::async_trait]
    impl CatalogSource for SlowCatalog {
        async fn contains(
            &self,
            _category: CatalogCategory,
            _value: &str,
        ) -> std::result::Result<bool, CatalogError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    fn authorities() -> InMemoryCatalog {
        InMemoryCatalog::new().with_entries(
            CatalogCategory::Authority,
            ["Fiscalía General de la República", "SAT"],
        )
    }

    #[tokio::test]
    async fn test_in_memory_catalog_folds_case_and_accents() {
        let catalog = authorities();
        assert!(catalog
            .contains(CatalogCategory::Authority, "FISCALIA GENERAL  DE LA REPUBLICA")
            .await
            .unwrap());
        assert!(!catalog
            .contains(CatalogCategory::AreaCode, "SAT")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_from_toml() {
        let catalog = InMemoryCatalog::from_toml_str(
            r#"
            authority = ["SAT", "UIF"]
            state_code = ["CDMX", "JAL"]
            "#,
        )
        .unwrap();
        assert_eq!(catalog.len(CatalogCategory::Authority), 2);
        assert_eq!(catalog.len(CatalogCategory::StateCode), 2);
    }

    #[test]
    fn test_from_toml_rejects_unknown_category() {
        let err = InMemoryCatalog::from_toml_str(r#"planet = ["Mars"]"#).unwrap_err();
        assert!(matches!(err, Error::UnknownCatalogCategory(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hits_until_ttl_expires() {
        let source = Arc::new(CountingCatalog {
            inner: authorities(),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(CatalogCache::new(Duration::from_secs(60)));
        let validator = CatalogValidator::new(source.clone(), cache.clone());

        assert!(validator.is_in_catalog(CatalogCategory::Authority, "SAT").await);
        assert!(validator.is_in_catalog(CatalogCategory::Authority, "sat").await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(validator.is_in_catalog(CatalogCategory::Authority, "SAT").await);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = CatalogCache::new(Duration::from_secs(10));
        cache.insert(CatalogCategory::Authority, "sat".into(), true).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert(CatalogCategory::Authority, "uif".into(), false).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(CatalogCategory::Authority, "uif").await, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_sweep_expired_entries() {
        let cache = Arc::new(CatalogCache::new(Duration::from_secs(60)));
        let validator = CatalogValidator::new(Arc::new(authorities()), cache.clone());

        assert!(validator.is_in_catalog(CatalogCategory::Authority, "SAT").await);
        assert!(!validator.is_in_catalog(CatalogCategory::Authority, "UIF").await);
        assert_eq!(cache.len().await, 2);

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(
            validator
                .is_in_catalog(CatalogCategory::Authority, "Fiscalia General de la Republica")
                .await
        );
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_catalog_degrades_to_false() {
        let cache = Arc::new(CatalogCache::default());
        let validator = CatalogValidator::new(Arc::new(DownCatalog), cache.clone());

        assert!(!validator.is_in_catalog(CatalogCategory::Authority, "SAT").await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_catalog_times_out() {
        let cache = Arc::new(CatalogCache::default());
        let validator = CatalogValidator::new(Arc::new(SlowCatalog), cache)
            .with_timeout(Duration::from_secs(1));

        assert!(!validator.is_in_catalog(CatalogCategory::Authority, "SAT").await);
    }

    #[tokio::test]
    async fn test_blank_value_is_not_in_catalog() {
        let validator =
            CatalogValidator::new(Arc::new(authorities()), Arc::new(CatalogCache::default()));
        assert!(!validator.is_in_catalog(CatalogCategory::Authority, "   ").await);
        assert!(!validator.is_in_catalog(CatalogCategory::Authority, "NO SE CUENTA").await);
    }
}
