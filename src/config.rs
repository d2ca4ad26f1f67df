//! Cache construction parameters.

use serde::Deserialize;

/// Construction parameters for a [`LoadingVolatileCache`].
///
/// All fields have defaults, so a partial config (e.g. loaded from a
/// viewer's settings file) fills in the rest.
///
/// [`LoadingVolatileCache`]: crate::cache::LoadingVolatileCache
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of priority levels, i.e. the highest occurring mip level
    /// plus one.
    pub max_num_levels: usize,
    /// Number of fetcher threads draining the queue.
    pub num_fetcher_threads: usize,
    /// Maximum number of loaded entries retained in the soft tier before
    /// demotion kicks in.
    pub soft_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_num_levels: 1,
            num_fetcher_threads: 1,
            soft_capacity: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_num_levels, 1);
        assert_eq!(config.num_fetcher_threads, 1);
        assert_eq!(config.soft_capacity, 4096);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"max_num_levels": 6, "num_fetcher_threads": 4}"#).unwrap();
        assert_eq!(config.max_num_levels, 6);
        assert_eq!(config.num_fetcher_threads, 4);
        assert_eq!(config.soft_capacity, 4096);
    }
}
