use crate::transport::lock;
use crate::uri::BrokerUri;
use rand::Rng;
use std::sync::Mutex;
use tracing::trace;

#[derive(Debug, Default)]
struct Pool {
    uris: Vec<BrokerUri>,
    priority: Option<BrokerUri>,
    randomize: bool,
}

/// Thread-safe set of candidate broker URIs.
///
/// [`UriPool::get_uri`] takes a candidate out of the pool; callers return it
/// with [`UriPool::add_uri`] once they are done with it. The first URI ever
/// added is remembered as the priority URI.
#[derive(Debug, Default)]
pub struct UriPool {
    pool: Mutex<Pool>,
}

impl UriPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_uris(uris: impl IntoIterator<Item = BrokerUri>) -> Self {
        let pool = Self::new();
        pool.add_uris(uris);
        pool
    }

    /// Removes and returns a candidate: the first one, or a uniformly random
    /// one when randomization is on. `None` when the pool is empty.
    pub fn get_uri(&self) -> Option<BrokerUri> {
        let mut pool = lock(&self.pool);
        if pool.uris.is_empty() {
            return None;
        }
        let index = if pool.randomize {
            rand::thread_rng().gen_range(0..pool.uris.len())
        } else {
            0
        };
        let uri = pool.uris.remove(index);
        trace!(uri = %uri, "Took URI from pool");
        Some(uri)
    }

    /// Adds `uri` unless it is already present. Returns whether it was added.
    pub fn add_uri(&self, uri: BrokerUri) -> bool {
        let mut pool = lock(&self.pool);
        if pool.uris.contains(&uri) {
            return false;
        }
        if pool.priority.is_none() {
            pool.priority = Some(uri.clone());
        }
        pool.uris.push(uri);
        true
    }

    pub fn add_uris(&self, uris: impl IntoIterator<Item = BrokerUri>) {
        for uri in uris {
            self.add_uri(uri);
        }
    }

    pub fn remove_uri(&self, uri: &BrokerUri) -> bool {
        let mut pool = lock(&self.pool);
        let before = pool.uris.len();
        pool.uris.retain(|candidate| candidate != uri);
        pool.uris.len() != before
    }

    pub fn contains(&self, uri: &BrokerUri) -> bool {
        lock(&self.pool).uris.contains(uri)
    }

    pub fn len(&self) -> usize {
        lock(&self.pool).uris.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.pool).uris.is_empty()
    }

    pub fn priority_uri(&self) -> Option<BrokerUri> {
        lock(&self.pool).priority.clone()
    }

    pub fn is_priority(&self, uri: &BrokerUri) -> bool {
        lock(&self.pool).priority.as_ref() == Some(uri)
    }

    pub fn is_randomize(&self) -> bool {
        lock(&self.pool).randomize
    }

    pub fn set_randomize(&self, randomize: bool) {
        lock(&self.pool).randomize = randomize;
    }

    /// Snapshot of the URIs currently in the pool.
    pub fn uris(&self) -> Vec<BrokerUri> {
        lock(&self.pool).uris.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn uri(text: &str) -> BrokerUri {
        BrokerUri::parse(text).unwrap()
    }

    #[test]
    fn duplicates_are_ignored() {
        let pool = UriPool::new();
        assert!(pool.add_uri(uri("tcp://a:1")));
        assert!(!pool.add_uri(uri("tcp://a:1")));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn drained_pool_recovers_after_add() {
        let pool = UriPool::with_uris([uri("tcp://a:1"), uri("tcp://b:2")]);
        assert_eq!(pool.get_uri(), Some(uri("tcp://a:1")));
        assert_eq!(pool.get_uri(), Some(uri("tcp://b:2")));
        assert_eq!(pool.get_uri(), None);
        assert!(pool.is_empty());

        pool.add_uri(uri("tcp://a:1"));
        assert_eq!(pool.get_uri(), Some(uri("tcp://a:1")));
    }

    #[test]
    fn first_uri_added_is_the_priority_uri() {
        let pool = UriPool::new();
        assert_eq!(pool.priority_uri(), None);
        pool.add_uris([uri("tcp://a:1"), uri("tcp://b:2")]);
        pool.get_uri();
        pool.get_uri();
        pool.add_uri(uri("tcp://b:2"));
        assert_eq!(pool.priority_uri(), Some(uri("tcp://a:1")));
        assert!(pool.is_priority(&uri("tcp://a:1")));
        assert!(!pool.is_priority(&uri("tcp://b:2")));
    }

    #[test]
    fn remove_uri_reports_presence() {
        let pool = UriPool::with_uris([uri("tcp://a:1")]);
        assert!(pool.remove_uri(&uri("tcp://a:1")));
        assert!(!pool.remove_uri(&uri("tcp://a:1")));
    }

    #[test]
    fn randomized_selection_returns_every_uri_once() {
        let all: Vec<_> = (0..16).map(|i| uri(&format!("tcp://h{i}:1"))).collect();
        let pool = UriPool::with_uris(all.clone());
        pool.set_randomize(true);

        let mut seen = HashSet::new();
        while let Some(uri) = pool.get_uri() {
            assert!(seen.insert(uri));
        }
        assert_eq!(seen, all.into_iter().collect());
    }
}
