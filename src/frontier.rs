//! Frontier and policy seams, plus an in-process frontier implementation.

use crate::classify::RefType;
use heapless::Deque;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use url::Url;

/// Default bounded queue depth for [`MemoryFrontier`].
pub const DEFAULT_FRONTIER_QUEUE: usize = 2048;

/// Reasons a frontier refuses a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontierError {
    /// The string is not a usable absolute URL.
    #[error("invalid url {0:?}: {1}")]
    InvalidUrl(String, url::ParseError),
    /// The URL was already scheduled.
    #[error("already scheduled: {0}")]
    Duplicate(Url),
    /// The bounded queue is at capacity.
    #[error("queue full, dropped {0}")]
    QueueFull(Url),
    /// The URL sits deeper than the crawl allows.
    #[error("depth {depth} exceeds limit {max} for {url}")]
    DepthExceeded {
        /// Rejected URL.
        url: Url,
        /// Depth it would have been queued at.
        depth: u8,
        /// Configured limit.
        max: u8,
    },
    /// The frontier no longer accepts work.
    #[error("frontier shutting down, dropped {0}")]
    ShuttingDown(Url),
}

impl FrontierError {
    /// Duplicates are the expected, high-volume rejection.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, FrontierError::Duplicate(_))
    }
}

/// Shared queue of URLs to visit. Implementations must tolerate concurrent callers.
pub trait Frontier: Send + Sync {
    /// Link distance of `origin` from the crawl seeds.
    fn compute_depth(&self, origin: &Url) -> u8;

    /// Parses and normalizes a raw URL string.
    fn canonicalize(&self, raw: &str) -> Result<Url, FrontierError>;

    /// Schedules `url`, found on `referrer`, for a visit at `depth`.
    fn submit(&self, url: &Url, referrer: &Url, depth: u8) -> Result<(), FrontierError>;
}

/// Policy gate deciding whether a discovered URL is worth pursuing.
pub trait Oracle: Send + Sync {
    /// Returns `true` to follow `url`.
    fn evaluate(&self, url: &Url, referrer: &Url, ref_type: RefType) -> bool;
}

impl<F> Oracle for F
where
    F: Fn(&Url, &Url, RefType) -> bool + Send + Sync,
{
    fn evaluate(&self, url: &Url, referrer: &Url, ref_type: RefType) -> bool {
        self(url, referrer, ref_type)
    }
}

/// The crawl-wide collaborators a document parser reports to.
#[derive(Clone)]
pub struct CrawlHandle {
    frontier: Arc<dyn Frontier>,
    oracle: Arc<dyn Oracle>,
}

impl CrawlHandle {
    /// Bundles a frontier and an oracle.
    pub fn new(frontier: Arc<dyn Frontier>, oracle: Arc<dyn Oracle>) -> Self {
        Self { frontier, oracle }
    }

    /// The shared frontier.
    pub fn frontier(&self) -> &dyn Frontier {
        self.frontier.as_ref()
    }

    /// The shared oracle.
    pub fn oracle(&self) -> &dyn Oracle {
        self.oracle.as_ref()
    }
}

/// A URL waiting in the frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    url: Url,
    referrer: Option<Url>,
    depth: u8,
}

impl QueuedUrl {
    fn new(url: Url, referrer: Option<Url>, depth: u8) -> Self {
        Self {
            url,
            referrer,
            depth,
        }
    }

    /// The canonical URL to visit.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Page the URL was found on; `None` for seeds.
    pub fn referrer(&self) -> Option<&Url> {
        self.referrer.as_ref()
    }

    /// Link distance from the seeds.
    pub fn depth(&self) -> u8 {
        self.depth
    }
}

struct FrontierState<const QUEUE: usize> {
    queue: Deque<QueuedUrl, QUEUE>,
    depths: HashMap<String, u8>,
}

/// A bounded, deduplicating frontier held in memory.
///
/// Every URL ever accepted keeps its depth, so revisits are rejected as
/// duplicates even after they leave the queue.
pub struct MemoryFrontier<const QUEUE: usize> {
    state: Mutex<FrontierState<QUEUE>>,
    max_depth: Option<u8>,
    shutdown: AtomicBool,
}

impl<const QUEUE: usize> MemoryFrontier<QUEUE> {
    /// Constructs an empty frontier without a depth limit.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FrontierState {
                queue: Deque::new(),
                depths: HashMap::new(),
            }),
            max_depth: None,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Constructs an empty frontier that rejects URLs deeper than `max_depth`.
    pub fn with_max_depth(max_depth: Option<u8>) -> Self {
        Self {
            max_depth,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState<QUEUE>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a crawl seed at depth zero.
    pub fn push_seed(&self, url: &Url) -> Result<(), FrontierError> {
        self.enqueue(QueuedUrl::new(url.clone(), None, 0))
    }

    /// Pops the oldest queued URL.
    pub fn next_url(&self) -> Option<QueuedUrl> {
        self.lock().queue.pop_front()
    }

    /// Number of URLs waiting.
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether `url` was ever accepted.
    pub fn contains(&self, url: &Url) -> bool {
        self.lock().depths.contains_key(url.as_str())
    }

    /// Stops accepting new URLs.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn enqueue(&self, entry: QueuedUrl) -> Result<(), FrontierError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(FrontierError::ShuttingDown(entry.url));
        }
        if let Some(max) = self.max_depth {
            if entry.depth > max {
                return Err(FrontierError::DepthExceeded {
                    url: entry.url,
                    depth: entry.depth,
                    max,
                });
            }
        }

        let mut state = self.lock();
        if state.depths.contains_key(entry.url.as_str()) {
            return Err(FrontierError::Duplicate(entry.url));
        }
        let key = entry.url.as_str().to_owned();
        let depth = entry.depth;
        state
            .queue
            .push_back(entry)
            .map_err(|rejected| FrontierError::QueueFull(rejected.url))?;
        state.depths.insert(key, depth);
        Ok(())
    }
}

impl<const QUEUE: usize> Default for MemoryFrontier<QUEUE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const QUEUE: usize> Frontier for MemoryFrontier<QUEUE> {
    /// Unknown pages are treated as seeds.
    fn compute_depth(&self, origin: &Url) -> u8 {
        let key = self
            .canonicalize(origin.as_str())
            .map(String::from)
            .unwrap_or_else(|_| origin.to_string());
        self.lock().depths.get(&key).copied().unwrap_or(0)
    }

    fn canonicalize(&self, raw: &str) -> Result<Url, FrontierError> {
        let mut url =
            Url::parse(raw).map_err(|err| FrontierError::InvalidUrl(raw.to_string(), err))?;
        url.set_fragment(None);
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn submit(&self, url: &Url, referrer: &Url, depth: u8) -> Result<(), FrontierError> {
        self.enqueue(QueuedUrl::new(url.clone(), Some(referrer.clone()), depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn url(raw: &str) -> Url {
        Url::parse(raw).expect("valid url")
    }

    #[test]
    fn seeds_and_submissions_queue_in_order() {
        let frontier = MemoryFrontier::<4>::new();
        let seed = url("https://seed.test/");
        frontier.push_seed(&seed).expect("seed accepted");
        frontier
            .submit(&url("https://seed.test/a"), &seed, 1)
            .expect("link accepted");

        assert_eq!(frontier.pending(), 2);
        let first = frontier.next_url().expect("seed queued");
        assert_eq!(first.url(), &seed);
        assert_eq!(first.referrer(), None);
        let second = frontier.next_url().expect("link queued");
        assert_eq!(second.url().as_str(), "https://seed.test/a");
        assert_eq!(second.referrer(), Some(&seed));
        assert_eq!(second.depth(), 1);
        assert!(frontier.next_url().is_none());
    }

    #[test]
    fn duplicate_urls_rejected_after_dequeue() {
        let frontier = MemoryFrontier::<2>::new();
        let seed = url("https://dup.test/");
        frontier.push_seed(&seed).expect("first seed");
        frontier.next_url().expect("drained");

        let err = frontier.submit(&seed, &seed, 1).expect_err("duplicate");
        assert!(err.is_duplicate());
        assert!(frontier.contains(&seed));
    }

    #[test]
    fn depth_is_remembered() {
        let frontier = MemoryFrontier::<4>::new();
        let seed = url("https://depth.test/");
        let child = url("https://depth.test/child");
        frontier.push_seed(&seed).expect("seed");
        frontier.submit(&child, &seed, 3).expect("child");

        assert_eq!(frontier.compute_depth(&seed), 0);
        assert_eq!(frontier.compute_depth(&url("https://depth.test/child#frag")), 3);
        assert_eq!(frontier.compute_depth(&url("https://unknown.test/")), 0);
    }

    #[test]
    fn full_queue_and_depth_limit() {
        let frontier = MemoryFrontier::<1>::with_max_depth(Some(2));
        let seed = url("https://limits.test/");
        frontier.push_seed(&seed).expect("seed");

        match frontier.submit(&url("https://limits.test/x"), &seed, 1) {
            Err(FrontierError::QueueFull(rejected)) => {
                assert_eq!(rejected.as_str(), "https://limits.test/x")
            }
            other => panic!("expected queue full, got {other:?}"),
        }
        // A full queue must not mark the URL as seen.
        assert!(!frontier.contains(&url("https://limits.test/x")));

        match frontier.submit(&url("https://limits.test/deep"), &seed, 3) {
            Err(FrontierError::DepthExceeded { depth, max, .. }) => {
                assert_eq!((depth, max), (3, 2))
            }
            other => panic!("expected depth exceeded, got {other:?}"),
        }
    }

    #[test]
    fn shutdown_rejects_work() {
        let frontier = MemoryFrontier::<4>::new();
        frontier.shutdown();
        let err = frontier
            .push_seed(&url("https://late.test/"))
            .expect_err("shut down");
        assert!(matches!(err, FrontierError::ShuttingDown(_)));
    }

    #[test]
    fn canonical_form() {
        let frontier = MemoryFrontier::<1>::new();
        let canonical = frontier
            .canonicalize("HTTP://Example.COM:80/a/./b/../c?#top")
            .expect("canonical");
        assert_eq!(canonical.as_str(), "http://example.com/a/c");
        assert_eq!(
            frontier
                .canonicalize("https://example.com")
                .expect("canonical")
                .as_str(),
            "https://example.com/"
        );
        assert!(matches!(
            frontier.canonicalize("/relative/only"),
            Err(FrontierError::InvalidUrl(_, url::ParseError::RelativeUrlWithoutBase))
        ));
    }

    #[test]
    fn closures_act_as_oracles() {
        let only_images = |_: &Url, _: &Url, ref_type: RefType| ref_type == RefType::Image;
        let page = url("https://oracle.test/");
        assert!(only_images.evaluate(&page, &page, RefType::Image));
        assert!(!only_images.evaluate(&page, &page, RefType::Hyperlink));
    }

    #[test]
    fn concurrent_submissions_dedupe() {
        let frontier = Arc::new(MemoryFrontier::<64>::new());
        let seed = url("https://race.test/");
        thread::scope(|scope| {
            for _ in 0..4 {
                let frontier = Arc::clone(&frontier);
                let seed = seed.clone();
                scope.spawn(move || {
                    for idx in 0..8 {
                        let link = seed.join(&format!("page{idx}")).expect("join");
                        let _ = frontier.submit(&link, &seed, 1);
                    }
                });
            }
        });
        assert_eq!(frontier.pending(), 8);
    }
}
