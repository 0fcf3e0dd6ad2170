//! Link discovery layered over a [`TagSource`].
//!
//! [`DiscoveryParser`] reads exactly like the tokenizer it wraps: every token
//! is handed back unchanged. Each time a tag closes, the tag is classified,
//! resolved against the current base URL, and offered to the crawl's oracle
//! and frontier before the read returns.
//!
//! Failures on a single reference never reach the caller. Malformed or
//! invalid URLs are logged at `INFO`; scheme and policy drops are silent;
//! only I/O errors from the underlying source propagate.

use crate::classify::{classify, Classified, Reference};
use crate::frontier::CrawlHandle;
use crate::resolver::{resolve, resolve_without_fragment};
use crate::tokenizer::{Tag, TagSource, Token};
use std::io;
use tracing::{debug, info, trace};
use url::Url;

/// Per-document counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Tag boundaries observed.
    pub tags_seen: usize,
    /// References produced by the classifier.
    pub references_found: usize,
    /// References that failed to resolve.
    pub malformed: usize,
    /// References the frontier refused to canonicalize or accept.
    pub rejected: usize,
    /// References dropped for a non-HTTP scheme.
    pub scheme_filtered: usize,
    /// References the oracle declined.
    pub declined: usize,
    /// References accepted by the frontier.
    pub submitted: usize,
    /// Successful `<base href>` redefinitions.
    pub base_updates: usize,
}

/// Parses one document and feeds the links it finds into the crawl.
pub struct DiscoveryParser<S> {
    source: S,
    handle: CrawlHandle,
    origin: Url,
    base: Url,
    depth: u8,
    stats: DiscoveryStats,
}

impl<S: TagSource> DiscoveryParser<S> {
    /// Wraps `source`, the document fetched from `origin`.
    pub fn new(origin: Url, source: S, handle: CrawlHandle) -> Self {
        let depth = handle.frontier().compute_depth(&origin);
        Self {
            source,
            handle,
            base: origin.clone(),
            origin,
            depth,
            stats: DiscoveryStats::default(),
        }
    }

    /// Reads one token, processing the tag first when one just closed.
    pub fn read(&mut self) -> io::Result<Token> {
        let token = self.source.read_token()?;
        if token == Token::TagBoundary {
            self.handle_tag();
        }
        Ok(token)
    }

    /// Reads the whole document, discarding its characters.
    pub fn read_all(&mut self) -> io::Result<()> {
        while self.read()? != Token::EndOfStream {}
        Ok(())
    }

    /// Reads the whole document, returning its text.
    pub fn read_text(&mut self) -> io::Result<String> {
        let mut text = String::new();
        loop {
            match self.read()? {
                Token::Char(ch) => text.push(ch),
                Token::TagBoundary => {}
                Token::EndOfStream => return Ok(text),
            }
        }
    }

    /// URL the document was fetched from.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Base URL relative references currently resolve against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Depth of this document; discoveries are submitted one deeper.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Releases the wrapped source.
    pub fn into_inner(self) -> S {
        self.source
    }

    fn handle_tag(&mut self) {
        self.stats.tags_seen += 1;
        match classify(self.source.tag(), &self.base) {
            Some(Classified::BaseUpdate(href)) => self.update_base(&href),
            Some(Classified::Discovery(reference)) => self.discover(reference),
            None => {}
        }
    }

    fn update_base(&mut self, href: &str) {
        match resolve(&self.base, href) {
            Ok(base) => {
                debug!(origin = %self.origin, base = %base, "base url redefined");
                self.base = base;
                self.stats.base_updates += 1;
            }
            Err(err) => {
                debug!(origin = %self.origin, error = %err, "ignoring unusable base href");
            }
        }
    }

    fn discover(&mut self, reference: Reference) {
        self.stats.references_found += 1;
        let Reference {
            raw,
            ref_type,
            base,
        } = reference;

        let resolved = match resolve_without_fragment(&base, &raw) {
            Ok(url) => url,
            Err(err) => {
                self.stats.malformed += 1;
                info!(reference = %raw, error = %err, "malformed URL found");
                return;
            }
        };

        let frontier = self.handle.frontier();
        let canonical = match frontier.canonicalize(resolved.as_str()) {
            Ok(url) => url,
            Err(err) => {
                self.stats.rejected += 1;
                info!(reference = %raw, error = %err, "invalid URL found");
                return;
            }
        };

        if !is_followable_scheme(&canonical) {
            self.stats.scheme_filtered += 1;
            return;
        }

        if !self.handle.oracle().evaluate(&canonical, &base, ref_type) {
            self.stats.declined += 1;
            return;
        }

        let depth = self.depth.saturating_add(1);
        match frontier.submit(&canonical, &base, depth) {
            Ok(()) => {
                self.stats.submitted += 1;
                trace!(url = %canonical, %ref_type, depth, "queued discovered url");
            }
            Err(err) if err.is_duplicate() => {
                self.stats.rejected += 1;
                debug!(url = %canonical, "already scheduled");
            }
            Err(err) => {
                self.stats.rejected += 1;
                info!(reference = %raw, error = %err, "frontier refused URL");
            }
        }
    }
}

impl<S: TagSource> TagSource for DiscoveryParser<S> {
    fn read_token(&mut self) -> io::Result<Token> {
        self.read()
    }

    fn tag(&self) -> &Tag {
        self.source.tag()
    }
}

fn is_followable_scheme(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
