#![warn(missing_docs)]
//! Streaming link discovery for crawlers.
//!
//! A [`DiscoveryParser`] wraps a character-level tokenizer, passes document
//! text through untouched, and hands every link it finds to a shared
//! [`Frontier`] once the [`Oracle`] agrees to follow it.

pub mod classify;
pub mod controls;
pub mod discovery;
pub mod frontier;
pub mod resolver;
pub mod tokenizer;

pub use classify::{classify, Classified, RefType, Reference, TagKind};
pub use controls::{Cli, CrawlControls};
pub use discovery::{DiscoveryParser, DiscoveryStats};
pub use frontier::{
    CrawlHandle, Frontier, FrontierError, MemoryFrontier, Oracle, QueuedUrl,
    DEFAULT_FRONTIER_QUEUE,
};
pub use resolver::{contains_invalid_url_characters, resolve, MalformedReference};
pub use tokenizer::{HtmlTokenizer, Tag, TagSource, Token};
