//! Crawl scope controls and the command-line surface that builds them.

use crate::classify::RefType;
use crate::frontier::Oracle;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use url::Url;

/// Scope policy applied to every discovered URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlControls {
    allowed_domains: Vec<String>,
    allowed_types: Vec<RefType>,
    max_depth: Option<u8>,
}

impl CrawlControls {
    /// Constructs a new set of crawl controls. Empty lists allow everything.
    pub fn new(
        allowed_domains: Vec<String>,
        allowed_types: Vec<RefType>,
        max_depth: Option<u8>,
    ) -> Self {
        Self {
            allowed_domains,
            allowed_types,
            max_depth,
        }
    }

    /// Returns the allowlist of domains.
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Maximum crawl depth, if bounded.
    pub fn max_depth(&self) -> Option<u8> {
        self.max_depth
    }

    /// Determines whether the provided host passes the allowlist.
    pub fn is_domain_allowed(&self, domain: &str) -> bool {
        self.allowed_domains.is_empty()
            || self
                .allowed_domains
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }

    /// Determines whether references of `ref_type` are followed.
    pub fn is_type_allowed(&self, ref_type: RefType) -> bool {
        self.allowed_types.is_empty() || self.allowed_types.contains(&ref_type)
    }
}

impl Default for CrawlControls {
    fn default() -> Self {
        Self::new(Vec::new(), RefType::ALL.to_vec(), None)
    }
}

impl Oracle for CrawlControls {
    fn evaluate(&self, url: &Url, _referrer: &Url, ref_type: RefType) -> bool {
        self.is_type_allowed(ref_type)
            && url
                .host_str()
                .map(|host| self.is_domain_allowed(host))
                .unwrap_or(false)
    }
}

/// Reference types as spelled on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RefTypeArg {
    /// `<a href>`
    Hyperlink,
    /// `<img src>`
    Image,
    /// `<style src>`
    Style,
    /// `<link href>`
    Script,
}

impl From<RefTypeArg> for RefType {
    fn from(arg: RefTypeArg) -> Self {
        match arg {
            RefTypeArg::Hyperlink => RefType::Hyperlink,
            RefTypeArg::Image => RefType::Image,
            RefTypeArg::Style => RefType::Style,
            RefTypeArg::Script => RefType::Script,
        }
    }
}

/// Command-line interface for the `linkwalk` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "linkwalk",
    version,
    about = "Discover outbound links in an HTML document"
)]
pub struct Cli {
    /// URL the document was fetched from; relative links resolve against it
    #[arg(env = "LINKWALK_ORIGIN")]
    pub origin: Url,

    /// HTML file to read ('-' or omitted reads stdin)
    pub input: Option<PathBuf>,

    /// Domain allowlist, comma separated (empty allows any host)
    #[arg(long = "domains", env = "LINKWALK_DOMAINS", default_value = "")]
    pub allowed_domains: String,

    /// Reference types to follow, comma separated (default: all)
    #[arg(long, env = "LINKWALK_TYPES", value_enum, value_delimiter = ',')]
    pub types: Vec<RefTypeArg>,

    /// Maximum crawl depth accepted by the frontier
    #[arg(long, env = "LINKWALK_MAX_DEPTH")]
    pub max_depth: Option<u8>,

    /// Emit queued URLs as JSON lines
    #[arg(long, env = "LINKWALK_JSON", default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Converts the parsed CLI into `CrawlControls`.
    pub fn build_controls(&self) -> CrawlControls {
        CrawlControls::new(
            self.domains_vec(),
            self.types.iter().copied().map(RefType::from).collect(),
            self.max_depth,
        )
    }

    /// Input path, or `None` when the document comes from stdin.
    pub fn input_path(&self) -> Option<&Path> {
        self.input
            .as_deref()
            .filter(|path| path.as_os_str() != "-")
    }

    fn domains_vec(&self) -> Vec<String> {
        self.allowed_domains
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
