//! Relative reference resolution against a base URL.

use thiserror::Error;
use url::Url;

/// Characters that disqualify a hyperlink before any resolution is attempted.
const INVALID_URL_CHARACTERS: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '`'];

/// A reference string that could not be turned into an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed reference {reference:?}: {reason}")]
pub struct MalformedReference {
    reference: String,
    reason: MalformedReason,
}

impl MalformedReference {
    /// The reference exactly as it was found.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Why the reference was rejected.
    pub fn reason(&self) -> &MalformedReason {
        &self.reason
    }
}

/// Classification of [`MalformedReference`] failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// An ASCII control character other than tab, CR, or LF.
    #[error("control character U+{0:04X}")]
    ControlCharacter(u32),
    /// A `%` not followed by two hex digits.
    #[error("bad percent-encoding at byte {0}")]
    BadPercentEncoding(usize),
    /// A `:` with nothing in front of it.
    #[error("empty scheme")]
    EmptyScheme,
    /// Text before the first `:` that is not a valid scheme name.
    #[error("invalid scheme {0:?}")]
    InvalidScheme(String),
    /// The URL parser refused the joined result.
    #[error(transparent)]
    Parse(#[from] url::ParseError),
}

/// Resolves `reference` against `base`, yielding an absolute URL.
///
/// Surrounding whitespace is ignored. Dot segments are removed and the query
/// and fragment of `reference` are kept.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, MalformedReference> {
    let trimmed = reference.trim();
    check_reference(trimmed)
        .and_then(|()| base.join(trimmed).map_err(MalformedReason::from))
        .map_err(|reason| MalformedReference {
            reference: reference.to_string(),
            reason,
        })
}

/// Like [`resolve`], with the fragment removed from the result.
pub fn resolve_without_fragment(base: &Url, reference: &str) -> Result<Url, MalformedReference> {
    let mut url = resolve(base, reference)?;
    url.set_fragment(None);
    Ok(url)
}

/// Returns `true` when `candidate` holds characters that never appear unescaped in a URL.
pub fn contains_invalid_url_characters(candidate: &str) -> bool {
    candidate
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control() || INVALID_URL_CHARACTERS.contains(&ch))
}

fn check_reference(reference: &str) -> Result<(), MalformedReason> {
    // Tab, CR and LF are stripped by the URL parser itself.
    if let Some(ch) = reference
        .chars()
        .find(|ch| ch.is_ascii_control() && !matches!(ch, '\t' | '\n' | '\r'))
    {
        return Err(MalformedReason::ControlCharacter(u32::from(ch)));
    }

    let bytes = reference.as_bytes();
    for (idx, _) in reference.match_indices('%') {
        let escaped = bytes
            .get(idx + 1..idx + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !escaped {
            return Err(MalformedReason::BadPercentEncoding(idx));
        }
    }

    if let Some(colon) = reference.find(':') {
        let head = &reference[..colon];
        if !head.contains(|ch| matches!(ch, '/' | '?' | '#')) {
            if head.is_empty() {
                return Err(MalformedReason::EmptyScheme);
            }
            if !is_scheme(head) {
                return Err(MalformedReason::InvalidScheme(head.to_string()));
            }
        }
    }

    Ok(())
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|ch| ch.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}
