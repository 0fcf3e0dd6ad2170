//! Maps tags to the references they carry.

use crate::resolver::contains_invalid_url_characters;
use crate::tokenizer::Tag;
use std::fmt;
use url::Url;

/// Hyperlink prefixes that are never followed (compared lower-cased).
pub const DENIED_SCHEME_PREFIXES: [&str; 6] =
    ["javascript:", "rstp:", "rtsp:", "news:", "irc:", "mailto:"];

/// What kind of resource a discovered reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefType {
    /// `<a href>`.
    Hyperlink,
    /// `<img src>`.
    Image,
    /// `<style src>`.
    Style,
    /// `<link href>`. Stylesheet links land here too; downstream consumers key on it.
    Script,
}

impl RefType {
    /// Every reference type, in declaration order.
    pub const ALL: [RefType; 4] = [
        RefType::Hyperlink,
        RefType::Image,
        RefType::Style,
        RefType::Script,
    ];

    /// Lower-case label used in logs and output.
    pub fn as_str(self) -> &'static str {
        match self {
            RefType::Hyperlink => "hyperlink",
            RefType::Image => "image",
            RefType::Style => "style",
            RefType::Script => "script",
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags that matter for link discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `a`
    Anchor,
    /// `img`
    Image,
    /// `style`
    Style,
    /// `link`
    Link,
    /// `base`
    Base,
    /// Anything else.
    Other,
}

impl TagKind {
    /// Case-insensitive lookup by tag name.
    pub fn from_name(name: &str) -> Self {
        const KINDS: [(&str, TagKind); 5] = [
            ("a", TagKind::Anchor),
            ("img", TagKind::Image),
            ("style", TagKind::Style),
            ("link", TagKind::Link),
            ("base", TagKind::Base),
        ];
        KINDS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map_or(TagKind::Other, |&(_, kind)| kind)
    }

    /// Attribute holding the reference, if this kind carries one.
    pub fn source_attribute(self) -> Option<&'static str> {
        match self {
            TagKind::Anchor | TagKind::Link | TagKind::Base => Some("href"),
            TagKind::Image | TagKind::Style => Some("src"),
            TagKind::Other => None,
        }
    }

    /// Reference type assigned to discoveries; `None` for `base` and unknown tags.
    pub fn ref_type(self) -> Option<RefType> {
        match self {
            TagKind::Anchor => Some(RefType::Hyperlink),
            TagKind::Image => Some(RefType::Image),
            TagKind::Style => Some(RefType::Style),
            TagKind::Link => Some(RefType::Script),
            TagKind::Base | TagKind::Other => None,
        }
    }
}

/// A candidate link as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Attribute value (trimmed for hyperlinks).
    pub raw: String,
    /// Classification of the target.
    pub ref_type: RefType,
    /// Base URL in effect when the tag was seen.
    pub base: Url,
}

/// Outcome of classifying one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// The tag carries a reference to follow.
    Discovery(Reference),
    /// A `<base href>` redefining the resolution base.
    BaseUpdate(String),
}

/// Classifies a start tag against the current base. End tags never classify.
pub fn classify(tag: &Tag, base: &Url) -> Option<Classified> {
    if tag.is_ending() {
        return None;
    }
    let kind = TagKind::from_name(tag.name());
    let value = tag.attribute(kind.source_attribute()?)?;

    let Some(ref_type) = kind.ref_type() else {
        return Some(Classified::BaseUpdate(value.to_string()));
    };
    let raw = match kind {
        TagKind::Anchor => followable_hyperlink(value)?,
        _ => value,
    };
    Some(Classified::Discovery(Reference {
        raw: raw.to_string(),
        ref_type,
        base: base.clone(),
    }))
}

/// Trims an `href` and drops it when it is script, mail, chat or streaming.
pub fn followable_hyperlink(href: &str) -> Option<&str> {
    let href = href.trim();
    if contains_invalid_url_characters(href) {
        return None;
    }
    let lowered = href.to_ascii_lowercase();
    let denied = DENIED_SCHEME_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix));
    (!denied).then_some(href)
}
