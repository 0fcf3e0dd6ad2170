//! Character-level HTML tokenizer that surfaces tag boundaries in-band.
//!
//! Callers pull one [`Token`] at a time. Text arrives as [`Token::Char`]; when a
//! complete tag has been recognized the tokenizer returns
//! [`Token::TagBoundary`] and exposes the tag through [`TagSource::tag`] until
//! the next read.

use html_escape::decode_html_entities;
use std::char::REPLACEMENT_CHARACTER;
use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufReader, Bytes, Read};

/// Longest entity body (`&...;`) we try to decode before giving up.
const MAX_ENTITY_LEN: usize = 32;

/// One unit of tokenizer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A document character.
    Char(char),
    /// A tag was just closed; read it with [`TagSource::tag`].
    TagBoundary,
    /// The underlying input is exhausted.
    EndOfStream,
}

/// A source of tokens that can expose the most recently parsed tag.
pub trait TagSource {
    /// Reads the next token. I/O failures from the underlying input are returned as-is.
    fn read_token(&mut self) -> io::Result<Token>;

    /// The tag parsed by the last read that returned [`Token::TagBoundary`].
    fn tag(&self) -> &Tag;
}

/// A parsed markup tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tag {
    name: String,
    attributes: Vec<(String, String)>,
    ending: bool,
    self_closing: bool,
}

impl Tag {
    /// Creates a start tag. The name is stored lower-cased.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Creates an end tag such as `</a>`.
    pub fn end(name: &str) -> Self {
        Self {
            ending: true,
            ..Self::new(name)
        }
    }

    /// Adds an attribute, keeping the first value when a name repeats.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.push_attribute(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Lower-cased tag name, without the leading `/` of end tags.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is an end tag.
    pub fn is_ending(&self) -> bool {
        self.ending
    }

    /// Whether the tag was written as `<name ... />`.
    pub fn is_self_closing(&self) -> bool {
        self.self_closing
    }

    /// Case-insensitive attribute lookup.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterates attributes in source order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    fn push_attribute(&mut self, name: String, value: String) {
        if self.attribute(&name).is_none() {
            self.attributes.push((name, value));
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        if self.ending {
            f.write_str("/")?;
        }
        f.write_str(&self.name)?;
        for (key, value) in &self.attributes {
            write!(f, " {key}=\"{}\"", value.replace('"', "&quot;"))?;
        }
        if self.self_closing {
            f.write_str(" /")?;
        }
        f.write_str(">")
    }
}

/// Streaming UTF-8 decoder with unbounded push-back.
struct CharReader<R: Read> {
    bytes: Bytes<BufReader<R>>,
    pending_byte: Option<u8>,
    pushed_back: Vec<char>,
}

impl<R: Read> CharReader<R> {
    fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
            pending_byte: None,
            pushed_back: Vec::new(),
        }
    }

    fn next_char(&mut self) -> io::Result<Option<char>> {
        if let Some(ch) = self.pushed_back.pop() {
            return Ok(Some(ch));
        }
        self.decode()
    }

    fn peek(&mut self) -> io::Result<Option<char>> {
        let next = self.next_char()?;
        if let Some(ch) = next {
            self.pushed_back.push(ch);
        }
        Ok(next)
    }

    fn unread(&mut self, ch: char) {
        self.pushed_back.push(ch);
    }

    /// Pushes back a run of characters so they are re-read in order.
    fn unread_all(&mut self, chars: &[char]) {
        self.pushed_back.extend(chars.iter().rev());
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(byte) = self.pending_byte.take() {
            return Ok(Some(byte));
        }
        self.bytes.next().transpose()
    }

    fn decode(&mut self) -> io::Result<Option<char>> {
        let Some(first) = self.next_byte()? else {
            return Ok(None);
        };
        let width = match first {
            0x00..=0x7f => return Ok(Some(char::from(first))),
            0xc2..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf4 => 4,
            _ => return Ok(Some(REPLACEMENT_CHARACTER)),
        };

        let mut buf = [first, 0, 0, 0];
        for slot in buf.iter_mut().take(width).skip(1) {
            match self.next_byte()? {
                Some(byte @ 0x80..=0xbf) => *slot = byte,
                // A truncated sequence ends at the first non-continuation
                // byte, which starts the next character.
                Some(byte) => {
                    self.pending_byte = Some(byte);
                    return Ok(Some(REPLACEMENT_CHARACTER));
                }
                None => return Ok(Some(REPLACEMENT_CHARACTER)),
            }
        }

        let decoded = std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(REPLACEMENT_CHARACTER);
        Ok(Some(decoded))
    }
}

/// Pull-based HTML tokenizer over any byte reader.
pub struct HtmlTokenizer<R: Read> {
    chars: CharReader<R>,
    pending: VecDeque<char>,
    tag: Tag,
    raw_text: Option<String>,
}

impl<R: Read> HtmlTokenizer<R> {
    /// Wraps a reader. Input is decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn new(reader: R) -> Self {
        Self {
            chars: CharReader::new(reader),
            pending: VecDeque::new(),
            tag: Tag::default(),
            raw_text: None,
        }
    }

    fn after_open_bracket(&mut self) -> io::Result<bool> {
        if let Some(element) = self.raw_text.clone() {
            return self.raw_text_close(&element);
        }

        match self.chars.peek()? {
            Some('!') => {
                self.chars.next_char()?;
                self.markup_declaration()
            }
            Some('?') => {
                self.chars.next_char()?;
                self.declaration('?')?;
                Ok(true)
            }
            Some('/') => {
                self.chars.next_char()?;
                match self.chars.peek()? {
                    Some(ch) if ch.is_ascii_alphabetic() => {
                        self.element(true)?;
                        Ok(true)
                    }
                    _ => {
                        self.chars.unread('/');
                        self.pending.push_back('<');
                        Ok(false)
                    }
                }
            }
            Some(ch) if ch.is_ascii_alphabetic() => {
                self.element(false)?;
                Ok(true)
            }
            _ => {
                self.pending.push_back('<');
                Ok(false)
            }
        }
    }

    /// Inside `script`/`style` only the matching end tag leaves raw text.
    fn raw_text_close(&mut self, element: &str) -> io::Result<bool> {
        let mut seen = Vec::with_capacity(element.len() + 2);
        let mut matched = true;
        for expected in std::iter::once('/').chain(element.chars()) {
            match self.chars.next_char()? {
                Some(ch) => {
                    seen.push(ch);
                    if !ch.eq_ignore_ascii_case(&expected) {
                        matched = false;
                        break;
                    }
                }
                None => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            let terminator = self.chars.peek()?;
            matched = matches!(terminator, None | Some('>' | '/'))
                || terminator.is_some_and(|ch| ch.is_ascii_whitespace());
        }

        if !matched {
            self.chars.unread_all(&seen);
            self.pending.push_back('<');
            return Ok(false);
        }

        self.chars.unread_all(&seen[1..]);
        self.element(true)?;
        Ok(true)
    }

    fn markup_declaration(&mut self) -> io::Result<bool> {
        if self.chars.peek()? == Some('-') {
            self.chars.next_char()?;
            if self.chars.peek()? == Some('-') {
                self.chars.next_char()?;
                self.skip_comment()?;
                return Ok(false);
            }
            self.chars.unread('-');
        }
        self.declaration('!')?;
        Ok(true)
    }

    /// Called just past `<!--`, whose dashes also count toward the
    /// terminator, so `<!-->` and `<!--->` close immediately.
    fn skip_comment(&mut self) -> io::Result<()> {
        let mut dashes = 2usize;
        while let Some(ch) = self.chars.next_char()? {
            match ch {
                '-' => dashes += 1,
                '>' if dashes >= 2 => return Ok(()),
                _ => dashes = 0,
            }
        }
        Ok(())
    }

    /// `<!DOCTYPE html>` and `<?xml ...?>` surface as tags named `!doctype` / `?xml`.
    fn declaration(&mut self, marker: char) -> io::Result<()> {
        let mut name = String::from(marker);
        while let Some(ch) = self.chars.next_char()? {
            if ch == '>' {
                break;
            }
            if ch.is_ascii_whitespace() {
                self.skip_until('>')?;
                break;
            }
            name.push(ch.to_ascii_lowercase());
        }
        self.tag = Tag {
            name,
            ..Tag::default()
        };
        Ok(())
    }

    fn skip_until(&mut self, stop: char) -> io::Result<()> {
        while let Some(ch) = self.chars.next_char()? {
            if ch == stop {
                break;
            }
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) -> io::Result<()> {
        while let Some(ch) = self.chars.next_char()? {
            if !ch.is_ascii_whitespace() {
                self.chars.unread(ch);
                break;
            }
        }
        Ok(())
    }

    fn element(&mut self, ending: bool) -> io::Result<()> {
        let mut tag = Tag {
            ending,
            ..Tag::default()
        };
        while let Some(ch) = self.chars.next_char()? {
            if ch.is_ascii_whitespace() || ch == '/' || ch == '>' {
                self.chars.unread(ch);
                break;
            }
            tag.name.push(ch.to_ascii_lowercase());
        }

        loop {
            self.skip_whitespace()?;
            match self.chars.next_char()? {
                None | Some('>') => break,
                Some('/') => {
                    if self.chars.peek()? == Some('>') {
                        tag.self_closing = true;
                    }
                }
                Some(first) => {
                    let name = self.attribute_name(first)?;
                    self.skip_whitespace()?;
                    let value = if self.chars.peek()? == Some('=') {
                        self.chars.next_char()?;
                        self.skip_whitespace()?;
                        self.attribute_value()?
                    } else {
                        String::new()
                    };
                    tag.push_attribute(name, value);
                }
            }
        }

        if ending {
            if self.raw_text.as_deref() == Some(tag.name.as_str()) {
                self.raw_text = None;
            }
        } else if !tag.self_closing && matches!(tag.name.as_str(), "script" | "style") {
            self.raw_text = Some(tag.name.clone());
        }
        self.tag = tag;
        Ok(())
    }

    fn attribute_name(&mut self, first: char) -> io::Result<String> {
        let mut name = String::new();
        name.push(first.to_ascii_lowercase());
        while let Some(ch) = self.chars.next_char()? {
            if ch.is_ascii_whitespace() || matches!(ch, '=' | '>' | '/') {
                self.chars.unread(ch);
                break;
            }
            name.push(ch.to_ascii_lowercase());
        }
        Ok(name)
    }

    fn attribute_value(&mut self) -> io::Result<String> {
        let mut raw = String::new();
        match self.chars.next_char()? {
            Some(quote @ ('"' | '\'')) => {
                while let Some(ch) = self.chars.next_char()? {
                    if ch == quote {
                        break;
                    }
                    raw.push(ch);
                }
            }
            Some(ch) if ch != '>' => {
                raw.push(ch);
                while let Some(ch) = self.chars.next_char()? {
                    if ch.is_ascii_whitespace() || ch == '>' {
                        self.chars.unread(ch);
                        break;
                    }
                    raw.push(ch);
                }
            }
            Some(ch) => self.chars.unread(ch),
            None => {}
        }
        Ok(decode_html_entities(&raw).into_owned())
    }

    fn entity(&mut self) -> io::Result<()> {
        let mut raw = String::from('&');
        while raw.len() < MAX_ENTITY_LEN {
            match self.chars.next_char()? {
                Some(';') => {
                    raw.push(';');
                    break;
                }
                Some(ch) if ch.is_ascii_alphanumeric() || ch == '#' => raw.push(ch),
                Some(ch) => {
                    self.chars.unread(ch);
                    break;
                }
                None => break,
            }
        }
        self.pending.extend(decode_html_entities(&raw).chars());
        Ok(())
    }
}

impl<R: Read> TagSource for HtmlTokenizer<R> {
    fn read_token(&mut self) -> io::Result<Token> {
        loop {
            if let Some(ch) = self.pending.pop_front() {
                return Ok(Token::Char(ch));
            }
            let Some(ch) = self.chars.next_char()? else {
                return Ok(Token::EndOfStream);
            };
            match ch {
                '<' => {
                    if self.after_open_bracket()? {
                        return Ok(Token::TagBoundary);
                    }
                }
                '&' if self.raw_text.is_none() => self.entity()?,
                _ => return Ok(Token::Char(ch)),
            }
        }
    }

    fn tag(&self) -> &Tag {
        &self.tag
    }
}
