#![allow(dead_code)]

use linkwalk::{Frontier, FrontierError, Oracle, RefType, Tag, TagSource, Token};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use url::Url;

/// What the overlay asked the frontier to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub url: String,
    pub referrer: String,
    pub depth: u8,
}

/// Frontier stand-in that records every submission and rejects a fixed set.
#[derive(Default)]
pub struct RecordingFrontier {
    depths: HashMap<String, u8>,
    reject: HashSet<String>,
    invalid: HashSet<String>,
    submissions: Mutex<Vec<Submission>>,
}

impl RecordingFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(mut self, url: &str, depth: u8) -> Self {
        self.depths.insert(url.to_string(), depth);
        self
    }

    /// Fails `submit` for `url` with a queue-full rejection.
    pub fn rejecting(mut self, url: &str) -> Self {
        self.reject.insert(url.to_string());
        self
    }

    /// Fails `canonicalize` for `url`.
    pub fn invalidating(mut self, url: &str) -> Self {
        self.invalid.insert(url.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().expect("submissions lock").clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.submissions().into_iter().map(|s| s.url).collect()
    }
}

impl Frontier for RecordingFrontier {
    fn compute_depth(&self, origin: &Url) -> u8 {
        self.depths.get(origin.as_str()).copied().unwrap_or(0)
    }

    fn canonicalize(&self, raw: &str) -> Result<Url, FrontierError> {
        if self.invalid.contains(raw) {
            return Err(FrontierError::InvalidUrl(
                raw.to_string(),
                url::ParseError::InvalidDomainCharacter,
            ));
        }
        Url::parse(raw).map_err(|err| FrontierError::InvalidUrl(raw.to_string(), err))
    }

    fn submit(&self, url: &Url, referrer: &Url, depth: u8) -> Result<(), FrontierError> {
        self.submissions
            .lock()
            .expect("submissions lock")
            .push(Submission {
                url: url.to_string(),
                referrer: referrer.to_string(),
                depth,
            });
        if self.reject.contains(url.as_str()) {
            return Err(FrontierError::QueueFull(url.clone()));
        }
        Ok(())
    }
}

/// Oracle stand-in that records what it was asked and declines a fixed set.
#[derive(Default)]
pub struct RecordingOracle {
    decline: HashSet<String>,
    evaluated: Mutex<Vec<(String, RefType)>>,
}

impl RecordingOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining(mut self, url: &str) -> Self {
        self.decline.insert(url.to_string());
        self
    }

    pub fn evaluated(&self) -> Vec<(String, RefType)> {
        self.evaluated.lock().expect("evaluated lock").clone()
    }
}

impl Oracle for RecordingOracle {
    fn evaluate(&self, url: &Url, _referrer: &Url, ref_type: RefType) -> bool {
        self.evaluated
            .lock()
            .expect("evaluated lock")
            .push((url.to_string(), ref_type));
        !self.decline.contains(url.as_str())
    }
}

/// Replays a fixed token script, then fails with an I/O error if asked.
pub struct ScriptedSource {
    steps: Vec<Step>,
    cursor: usize,
    tag: Tag,
}

pub enum Step {
    Char(char),
    Tag(Tag),
    Fail,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            cursor: 0,
            tag: Tag::default(),
        }
    }
}

impl TagSource for ScriptedSource {
    fn read_token(&mut self) -> io::Result<Token> {
        let Some(step) = self.steps.get(self.cursor) else {
            return Ok(Token::EndOfStream);
        };
        self.cursor += 1;
        match step {
            Step::Char(ch) => Ok(Token::Char(*ch)),
            Step::Tag(tag) => {
                self.tag = tag.clone();
                Ok(Token::TagBoundary)
            }
            Step::Fail => Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away")),
        }
    }

    fn tag(&self) -> &Tag {
        &self.tag
    }
}

/// Captures the message of every `INFO` event.
#[derive(Clone, Default)]
pub struct InfoCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl InfoCapture {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("capture lock").clone()
    }

    /// Runs `body` with this capture installed as the thread's subscriber.
    pub fn run<T>(&self, body: impl FnOnce() -> T) -> T {
        use tracing_subscriber::layer::SubscriberExt;

        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::with_default(subscriber, body)
    }
}

impl<S: Subscriber> Layer<S> for InfoCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::INFO {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.messages
            .lock()
            .expect("capture lock")
            .push(visitor.message);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

pub fn url(raw: &str) -> Url {
    Url::parse(raw).expect("valid url")
}
