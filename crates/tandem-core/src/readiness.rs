//! Readiness detection for backend output
//!
//! Classifies a single line of backend output as a readiness signal. Matching
//! is line-local and stateless: the caller decides what to do with repeated
//! matches (the supervisor only honours the first one per process instance).

use regex::Regex;
use std::sync::LazyLock;

use crate::ansi::strip_ansi_codes;

/// Phrase the bundled backend prints once it accepts connections
pub const DEFAULT_READY_MARKER: &str = "Server is ready";

/// URL assumed when a marker is seen without an address on the same line
pub const DEFAULT_READY_URL: &str = "http://127.0.0.1:7788";

/// "Running on http://host:port" and its common variations.
///
/// Capture group 1 is the URL.
static LISTENING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(?:running|listening|serving|available|started|ready)\s+(?:on|at)\s+(https?://[^\s'"<>]+)"#,
    )
    .expect("listening regex pattern is valid")
});

/// Characters that terminate a sentence rather than belong to the URL
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ')', ']', '}'];

/// Outcome of a positive readiness match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadySignal {
    /// The line announced the address it is listening on
    UrlFound(String),
    /// The line carried a readiness marker but no address
    ReadyMarker,
}

impl ReadySignal {
    /// Resolve the signal to a URL, substituting `default_url` for a bare marker
    pub fn into_url(self, default_url: &str) -> String {
        match self {
            ReadySignal::UrlFound(url) => url,
            ReadySignal::ReadyMarker => default_url.to_string(),
        }
    }
}

/// Configurable line classifier
#[derive(Debug, Clone)]
pub struct ReadinessDetector {
    markers: Vec<String>,
    default_url: String,
}

impl Default for ReadinessDetector {
    fn default() -> Self {
        Self {
            markers: vec![DEFAULT_READY_MARKER.to_string()],
            default_url: DEFAULT_READY_URL.to_string(),
        }
    }
}

impl ReadinessDetector {
    /// Create a detector with custom substring markers and fallback URL.
    ///
    /// Empty markers are ignored, since they would match every line.
    pub fn new(markers: Vec<String>, default_url: impl Into<String>) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
            default_url: default_url.into(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn default_url(&self) -> &str {
        &self.default_url
    }

    /// Classify one line of output
    pub fn detect(&self, line: &str) -> Option<ReadySignal> {
        let clean = strip_ansi_codes(line);

        if let Some(url) = extract_listening_url(&clean) {
            return Some(ReadySignal::UrlFound(url));
        }

        if self.markers.iter().any(|m| clean.contains(m.as_str())) {
            return Some(ReadySignal::ReadyMarker);
        }

        None
    }

    /// Classify one line and resolve it straight to a URL
    pub fn detect_url(&self, line: &str) -> Option<String> {
        self.detect(line)
            .map(|signal| signal.into_url(&self.default_url))
    }
}

/// Classify a line with the default markers
pub fn detect(line: &str) -> Option<ReadySignal> {
    static DEFAULT: LazyLock<ReadinessDetector> = LazyLock::new(ReadinessDetector::default);
    DEFAULT.detect(line)
}

fn extract_listening_url(line: &str) -> Option<String> {
    let captures = LISTENING_PATTERN.captures(line)?;
    let url = captures.get(1)?.as_str().trim_end_matches(TRAILING_PUNCTUATION);

    // "http://" alone is not an address
    let host = url.split_once("://").map(|(_, rest)| rest).unwrap_or("");
    if !host.contains(|c: char| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(url.to_string())
}
