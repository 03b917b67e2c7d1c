/// Decides whether a free-text query should be answered on the streaming path
pub trait StreamingPolicy: Send + Sync {
    fn should_stream(&self, query: &str) -> bool;
}

/// Streams long or open-ended questions; short lookups stay synchronous and cacheable
#[derive(Debug, Clone)]
pub struct KeywordStreamingPolicy {
    keywords: Vec<String>,
    min_length: usize,
}

impl KeywordStreamingPolicy {
    const DEFAULT_KEYWORDS: [&'static str; 8] = [
        "explain",
        "describe",
        "compare",
        "summarize",
        "summary",
        "trend",
        "why",
        "analyze",
    ];
    const DEFAULT_MIN_LENGTH: usize = 120;

    pub fn new(keywords: Vec<String>, min_length: usize) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            min_length,
        }
    }
}

impl Default for KeywordStreamingPolicy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            Self::DEFAULT_MIN_LENGTH,
        )
    }
}

impl StreamingPolicy for KeywordStreamingPolicy {
    fn should_stream(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.chars().count() >= self.min_length {
            return true;
        }

        query
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| self.keywords.iter().any(|k| k == word))
    }
}
