use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::analysis::filter::TokenFilter;
use crate::analysis::filters::diacritics::{DiacriticStripFilter, LengthFilter};
use crate::analysis::filters::lowercase::LowercaseFilter;
use crate::analysis::filters::stopword::StopWordFilter;
use crate::analysis::token::Token;
use crate::analysis::tokenizer::{StandardTokenizer, Tokenizer};
use crate::core::config::AnalyzerProfileConfig;
use crate::core::error::{Error, ErrorKind, Result};

/// Bumped whenever tokenisation rules change. Embedded in `token_hash` so a
/// rule change is visible as drift rather than silently desynchronising the
/// projection from the analyzer (design notes §9).
pub const ANALYZER_VERSION: u32 = 1;

/// A deterministic text -> token-sequence pipeline, built from a named
/// profile. `tokenize` is a pure total function; `normalize` is idempotent.
pub struct Analyzer {
    pub name: String,
    pub version: u32,
    tokenizer: Box<dyn Tokenizer>,
    filters: Vec<Box<dyn TokenFilter>>,
    strip_diacritics: bool,
    lowercase: bool,
}

impl Analyzer {
    pub fn from_profile(profile: &AnalyzerProfileConfig) -> Self {
        let mut filters: Vec<Box<dyn TokenFilter>> = Vec::new();

        if profile.strip_diacritics {
            filters.push(Box::new(DiacriticStripFilter));
        }
        if profile.lowercase {
            filters.push(Box::new(LowercaseFilter));
        }
        if !profile.stopwords.is_empty() {
            filters.push(Box::new(StopWordFilter::new(profile.stopwords.clone())));
        }
        filters.push(Box::new(LengthFilter {
            min_len: profile.min_len,
            max_len: profile.max_len,
        }));

        Analyzer {
            name: profile.name.clone(),
            version: ANALYZER_VERSION,
            tokenizer: Box::new(StandardTokenizer::default()),
            filters,
            strip_diacritics: profile.strip_diacritics,
            lowercase: profile.lowercase,
        }
    }

    /// Tokenize and run the filter chain; a finite sequence of non-empty
    /// tokens.
    pub fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = self.tokenizer.tokenize(text);
        for filter in &self.filters {
            tokens = filter.filter(tokens);
        }
        tokens.retain(|t| !t.text.is_empty());
        tokens
    }

    /// Normalizes a whole string the way a single token would be filtered
    /// (case-fold, diacritic-strip), without tokenizing it first. Used for
    /// `normalized_title`. Idempotent.
    pub fn normalize(&self, text: &str) -> String {
        let mut s = text.to_string();
        if self.strip_diacritics {
            s = DiacriticStripFilter::strip(&s);
        }
        if self.lowercase {
            s = s.to_lowercase();
        }
        s
    }
}

/// Registry of named analyzer profiles, keyed by `analyzer.profiles[*].name`.
pub struct AnalyzerRegistry {
    analyzers: Arc<RwLock<HashMap<String, Arc<Analyzer>>>>,
    default_profile: String,
}

impl AnalyzerRegistry {
    pub fn new(profiles: &[AnalyzerProfileConfig], default_profile: &str) -> Self {
        let mut map = HashMap::new();
        for profile in profiles {
            map.insert(profile.name.clone(), Arc::new(Analyzer::from_profile(profile)));
        }
        AnalyzerRegistry {
            analyzers: Arc::new(RwLock::new(map)),
            default_profile: default_profile.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Analyzer>> {
        self.analyzers.read().unwrap().get(name).cloned()
    }

    pub fn default_analyzer(&self) -> Result<Arc<Analyzer>> {
        self.get(&self.default_profile).ok_or_else(|| {
            Error::new(
                ErrorKind::Fatal,
                format!(
                    "default analyzer profile '{}' not registered",
                    self.default_profile
                ),
            )
        })
    }

    pub fn tokenize(&self, profile: &str, text: &str) -> Result<Vec<Token>> {
        self.get(profile)
            .map(|analyzer| analyzer.tokenize(text))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("analyzer profile '{}' not found", profile),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs_analyzer() -> Analyzer {
        Analyzer::from_profile(&AnalyzerProfileConfig::cs_default())
    }

    #[test]
    fn tokenize_lowercases_and_strips_diacritics() {
        let analyzer = cs_analyzer();
        let tokens = analyzer.tokenize("Příliš žluťoučký kůň");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["prilis", "zlutoucky", "kun"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let analyzer = cs_analyzer();
        let once = analyzer.normalize("Report Final.DOCX");
        let twice = analyzer.normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn length_filter_drops_short_and_long_tokens() {
        let profile = AnalyzerProfileConfig {
            min_len: 3,
            max_len: 5,
            ..AnalyzerProfileConfig::cs_default()
        };
        let analyzer = Analyzer::from_profile(&profile);
        let tokens = analyzer.tokenize("a bb ccc dddd eeeee ffffff");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["ccc", "dddd", "eeeee"]);
    }
}
