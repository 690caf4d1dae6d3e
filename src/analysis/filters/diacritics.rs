use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::analysis::filter::TokenFilter;
use crate::analysis::token::Token;

/// Strips combining diacritical marks, matching `unicode61`'s
/// `remove_diacritics 2` tokenizer option bit-exactly: decompose to NFKD,
/// drop combining marks, recompose to NFKC.
pub struct DiacriticStripFilter;

impl DiacriticStripFilter {
    pub fn strip(text: &str) -> String {
        text.nfkd().filter(|c| !is_combining_mark(*c)).nfkc().collect()
    }
}

impl TokenFilter for DiacriticStripFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut token| {
                token.text = Self::strip(&token.text);
                token
            })
            .collect()
    }

    fn name(&self) -> &str {
        "strip_diacritics"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(DiacriticStripFilter)
    }
}

/// Drops tokens outside `[min_len, max_len]`, per analyzer profile.
pub struct LengthFilter {
    pub min_len: usize,
    pub max_len: usize,
}

impl TokenFilter for LengthFilter {
    fn filter(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .filter(|t| {
                let len = t.text.chars().count();
                len >= self.min_len && len <= self.max_len
            })
            .collect()
    }

    fn name(&self) -> &str {
        "length"
    }

    fn clone_box(&self) -> Box<dyn TokenFilter> {
        Box::new(LengthFilter {
            min_len: self.min_len,
            max_len: self.max_len,
        })
    }
}
