use sha2::{Digest, Sha256};

use crate::analysis::analyzer::Analyzer;
use crate::core::types::File;

/// `(analyzer_version, token_hash, normalized_title)` identifying an
/// analyzer x content state. Stable across runs for identical analyzer and
/// content; used by the projection to detect drift even when `content_hash`
/// is unchanged (an analyzer upgrade can still desynchronise it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub analyzer_version: u32,
    pub token_hash: String,
    pub normalized_title: String,
}

/// Derives a `Signature` from a file's indexable content: title, body text
/// (here, the filename stands in for body text absent from the aggregate —
/// extraction of binary-format body text is an external collaborator per
/// spec §1), and extended-metadata text.
pub struct SignatureCalculator<'a> {
    analyzer: &'a Analyzer,
}

impl<'a> SignatureCalculator<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        SignatureCalculator { analyzer }
    }

    pub fn compute(&self, file: &File) -> Signature {
        let normalized_title = self.analyzer.normalize(&file.name);

        let mut tokens: Vec<String> = Vec::new();
        tokens.extend(self.analyzer.tokenize(&file.name).into_iter().map(|t| t.text));
        tokens.extend(self.analyzer.tokenize(&file.author).into_iter().map(|t| t.text));
        tokens.extend(
            self.analyzer
                .tokenize(&file.metadata_text())
                .into_iter()
                .map(|t| t.text),
        );
        tokens.sort();

        let mut hasher = Sha256::new();
        hasher.update(self.analyzer.version.to_le_bytes());
        for token in &tokens {
            hasher.update(token.as_bytes());
            hasher.update([0u8]);
        }
        let token_hash = hex::encode(hasher.finalize());

        Signature {
            analyzer_version: self.analyzer.version,
            token_hash,
            normalized_title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AnalyzerProfileConfig;
    use crate::core::types::{FileId, FileSystemMetadata, FileValidity, SearchIndexState};
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample_file(name: &str) -> File {
        let now = Utc::now();
        File {
            id: FileId::new(),
            name: name.to_string(),
            extension: "docx".to_string(),
            mime: "application/vnd.openxmlformats".to_string(),
            author: "alice".to_string(),
            size_bytes: 1024,
            content_hash: "deadbeef".to_string(),
            created_utc: now,
            modified_utc: now,
            is_read_only: false,
            validity: FileValidity::default(),
            fs_metadata: FileSystemMetadata::default(),
            extended_metadata: HashMap::new(),
            search_index_state: SearchIndexState::default(),
        }
    }

    #[test]
    fn token_hash_is_stable_for_identical_content() {
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let calc = SignatureCalculator::new(&analyzer);
        let f1 = sample_file("Quarterly Report.docx");
        let f2 = sample_file("Quarterly Report.docx");
        assert_eq!(calc.compute(&f1).token_hash, calc.compute(&f2).token_hash);
    }

    #[test]
    fn token_hash_differs_for_different_content() {
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let calc = SignatureCalculator::new(&analyzer);
        let f1 = sample_file("Quarterly Report.docx");
        let f2 = sample_file("Annual Report.docx");
        assert_ne!(calc.compute(&f1).token_hash, calc.compute(&f2).token_hash);
    }

    #[test]
    fn token_hash_embeds_analyzer_version() {
        let analyzer = Analyzer::from_profile(&AnalyzerProfileConfig::cs_default());
        let calc = SignatureCalculator::new(&analyzer);
        let file = sample_file("Report.docx");
        let sig = calc.compute(&file);
        assert_eq!(sig.analyzer_version, analyzer.version);
    }
}
