use std::path::PathBuf;
use std::time::Duration;

/// Single analyzer profile, as enumerated by `analyzer.profiles[*]`.
#[derive(Debug, Clone)]
pub struct AnalyzerProfileConfig {
    pub name: String,
    pub lowercase: bool,
    pub strip_diacritics: bool,
    pub stopwords: Vec<String>,
    pub min_len: usize,
    pub max_len: usize,
}

impl AnalyzerProfileConfig {
    pub fn cs_default() -> Self {
        AnalyzerProfileConfig {
            name: "cs".to_string(),
            lowercase: true,
            strip_diacritics: true,
            stopwords: Vec::new(),
            min_len: 1,
            max_len: 64,
        }
    }
}

/// BM25 / trigram score tuning (`search.score.*`).
#[derive(Debug, Clone, Copy)]
pub struct ScoreConfig {
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub trigram_min_overlap: f32,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        ScoreConfig {
            bm25_k1: 1.2,
            bm25_b: 0.75,
            trigram_min_overlap: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteAheadConfig {
    pub max_attempts: u32,
    pub iteration_timeout: Duration,
}

impl Default for WriteAheadConfig {
    fn default() -> Self {
        WriteAheadConfig {
            max_attempts: 5,
            iteration_timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,
    pub pool_size: u32,
    pub busy_timeout: Duration,

    pub max_page_size: usize,
    pub max_candidate_results: usize,

    pub idempotency_key_ttl: Duration,
    pub idempotency_cleanup_interval: Duration,

    pub analyzer_default_profile: String,
    pub analyzer_profiles: Vec<AnalyzerProfileConfig>,

    pub score: ScoreConfig,
    pub write_ahead: WriteAheadConfig,

    pub max_parallelism: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data/search.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),

            max_page_size: 200,
            max_candidate_results: 2000,

            idempotency_key_ttl: Duration::from_secs(24 * 60 * 60),
            idempotency_cleanup_interval: Duration::from_secs(60 * 60),

            analyzer_default_profile: "cs".to_string(),
            analyzer_profiles: vec![AnalyzerProfileConfig::cs_default()],

            score: ScoreConfig::default(),
            write_ahead: WriteAheadConfig::default(),

            max_parallelism: num_cpus::get().max(1),
        }
    }
}

impl Config {
    pub fn profile(&self, name: &str) -> Option<&AnalyzerProfileConfig> {
        self.analyzer_profiles.iter().find(|p| p.name == name)
    }
}
