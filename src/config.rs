use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Source;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ============ Search engine ============

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout. Unset means the HTTP client's default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            index_name: default_index_name(),
            username: None,
            password: None,
            timeout_secs: None,
            accept_invalid_certs: false,
        }
    }
}

impl SearchConfig {
    /// Password from config, falling back to `OPENSEARCH_PASSWORD`.
    pub fn resolved_password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var("OPENSEARCH_PASSWORD").ok())
    }
}

fn default_search_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_index_name() -> String {
    "context-index".to_string()
}

// ============ Retrieval ============

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// One query over the whole index, fixed top-K.
    Simple,
    /// Per-source queries with min/max/weight selection and a char budget.
    #[default]
    Dynamic,
}

impl std::str::FromStr for RetrievalMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(RetrievalMode::Simple),
            "dynamic" => Ok(RetrievalMode::Dynamic),
            other => bail!("Unknown retrieval mode: {}. Use simple or dynamic.", other),
        }
    }
}

/// Per-source selection limits.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct SourceLimits {
    /// Hits always admitted, regardless of weighted score.
    pub min: usize,
    /// Hard cap on hits admitted; also the search size for this source.
    pub max: usize,
    /// Multiplier applied to scores of hits beyond `min`.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub mode: RetrievalMode,
    #[serde(default = "default_simple_top_k")]
    pub simple_top_k: usize,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_db_limits")]
    pub db: SourceLimits,
    #[serde(default = "default_github_limits")]
    pub github: SourceLimits,
    #[serde(default = "default_resume_limits")]
    pub resume: SourceLimits,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::default(),
            simple_top_k: default_simple_top_k(),
            max_prompt_chars: default_max_prompt_chars(),
            db: default_db_limits(),
            github: default_github_limits(),
            resume: default_resume_limits(),
        }
    }
}

impl RetrievalConfig {
    pub fn limits(&self, source: Source) -> SourceLimits {
        match source {
            Source::Db => self.db,
            Source::Github => self.github,
            Source::Resume => self.resume,
        }
    }
}

fn default_simple_top_k() -> usize {
    5
}
fn default_max_prompt_chars() -> usize {
    15_000
}
fn default_db_limits() -> SourceLimits {
    SourceLimits {
        min: 3,
        max: 7,
        weight: 1.2,
    }
}
fn default_github_limits() -> SourceLimits {
    SourceLimits {
        min: 1,
        max: 5,
        weight: 1.0,
    }
}
fn default_resume_limits() -> SourceLimits {
    SourceLimits {
        min: 1,
        max: 5,
        weight: 1.0,
    }
}

// ============ Completion ============

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// `"deepseek"` or `"openai"`.
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    /// Base URL. Defaults depend on the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            url: None,
            model: default_completion_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: None,
        }
    }
}

impl CompletionConfig {
    pub fn base_url(&self) -> String {
        let url = match (&self.url, self.provider.as_str()) {
            (Some(url), _) => url.clone(),
            (None, "openai") => "https://api.openai.com/v1".to_string(),
            (None, _) => "http://localhost:8000".to_string(),
        };
        url.trim_end_matches('/').to_string()
    }
}

fn default_completion_provider() -> String {
    "deepseek".to_string()
}
fn default_completion_model() -> String {
    "gpt-4.1-nano".to_string()
}
fn default_system_prompt() -> String {
    "You are a precise assistant. Answer the question using ONLY the provided context.".to_string()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_temperature() -> f32 {
    0.3
}

// ============ Snapshots ============

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

impl SnapshotConfig {
    pub fn snapshot_path(&self, source: Source) -> PathBuf {
        let name = match source {
            Source::Db => "db-context.json",
            Source::Github => "github-context.json",
            Source::Resume => "resume-context.json",
        };
        self.dir.join(name)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.join("cache.json")
    }
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_age_hours() -> u64 {
    24
}

// ============ Source readers ============

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub profile: Option<ProfileSourceConfig>,
    #[serde(default)]
    pub github: GithubSourceConfig,
    #[serde(default)]
    pub resume: Option<ResumeSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProfileSourceConfig {
    /// Base URL of the portfolio API, e.g. `https://example.com/api`.
    pub base_url: String,
    #[serde(default = "default_collections")]
    pub collections: Vec<CollectionConfig>,
    #[serde(default = "default_exclude_fields")]
    pub exclude_fields: Vec<String>,
    #[serde(default = "default_exclude_suffixes")]
    pub exclude_suffixes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    /// Collection name; becomes the chunk section label.
    pub name: String,
    /// Path under `base_url` returning a JSON array of records.
    pub path: String,
}

fn default_collections() -> Vec<CollectionConfig> {
    [
        ("experienceTable", "/getexperiences"),
        ("honorsExperienceTable", "/gethonorsexperiences"),
        ("involvementTable", "/getinvolvements"),
        ("projectTable", "/getprojects"),
        ("skillsCollection", "/getskills"),
        ("skillsTable", "/getskillcomponents"),
        ("yearInReviewTable", "/getyearinreviews"),
    ]
    .into_iter()
    .map(|(name, path)| CollectionConfig {
        name: name.to_string(),
        path: path.to_string(),
    })
    .collect()
}
fn default_exclude_fields() -> Vec<String> {
    vec!["_id".into(), "likesCount".into(), "deleted".into()]
}
fn default_exclude_suffixes() -> Vec<String> {
    vec!["Link".into(), "URLs".into(), "Images".into()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubSourceConfig {
    #[serde(default = "default_github_api")]
    pub api_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub include_readme: bool,
}

impl Default for GithubSourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api(),
            per_page: default_per_page(),
            include_readme: false,
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_per_page() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResumeSourceConfig {
    pub pdf_path: PathBuf,
}

// ============ Scheduler ============

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_health_poll_secs")]
    pub health_poll_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Refresh stale snapshots before chunking each cycle.
    #[serde(default = "default_true")]
    pub refresh_snapshots: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            health_poll_secs: default_health_poll_secs(),
            health_timeout_secs: default_health_timeout_secs(),
            refresh_snapshots: true,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
    pub fn health_poll(&self) -> Duration {
        Duration::from_secs(self.health_poll_secs)
    }
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

fn default_interval_secs() -> u64 {
    3600
}
fn default_health_poll_secs() -> u64 {
    2
}
fn default_health_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

// ============ Server ============

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Rejects configurations the pipeline cannot run with.
pub fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    for source in Source::ALL {
        let limits = config.retrieval.limits(source);
        if limits.min > limits.max {
            bail!(
                "retrieval.{}: min ({}) must be <= max ({})",
                source,
                limits.min,
                limits.max
            );
        }
        if limits.max == 0 {
            bail!("retrieval.{}.max must be >= 1", source);
        }
        if !limits.weight.is_finite() || limits.weight <= 0.0 {
            bail!("retrieval.{}.weight must be a positive number", source);
        }
    }
    if config.retrieval.max_prompt_chars == 0 {
        bail!("retrieval.max_prompt_chars must be > 0");
    }
    if config.retrieval.simple_top_k == 0 {
        bail!("retrieval.simple_top_k must be >= 1");
    }

    match config.completion.provider.as_str() {
        "deepseek" | "openai" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be deepseek or openai.",
            other
        ),
    }

    // Validate scheduler
    if config.scheduler.interval_secs == 0 {
        bail!("scheduler.interval_secs must be > 0");
    }
    if config.scheduler.health_poll_secs == 0 || config.scheduler.health_timeout_secs == 0 {
        bail!("scheduler health poll and timeout must be > 0");
    }

    if config.search.index_name.trim().is_empty() {
        bail!("search.index_name must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.search.index_name, "context-index");
        assert_eq!(config.retrieval.mode, RetrievalMode::Dynamic);
        assert_eq!(config.retrieval.max_prompt_chars, 15_000);
        assert_eq!(config.retrieval.db.min, 3);
        assert_eq!(config.retrieval.db.max, 7);
        assert!((config.retrieval.db.weight - 1.2).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.interval_secs, 3600);
        assert_eq!(config.completion.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let err = parse("[retrieval.github]\nmin = 4\nmax = 2\n").unwrap_err();
        assert!(err.to_string().contains("min (4) must be <= max (2)"));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(parse("[retrieval]\nmode = \"fuzzy\"\n").is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse("[completion]\nprovider = \"llama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown completion provider"));
    }

    #[test]
    fn test_openai_default_base_url() {
        let config = parse("[completion]\nprovider = \"openai\"\n").unwrap();
        assert_eq!(config.completion.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_profile_collections_default_order() {
        let config = parse("[sources.profile]\nbase_url = \"http://x/api\"\n").unwrap();
        let profile = config.sources.profile.unwrap();
        assert_eq!(profile.collections.len(), 7);
        assert_eq!(profile.collections[0].name, "experienceTable");
        assert_eq!(profile.collections[3].path, "/getprojects");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse(include_str!("../config/companion.example.toml")).unwrap();
        assert_eq!(config.retrieval.db.weight, 1.2);
        assert_eq!(
            config.sources.resume.unwrap().pdf_path,
            PathBuf::from("./assets/resume.pdf")
        );
    }
}
