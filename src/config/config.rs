use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TaskConfig {
    #[serde(default = "default_wake_interval_secs")]
    pub wake_interval_secs: u64,
    #[serde(default = "default_progress_interval_mins")]
    pub progress_interval_mins: i64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            wake_interval_secs: default_wake_interval_secs(),
            progress_interval_mins: default_progress_interval_mins(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GEMPOCKET").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${GEMINI_API_KEY}
        app_config.storage.base_dir = expand_env(&app_config.storage.base_dir);
        app_config.gemini.api_key = app_config
            .gemini
            .api_key
            .as_deref()
            .map(expand_env)
            .filter(|key| !key.is_empty());

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_default()
    } else {
        val.to_string()
    }
}

fn default_base_dir() -> String {
    "./gemini-data".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models/".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.95
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_wake_interval_secs() -> u64 {
    300
}

fn default_progress_interval_mins() -> i64 {
    5
}
