use std::fmt;

pub const OPEN_AI_DEFAULT_HOST: &str = "https://api.openai.com";
pub const OPEN_AI_DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

#[derive(Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub timeout_secs: u64,
}

impl OpenAiProviderConfig {
    pub fn new<K: Into<String>>(api_key: K) -> Self {
        Self {
            host: OPEN_AI_DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            model: OPEN_AI_DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// The api key stays out of logs
impl fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("host", &self.host)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
