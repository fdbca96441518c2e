//! Configuration types for the chat application.
//!
//! Values resolve in layers: defaults, then an optional YAML file, then the
//! environment, then command-line arguments parsed with `arrrg`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::client::{API_KEY_ENV, API_URL_ENV, DEFAULT_API_URL, DEFAULT_TIMEOUT};
use crate::streaming::MissingTerminal;
use crate::{Error, Result};

/// Default number of retries for a rate-limited chat request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay of the chat retry backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Delays between feedback submissions while the backend reports the record
/// as pending.
pub const DEFAULT_FEEDBACK_RETRY_STEPS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(4),
    Duration::from_secs(6),
];

/// Default location of the persisted session state.
pub const DEFAULT_STORAGE_PATH: &str = ".mecenas-state.json";

/// Command-line arguments for the mecenas-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the assistant backend.
    #[arrrg(optional, "Assistant API base URL", "URL")]
    pub api_url: Option<String>,

    /// Anonymous API key.
    #[arrrg(optional, "API key sent with every request", "KEY")]
    pub api_key: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "Path to a YAML config file", "PATH")]
    pub config: Option<String>,

    /// Session state file.
    #[arrrg(optional, "Path to the session state file (default: .mecenas-state.json)", "PATH")]
    pub storage: Option<String>,

    /// Retries for rate-limited requests.
    #[arrrg(optional, "Retries for rate-limited requests (default: 3)", "N")]
    pub max_retries: Option<u32>,

    /// Ask for the premium model.
    #[arrrg(flag, "Use the premium model (requires unlock)")]
    pub premium: bool,

    /// Treat a stream without a terminal frame as an error.
    #[arrrg(flag, "Fail streams that end without a terminal frame")]
    pub strict: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the assistant backend.
    pub api_url: String,

    /// Anonymous API key, if any.
    pub api_key: Option<String>,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Whether turns request the premium model.
    pub use_premium_model: bool,

    /// Retries for a rate-limited chat request.
    pub max_retries: u32,

    /// Base delay of the exponential chat backoff.
    pub retry_base_delay: Duration,

    /// Waits between feedback submissions while the record is pending.
    pub feedback_retry_steps: Vec<Duration>,

    /// Handling of streams that end without a terminal frame.
    pub missing_terminal: MissingTerminal,

    /// Where session state persists.
    pub storage_path: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - API URL: the local functions endpoint
    /// - Retries: 3, starting at one second
    /// - Feedback retries: 2s, 4s, 6s
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            use_premium_model: false,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            feedback_retry_steps: DEFAULT_FEEDBACK_RETRY_STEPS.to_vec(),
            missing_terminal: MissingTerminal::default(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            use_color: true,
        }
    }

    /// Sets the API base URL.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Requests the premium model.
    pub fn with_premium_model(mut self, enabled: bool) -> Self {
        self.use_premium_model = enabled;
        self
    }

    /// Sets the chat retry policy.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Sets the waits between pending feedback submissions.
    pub fn with_feedback_retry_steps(mut self, steps: Vec<Duration>) -> Self {
        self.feedback_retry_steps = steps;
        self
    }

    /// Sets the missing-terminal policy.
    pub fn with_missing_terminal(mut self, policy: MissingTerminal) -> Self {
        self.missing_terminal = policy;
        self
    }

    /// Sets the session state path.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Layer a YAML file over this configuration.
    pub fn with_yaml_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read {}", path.display()), err))?;
        self.with_yaml(&text)
    }

    /// Layer YAML text over this configuration.
    pub fn with_yaml(mut self, text: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text)?;
        if let Some(api_url) = file.api_url {
            self.api_url = api_url;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(premium) = file.use_premium_model {
            self.use_premium_model = premium;
        }
        if let Some(max_retries) = file.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(ms) = file.retry_base_delay_ms {
            if ms == 0 {
                return Err(Error::validation(
                    "retry_base_delay_ms must be positive",
                    Some("retry_base_delay_ms".to_string()),
                ));
            }
            self.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(steps) = file.feedback_retry_steps_ms {
            self.feedback_retry_steps = steps.into_iter().map(Duration::from_millis).collect();
        }
        if let Some(policy) = file.missing_terminal {
            self.missing_terminal = policy;
        }
        if let Some(path) = file.storage_path {
            self.storage_path = path;
        }
        if let Some(color) = file.use_color {
            self.use_color = color;
        }
        Ok(self)
    }

    /// Apply `MECENAS_API_URL` and `MECENAS_API_KEY` when set.
    pub fn with_env(mut self) -> Self {
        if let Ok(api_url) = std::env::var(API_URL_ENV)
            && !api_url.trim().is_empty()
        {
            self.api_url = api_url;
        }
        if let Ok(api_key) = std::env::var(API_KEY_ENV)
            && !api_key.trim().is_empty()
        {
            self.api_key = Some(api_key);
        }
        self
    }

    /// Apply command-line arguments. The `config` argument is handled by the
    /// caller before this layer.
    pub fn with_args(mut self, args: ChatArgs) -> Self {
        if let Some(api_url) = args.api_url {
            self.api_url = api_url;
        }
        if args.api_key.is_some() {
            self.api_key = args.api_key;
        }
        if let Some(storage) = args.storage {
            self.storage_path = PathBuf::from(storage);
        }
        if let Some(max_retries) = args.max_retries {
            self.max_retries = max_retries;
        }
        if args.premium {
            self.use_premium_model = true;
        }
        if args.strict {
            self.missing_terminal = MissingTerminal::Error;
        }
        if args.no_color {
            self.use_color = false;
        }
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        ChatConfig::new().with_args(args)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    api_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    use_premium_model: Option<bool>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    feedback_retry_steps_ms: Option<Vec<u64>>,
    missing_terminal: Option<MissingTerminal>,
    storage_path: Option<PathBuf>,
    use_color: Option<bool>,
}
