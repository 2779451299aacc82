use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub workspace: WorkspaceConfig,
    pub branding: BrandingConfig,
    pub google: GoogleConfig,
    pub deploy: DeployConfig,
    pub email: EmailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkspaceConfig {
    pub root_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    pub logo_path: Option<PathBuf>,
    pub hero_image_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct BrandingConfig {
    pub company_name: String,
    pub prepared_by: String,
    pub bank_details: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub credentials_base64: Option<SecretString>,
    pub token_base64: Option<SecretString>,
    pub sheet_id: String,
    pub drive_root_folder: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DeployConfig {
    pub mode: DeployMode,
    pub vercel_token: Option<SecretString>,
    pub team_id: Option<String>,
    pub project_prefix: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub sender: String,
    pub default_subject: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    Api,
    Cli,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub workspace_root: Option<PathBuf>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub deploy_mode: Option<DeployMode>,
    pub sheet_id: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error("{setting} is not configured; set {hint}")]
    MissingCredential { setting: &'static str, hint: &'static str },
}

pub const DEFAULT_SHEET_ID: &str = "1ZVww3zCFkyLtlj7jcUXbuh6MK0CoRViU23FegPTHOIU";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-5-nano".to_string(),
                timeout_secs: 60,
            },
            workspace: WorkspaceConfig {
                root_dir: PathBuf::from(".tmp"),
                template_dir: None,
                logo_path: None,
                hero_image_path: None,
            },
            branding: BrandingConfig {
                company_name: "InstantProd".to_string(),
                prepared_by: "InstantProd".to_string(),
                bank_details: None,
            },
            google: GoogleConfig {
                credentials_path: PathBuf::from("credentials.json"),
                token_path: PathBuf::from("token.json"),
                credentials_base64: None,
                token_base64: None,
                sheet_id: DEFAULT_SHEET_ID.to_string(),
                drive_root_folder: "InstantProd Proposals".to_string(),
                timeout_secs: 30,
            },
            deploy: DeployConfig {
                mode: DeployMode::Api,
                vercel_token: None,
                team_id: None,
                project_prefix: "proposal-".to_string(),
                timeout_secs: 120,
            },
            email: EmailConfig {
                sender: "me".to_string(),
                default_subject: "Your Proposal from InstantProd".to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn secret_is_blank(value: Option<&SecretString>) -> bool {
    value.map(|secret| secret.expose_secret().trim().is_empty()).unwrap_or(true)
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for DeployMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "cli" => Ok(Self::Cli),
            other => Err(ConfigError::Validation(format!(
                "unsupported deploy mode `{other}` (expected api|cli)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl DeployMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Cli => "cli",
        }
    }
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl LlmConfig {
    /// Returns the API key for hosted providers. Ollama runs without one.
    pub fn require_api_key(&self) -> Result<Option<&SecretString>, ConfigError> {
        match self.provider {
            LlmProvider::Ollama => Ok(self.api_key.as_ref()),
            LlmProvider::OpenAi | LlmProvider::Anthropic => {
                if secret_is_blank(self.api_key.as_ref()) {
                    return Err(ConfigError::MissingCredential {
                        setting: "llm.api_key",
                        hint: "OPENAI_API_KEY or CLOSER_LLM_API_KEY",
                    });
                }
                Ok(self.api_key.as_ref())
            }
        }
    }

    pub fn effective_base_url(&self) -> String {
        if let Some(base_url) = self.base_url.as_deref().filter(|value| !value.trim().is_empty()) {
            return base_url.trim_end_matches('/').to_string();
        }
        match self.provider {
            LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
            LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
            LlmProvider::Ollama => "http://localhost:11434/v1".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn require_vercel_token(&self) -> Result<&SecretString, ConfigError> {
        match self.vercel_token.as_ref() {
            Some(token) if !token.expose_secret().trim().is_empty() => Ok(token),
            _ => Err(ConfigError::MissingCredential {
                setting: "deploy.vercel_token",
                hint: "VERCEL_TOKEN or CLOSER_DEPLOY_VERCEL_TOKEN",
            }),
        }
    }
}

/// Reads a `.env` file into the process environment before config is loaded. With no path
/// it searches the working directory and its parents. Variables already set are kept and a
/// missing file is ignored. Returns the file that was read.
pub fn load_dotenv(path: Option<&Path>) -> Option<PathBuf> {
    match path {
        Some(path) => dotenvy::from_path(path).ok().map(|()| path.to_path_buf()),
        None => dotenvy::dotenv().ok(),
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("closer.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(workspace) = patch.workspace {
            if let Some(root_dir) = workspace.root_dir {
                self.workspace.root_dir = root_dir;
            }
            if let Some(template_dir) = workspace.template_dir {
                self.workspace.template_dir = Some(template_dir);
            }
            if let Some(logo_path) = workspace.logo_path {
                self.workspace.logo_path = Some(logo_path);
            }
            if let Some(hero_image_path) = workspace.hero_image_path {
                self.workspace.hero_image_path = Some(hero_image_path);
            }
        }

        if let Some(branding) = patch.branding {
            if let Some(company_name) = branding.company_name {
                self.branding.company_name = company_name;
            }
            if let Some(prepared_by) = branding.prepared_by {
                self.branding.prepared_by = prepared_by;
            }
            if let Some(bank_details) = branding.bank_details {
                self.branding.bank_details = Some(bank_details);
            }
        }

        if let Some(google) = patch.google {
            if let Some(credentials_path) = google.credentials_path {
                self.google.credentials_path = credentials_path;
            }
            if let Some(token_path) = google.token_path {
                self.google.token_path = token_path;
            }
            if let Some(value) = google.credentials_base64 {
                self.google.credentials_base64 = Some(secret_value(value));
            }
            if let Some(value) = google.token_base64 {
                self.google.token_base64 = Some(secret_value(value));
            }
            if let Some(sheet_id) = google.sheet_id {
                self.google.sheet_id = sheet_id;
            }
            if let Some(drive_root_folder) = google.drive_root_folder {
                self.google.drive_root_folder = drive_root_folder;
            }
            if let Some(timeout_secs) = google.timeout_secs {
                self.google.timeout_secs = timeout_secs;
            }
        }

        if let Some(deploy) = patch.deploy {
            if let Some(mode) = deploy.mode {
                self.deploy.mode = mode;
            }
            if let Some(token) = deploy.vercel_token {
                self.deploy.vercel_token = Some(secret_value(token));
            }
            if let Some(team_id) = deploy.team_id {
                self.deploy.team_id = Some(team_id);
            }
            if let Some(project_prefix) = deploy.project_prefix {
                self.deploy.project_prefix = project_prefix;
            }
            if let Some(timeout_secs) = deploy.timeout_secs {
                self.deploy.timeout_secs = timeout_secs;
            }
        }

        if let Some(email) = patch.email {
            if let Some(sender) = email.sender {
                self.email.sender = sender;
            }
            if let Some(default_subject) = email.default_subject {
                self.email.default_subject = default_subject;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CLOSER_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("CLOSER_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"))
        {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLOSER_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("CLOSER_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("CLOSER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("CLOSER_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLOSER_WORKSPACE_ROOT_DIR") {
            self.workspace.root_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("CLOSER_WORKSPACE_TEMPLATE_DIR") {
            self.workspace.template_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CLOSER_WORKSPACE_LOGO_PATH") {
            self.workspace.logo_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("CLOSER_WORKSPACE_HERO_IMAGE_PATH") {
            self.workspace.hero_image_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("CLOSER_BRANDING_COMPANY_NAME") {
            self.branding.company_name = value;
        }
        if let Some(value) = read_env("CLOSER_BRANDING_PREPARED_BY") {
            self.branding.prepared_by = value;
        }
        if let Some(value) = read_env("CLOSER_BRANDING_BANK_DETAILS") {
            self.branding.bank_details = Some(value);
        }

        if let Some(value) = read_env("CLOSER_GOOGLE_CREDENTIALS_PATH") {
            self.google.credentials_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("CLOSER_GOOGLE_TOKEN_PATH") {
            self.google.token_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("CLOSER_GOOGLE_CREDENTIALS_BASE64")
            .or_else(|| read_env("GOOGLE_CREDENTIALS_BASE64"))
        {
            self.google.credentials_base64 = Some(secret_value(value));
        }
        if let Some(value) =
            read_env("CLOSER_GOOGLE_TOKEN_BASE64").or_else(|| read_env("GOOGLE_TOKEN_BASE64"))
        {
            self.google.token_base64 = Some(secret_value(value));
        }
        if let Some(value) =
            read_env("CLOSER_GOOGLE_SHEET_ID").or_else(|| read_env("ONBOARDING_SHEET_ID"))
        {
            self.google.sheet_id = value;
        }
        if let Some(value) = read_env("CLOSER_GOOGLE_DRIVE_ROOT_FOLDER") {
            self.google.drive_root_folder = value;
        }
        if let Some(value) = read_env("CLOSER_GOOGLE_TIMEOUT_SECS") {
            self.google.timeout_secs = parse_u64("CLOSER_GOOGLE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLOSER_DEPLOY_MODE") {
            self.deploy.mode = value.parse()?;
        }
        if let Some(value) =
            read_env("CLOSER_DEPLOY_VERCEL_TOKEN").or_else(|| read_env("VERCEL_TOKEN"))
        {
            self.deploy.vercel_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CLOSER_DEPLOY_TEAM_ID") {
            self.deploy.team_id = Some(value);
        }
        if let Some(value) = read_env("CLOSER_DEPLOY_PROJECT_PREFIX") {
            self.deploy.project_prefix = value;
        }
        if let Some(value) = read_env("CLOSER_DEPLOY_TIMEOUT_SECS") {
            self.deploy.timeout_secs = parse_u64("CLOSER_DEPLOY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CLOSER_EMAIL_SENDER") {
            self.email.sender = value;
        }
        if let Some(value) = read_env("CLOSER_EMAIL_DEFAULT_SUBJECT") {
            self.email.default_subject = value;
        }

        if let Some(value) = read_env("CLOSER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CLOSER_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("CLOSER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CLOSER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CLOSER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("CLOSER_LOGGING_LEVEL").or_else(|| read_env("CLOSER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLOSER_LOGGING_FORMAT").or_else(|| read_env("CLOSER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(workspace_root) = overrides.workspace_root {
            self.workspace.root_dir = workspace_root;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(deploy_mode) = overrides.deploy_mode {
            self.deploy.mode = deploy_mode;
        }
        if let Some(sheet_id) = overrides.sheet_id {
            self.google.sheet_id = sheet_id;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_workspace(&self.workspace)?;
        validate_google(&self.google)?;
        validate_deploy(&self.deploy)?;
        validate_email(&self.email)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    if let Some(from_env) = read_env("CLOSER_CONFIG").map(PathBuf::from) {
        return from_env.exists().then_some(from_env);
    }

    [PathBuf::from("closer.toml"), PathBuf::from("config/closer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_http_url(setting: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{setting} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_timeout(setting: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 600 {
        return Err(ConfigError::Validation(format!("{setting} must be in range 1..=600")));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_timeout("llm.timeout_secs", llm.timeout_secs)?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = llm.base_url.as_deref().filter(|value| !value.trim().is_empty()) {
        validate_http_url("llm.base_url", base_url)?;
    }

    Ok(())
}

fn validate_workspace(workspace: &WorkspaceConfig) -> Result<(), ConfigError> {
    if workspace.root_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("workspace.root_dir must not be empty".to_string()));
    }
    Ok(())
}

fn validate_google(google: &GoogleConfig) -> Result<(), ConfigError> {
    validate_timeout("google.timeout_secs", google.timeout_secs)?;

    if google.drive_root_folder.trim().is_empty() {
        return Err(ConfigError::Validation(
            "google.drive_root_folder must not be empty".to_string(),
        ));
    }
    if google.drive_root_folder.contains('\'') {
        return Err(ConfigError::Validation(
            "google.drive_root_folder must not contain single quotes".to_string(),
        ));
    }

    Ok(())
}

fn validate_deploy(deploy: &DeployConfig) -> Result<(), ConfigError> {
    validate_timeout("deploy.timeout_secs", deploy.timeout_secs)?;

    let prefix_ok = deploy
        .project_prefix
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if !prefix_ok {
        return Err(ConfigError::Validation(
            "deploy.project_prefix may only contain lowercase letters, digits and `-`".to_string(),
        ));
    }

    Ok(())
}

fn validate_email(email: &EmailConfig) -> Result<(), ConfigError> {
    if email.sender.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.sender must not be empty (use `me` for the authorized account)".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    workspace: Option<WorkspacePatch>,
    branding: Option<BrandingPatch>,
    google: Option<GooglePatch>,
    deploy: Option<DeployPatch>,
    email: Option<EmailPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspacePatch {
    root_dir: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    logo_path: Option<PathBuf>,
    hero_image_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct BrandingPatch {
    company_name: Option<String>,
    prepared_by: Option<String>,
    bank_details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GooglePatch {
    credentials_path: Option<PathBuf>,
    token_path: Option<PathBuf>,
    credentials_base64: Option<String>,
    token_base64: Option<String>,
    sheet_id: Option<String>,
    drive_root_folder: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DeployPatch {
    mode: Option<DeployMode>,
    vercel_token: Option<String>,
    team_id: Option<String>,
    project_prefix: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EmailPatch {
    sender: Option<String>,
    default_subject: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        load_dotenv, AppConfig, ConfigError, ConfigOverrides, DeployMode, LlmProvider, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CLOSER_VERCEL_TOKEN", "vercel-from-env");
        env::set_var("TEST_CLOSER_SHEET", "sheet-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("closer.toml");
            fs::write(
                &path,
                r#"
[deploy]
vercel_token = "${TEST_CLOSER_VERCEL_TOKEN}"

[google]
sheet_id = "${TEST_CLOSER_SHEET}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config.deploy.require_vercel_token().map_err(|err| err.to_string())?;
            ensure(
                token.expose_secret() == "vercel-from-env",
                "vercel token should be loaded from environment",
            )?;
            ensure(config.google.sheet_id == "sheet-from-env", "sheet id should be interpolated")?;
            Ok(())
        })();

        clear_vars(&["TEST_CLOSER_VERCEL_TOKEN", "TEST_CLOSER_SHEET"]);
        result
    }

    #[test]
    fn unterminated_interpolation_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("closer.toml");
        fs::write(&path, "[llm]\nmodel = \"${BROKEN\"\n").map_err(|err| err.to_string())?;

        let result =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(result, Err(ConfigError::UnterminatedInterpolation)),
            "unterminated ${ should be reported",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSER_LOG_LEVEL", "warn");
        env::set_var("CLOSER_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CLOSER_LOG_LEVEL", "CLOSER_LOG_FORMAT"]);
        result
    }

    #[test]
    fn deployment_env_aliases_are_honoured() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("OPENAI_API_KEY", "sk-alias");
        env::set_var("ONBOARDING_SHEET_ID", "sheet-alias");
        env::set_var("PORT", "9001");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            let key = config.llm.require_api_key().map_err(|err| err.to_string())?;
            ensure(
                key.map(|value| value.expose_secret() == "sk-alias").unwrap_or(false),
                "OPENAI_API_KEY should populate llm.api_key",
            )?;
            ensure(config.google.sheet_id == "sheet-alias", "ONBOARDING_SHEET_ID alias")?;
            ensure(config.server.port == 9001, "PORT alias should set the server port")?;
            Ok(())
        })();

        clear_vars(&["OPENAI_API_KEY", "ONBOARDING_SHEET_ID", "PORT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSER_LLM_MODEL", "model-from-env");
        env::set_var("CLOSER_DEPLOY_MODE", "cli");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("closer.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "anthropic"
model = "model-from-file"

[workspace]
root_dir = "from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    workspace_root: Some(PathBuf::from("from-override")),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.workspace.root_dir == PathBuf::from("from-override"),
                "override workspace root should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.llm.model == "model-from-env", "env model should win over file")?;
            ensure(config.llm.provider == LlmProvider::Anthropic, "file provider should apply")?;
            ensure(config.deploy.mode == DeployMode::Cli, "env deploy mode should apply")?;
            Ok(())
        })();

        clear_vars(&["CLOSER_LLM_MODEL", "CLOSER_DEPLOY_MODE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSER_LLM_BASE_URL", "ftp://nowhere");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.base_url")
            );
            ensure(has_message, "validation failure should mention llm.base_url")
        })();

        clear_vars(&["CLOSER_LLM_BASE_URL"]);
        result
    }

    #[test]
    fn missing_credentials_name_the_variable_to_set() -> Result<(), String> {
        let config = AppConfig::default();

        let llm_error = match config.llm.require_api_key() {
            Ok(_) => return Err("default config should not carry an api key".to_string()),
            Err(error) => error.to_string(),
        };
        ensure(llm_error.contains("OPENAI_API_KEY"), "llm error should name OPENAI_API_KEY")?;

        let deploy_error = match config.deploy.require_vercel_token() {
            Ok(_) => return Err("default config should not carry a vercel token".to_string()),
            Err(error) => error.to_string(),
        };
        ensure(deploy_error.contains("VERCEL_TOKEN"), "deploy error should name VERCEL_TOKEN")
    }

    #[test]
    fn ollama_does_not_require_api_key() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        ensure(config.llm.require_api_key().is_ok(), "ollama runs without a key")?;
        ensure(
            config.llm.effective_base_url() == "http://localhost:11434/v1",
            "ollama should default to the local endpoint",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CLOSER_LLM_API_KEY", "sk-secret-value");
        env::set_var("CLOSER_DEPLOY_VERCEL_TOKEN", "vercel-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("vercel-secret-value"),
                "debug output should not contain vercel token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["CLOSER_LLM_API_KEY", "CLOSER_DEPLOY_VERCEL_TOKEN"]);
        result
    }

    #[test]
    fn dotenv_file_feeds_env_overrides_without_clobbering_the_shell() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["CLOSER_LLM_MODEL", "CLOSER_SERVER_PORT"]);
        env::set_var("CLOSER_SERVER_PORT", "9100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join(".env");
            fs::write(&path, "CLOSER_LLM_MODEL=model-from-dotenv\nCLOSER_SERVER_PORT=9200\n")
                .map_err(|err| err.to_string())?;

            ensure(load_dotenv(Some(&path)) == Some(path.clone()), "dotenv file should load")?;
            ensure(
                load_dotenv(Some(&dir.path().join("missing.env"))).is_none(),
                "missing dotenv file is skipped",
            )?;

            let config = AppConfig::load(LoadOptions::default()).map_err(|err| err.to_string())?;
            ensure(config.llm.model == "model-from-dotenv", "model should come from .env")?;
            ensure(config.server.port == 9100, "shell env should win over .env")?;
            Ok(())
        })();

        clear_vars(&["CLOSER_LLM_MODEL", "CLOSER_SERVER_PORT"]);
        result
    }
}
