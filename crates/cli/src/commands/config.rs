use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use closer_core::config::AppConfig;
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::GlobalOptions;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    from_cli: bool,
}

pub fn run(options: &GlobalOptions) -> String {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: cli > env > file > default):".to_string()];
    for field in fields(&config, options) {
        let source = if field.from_cli {
            "cli".to_string()
        } else {
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
        };
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig, options: &GlobalOptions) -> Vec<Field> {
    let field = |key: &'static str, value: String, env_keys: &'static [&'static str]| Field {
        key,
        value,
        env_keys,
        from_cli: false,
    };
    let optional = |value: Option<&Path>| {
        value.map(|path| path.display().to_string()).unwrap_or_else(|| "<unset>".to_string())
    };

    vec![
        field("llm.provider", config.llm.provider.as_str().to_string(), &["CLOSER_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["CLOSER_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["CLOSER_LLM_BASE_URL"],
        ),
        field("llm.api_key", redact(config.llm.api_key.as_ref()), &["CLOSER_LLM_API_KEY", "OPENAI_API_KEY"]),
        Field {
            from_cli: options.workspace.is_some(),
            ..field(
                "workspace.root_dir",
                config.workspace.root_dir.display().to_string(),
                &["CLOSER_WORKSPACE_ROOT_DIR"],
            )
        },
        field(
            "workspace.template_dir",
            optional(config.workspace.template_dir.as_deref()),
            &["CLOSER_WORKSPACE_TEMPLATE_DIR"],
        ),
        field(
            "workspace.logo_path",
            optional(config.workspace.logo_path.as_deref()),
            &["CLOSER_WORKSPACE_LOGO_PATH"],
        ),
        field("branding.company_name", config.branding.company_name.clone(), &["CLOSER_BRANDING_COMPANY_NAME"]),
        field("branding.prepared_by", config.branding.prepared_by.clone(), &["CLOSER_BRANDING_PREPARED_BY"]),
        field(
            "google.credentials_path",
            config.google.credentials_path.display().to_string(),
            &["CLOSER_GOOGLE_CREDENTIALS_PATH"],
        ),
        field(
            "google.token_path",
            config.google.token_path.display().to_string(),
            &["CLOSER_GOOGLE_TOKEN_PATH"],
        ),
        field(
            "google.token_base64",
            redact(config.google.token_base64.as_ref()),
            &["CLOSER_GOOGLE_TOKEN_BASE64", "GOOGLE_TOKEN_BASE64"],
        ),
        field("google.sheet_id", config.google.sheet_id.clone(), &["CLOSER_GOOGLE_SHEET_ID", "ONBOARDING_SHEET_ID"]),
        field(
            "google.drive_root_folder",
            config.google.drive_root_folder.clone(),
            &["CLOSER_GOOGLE_DRIVE_ROOT_FOLDER"],
        ),
        field("deploy.mode", config.deploy.mode.as_str().to_string(), &["CLOSER_DEPLOY_MODE"]),
        field(
            "deploy.vercel_token",
            redact(config.deploy.vercel_token.as_ref()),
            &["CLOSER_DEPLOY_VERCEL_TOKEN", "VERCEL_TOKEN"],
        ),
        field("deploy.project_prefix", config.deploy.project_prefix.clone(), &["CLOSER_DEPLOY_PROJECT_PREFIX"]),
        field("email.sender", config.email.sender.clone(), &["CLOSER_EMAIL_SENDER"]),
        field("email.default_subject", config.email.default_subject.clone(), &["CLOSER_EMAIL_DEFAULT_SUBJECT"]),
        field("server.bind_address", config.server.bind_address.clone(), &["CLOSER_SERVER_BIND_ADDRESS"]),
        field("server.port", config.server.port.to_string(), &["CLOSER_SERVER_PORT", "PORT"]),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["CLOSER_LOGGING_LEVEL", "CLOSER_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["CLOSER_LOGGING_FORMAT", "CLOSER_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(path) = env::var_os("CLOSER_CONFIG").map(PathBuf::from) {
        return path.exists().then_some(path);
    }
    [PathBuf::from("closer.toml"), PathBuf::from("config/closer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim()) {
        None | Some("") => "<unset>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
