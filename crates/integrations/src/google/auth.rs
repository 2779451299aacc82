//! Google OAuth for an installed-app ("authorized user") token.
//!
//! Only the refresh-token grant is implemented. The first consent has to happen
//! elsewhere and produce `token.json`; hosted deployments ship that file as
//! base64 in `GOOGLE_TOKEN_BASE64`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use closer_core::config::GoogleConfig;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{ensure_success, IntegrationError};

pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/gmail.send",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const REFRESH_MARGIN_SECS: i64 = 60;
const SERVICE: &str = "google oauth";

/// On-disk authorized-user token, in the format Google's client libraries write.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for TokenFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenFile")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl TokenFile {
    pub fn expiry_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| naive.and_utc())
            })
            .ok()
    }

    /// A token is reusable when it exists and expires more than a minute from `now`.
    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        let has_token = self.token.as_deref().map(|token| !token.is_empty()).unwrap_or(false);
        match self.expiry_at() {
            Some(expiry) => has_token && expiry - chrono::Duration::seconds(REFRESH_MARGIN_SECS) > now,
            None => false,
        }
    }

    fn fill_client(&mut self, client: &OAuthClient) {
        if self.client_id.is_none() {
            self.client_id = Some(client.client_id.clone());
        }
        if self.client_secret.is_none() {
            self.client_secret = Some(client.client_secret.clone());
        }
        if self.token_uri.is_none() {
            self.token_uri = client.token_uri.clone();
        }
    }
}

/// `credentials.json` as downloaded from the Google Cloud console.
#[derive(Clone, Deserialize)]
struct ClientSecretsFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

#[derive(Clone, Deserialize)]
struct OAuthClient {
    client_id: String,
    client_secret: String,
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct GoogleAuth {
    http: reqwest::Client,
    credentials_path: PathBuf,
    token_path: PathBuf,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAuth")
            .field("credentials_path", &self.credentials_path)
            .field("token_path", &self.token_path)
            .finish_non_exhaustive()
    }
}

impl GoogleAuth {
    pub fn new(http: reqwest::Client, credentials_path: PathBuf, token_path: PathBuf) -> Self {
        Self { http, credentials_path, token_path, cached: Mutex::new(None) }
    }

    /// Restores credential files from config secrets, then builds the authenticator.
    pub async fn from_config(config: &GoogleConfig) -> Result<Self, IntegrationError> {
        let paths = restore_credential_files(config, running_on_vercel()).await?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(IntegrationError::transport(SERVICE))?;
        Ok(Self::new(http, paths.credentials_path, paths.token_path))
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub async fn access_token(&self) -> Result<String, IntegrationError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at - chrono::Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.access_token.clone());
            }
        }

        let mut file = self.read_token_file().await?;
        if file.usable_at(now) {
            if let (Some(access_token), Some(expires_at)) = (file.token.clone(), file.expiry_at()) {
                *cached = Some(CachedToken { access_token: access_token.clone(), expires_at });
                return Ok(access_token);
            }
        }

        let refreshed = self.refresh(&mut file).await?;
        *cached = Some(refreshed.clone());
        Ok(refreshed.access_token)
    }

    async fn read_token_file(&self) -> Result<TokenFile, IntegrationError> {
        let raw = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(IntegrationError::NotConfigured {
                    what: "google authorization",
                    hint: format!(
                        "no authorized token at `{}`; complete the OAuth consent once and provide token.json or GOOGLE_TOKEN_BASE64",
                        self.token_path.display()
                    ),
                });
            }
            Err(error) => return Err(IntegrationError::io(&self.token_path)(error)),
        };
        serde_json::from_str(&raw).map_err(|error| {
            IntegrationError::Auth(format!(
                "`{}` is not an authorized-user token: {error}",
                self.token_path.display()
            ))
        })
    }

    async fn read_client(&self) -> Result<Option<OAuthClient>, IntegrationError> {
        let raw = match tokio::fs::read_to_string(&self.credentials_path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(IntegrationError::io(&self.credentials_path)(error)),
        };
        let secrets: ClientSecretsFile = serde_json::from_str(&raw).map_err(|error| {
            IntegrationError::Auth(format!(
                "`{}` is not an OAuth client file: {error}",
                self.credentials_path.display()
            ))
        })?;
        Ok(secrets.installed.or(secrets.web))
    }

    async fn refresh(&self, file: &mut TokenFile) -> Result<CachedToken, IntegrationError> {
        if file.client_id.is_none() || file.client_secret.is_none() {
            if let Some(client) = self.read_client().await? {
                file.fill_client(&client);
            }
        }

        let refresh_token = file.refresh_token.clone().ok_or_else(|| {
            IntegrationError::Auth(
                "token has expired and carries no refresh_token; re-run the consent flow"
                    .to_string(),
            )
        })?;
        let (Some(client_id), Some(client_secret)) = (file.client_id.clone(), file.client_secret.clone())
        else {
            return Err(IntegrationError::Auth(
                "client_id/client_secret missing from token.json and credentials.json".to_string(),
            ));
        };
        let token_uri = file.token_uri.clone().unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let response = self
            .http
            .post(&token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(IntegrationError::transport(SERVICE))?;
        let response = ensure_success(SERVICE, response).await?;
        let body: RefreshResponse =
            response.json().await.map_err(IntegrationError::decode(SERVICE))?;
        if body.access_token.is_empty() {
            return Err(IntegrationError::Auth("token endpoint returned an empty token".to_string()));
        }

        let expires_at = Utc::now() + chrono::Duration::seconds(body.expires_in.unwrap_or(3600));
        file.token = Some(body.access_token.clone());
        file.expiry = Some(expires_at.to_rfc3339_opts(SecondsFormat::Micros, true));
        self.persist(file).await;

        info!(event_name = "google.auth.refreshed", expires_at = %expires_at, "access token refreshed");
        Ok(CachedToken { access_token: body.access_token, expires_at })
    }

    async fn persist(&self, file: &TokenFile) {
        let serialized = match serde_json::to_string_pretty(file) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(error = %error, "could not serialize refreshed token");
                return;
            }
        };
        if let Err(error) = tokio::fs::write(&self.token_path, serialized).await {
            warn!(
                event_name = "google.auth.persist_failed",
                path = %self.token_path.display(),
                error = %error,
                "refreshed token kept in memory only"
            );
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialPaths {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

pub fn running_on_vercel() -> bool {
    std::env::var_os("VERCEL").is_some()
}

/// Writes `credentials.json`/`token.json` from their base64 secrets when the files are
/// absent. On serverless hosts the files go to the temp directory, the only writable path.
pub async fn restore_credential_files(
    config: &GoogleConfig,
    serverless: bool,
) -> Result<CredentialPaths, IntegrationError> {
    let place = |path: &Path| -> PathBuf {
        if serverless {
            let name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.to_path_buf());
            std::env::temp_dir().join(name)
        } else {
            path.to_path_buf()
        }
    };
    let paths = CredentialPaths {
        credentials_path: place(&config.credentials_path),
        token_path: place(&config.token_path),
    };

    let pending = [
        (&paths.credentials_path, config.credentials_base64.as_ref()),
        (&paths.token_path, config.token_base64.as_ref()),
    ];
    for (path, encoded) in pending {
        let Some(encoded) = encoded else { continue };
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            continue;
        }
        let decoded = STANDARD.decode(encoded.expose_secret().trim()).map_err(|error| {
            IntegrationError::Auth(format!("base64 secret for `{}` is invalid: {error}", path.display()))
        })?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(IntegrationError::io(parent))?;
        }
        tokio::fs::write(path, decoded).await.map_err(IntegrationError::io(path.as_path()))?;
        info!(event_name = "google.auth.restored", path = %path.display(), "credential file restored");
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::{TimeZone, Utc};
    use closer_core::config::AppConfig;
    use tempfile::TempDir;

    use super::{restore_credential_files, GoogleAuth, TokenFile};
    use crate::error::IntegrationError;

    #[test]
    fn token_usability_respects_refresh_margin() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().expect("time");
        let file = TokenFile {
            token: Some("ya29.token".to_string()),
            expiry: Some("2025-01-01T12:30:00.000000Z".to_string()),
            ..TokenFile::default()
        };
        assert!(file.usable_at(now));

        let nearly_expired = TokenFile {
            expiry: Some("2025-01-01T12:00:30Z".to_string()),
            ..file.clone()
        };
        assert!(!nearly_expired.usable_at(now));

        let naive_expiry = TokenFile { expiry: Some("2025-01-01T13:00:00".to_string()), ..file };
        assert!(naive_expiry.usable_at(now));
    }

    #[test]
    fn debug_redacts_secrets() {
        let file = TokenFile {
            token: Some("ya29.secret".to_string()),
            refresh_token: Some("1//refresh".to_string()),
            client_secret: Some("shh".to_string()),
            ..TokenFile::default()
        };
        let debug = format!("{file:?}");
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//refresh"));
        assert!(!debug.contains("shh"));
    }

    #[test]
    fn unknown_token_fields_survive_round_trip() {
        let raw = r#"{"token":"t","universe_domain":"googleapis.com","account":""}"#;
        let file: TokenFile = serde_json::from_str(raw).expect("parse");
        let back = serde_json::to_value(&file).expect("serialize");
        assert_eq!(back["universe_domain"], "googleapis.com");
    }

    #[tokio::test]
    async fn restores_missing_files_from_base64() {
        let dir = TempDir::new().expect("tempdir");
        let mut config = AppConfig::default().google;
        config.credentials_path = dir.path().join("credentials.json");
        config.token_path = dir.path().join("token.json");
        config.credentials_base64 = Some(STANDARD.encode(r#"{"installed":{}}"#).into());
        config.token_base64 = Some(STANDARD.encode(r#"{"token":"t"}"#).into());
        std::fs::write(&config.token_path, "existing").expect("write");

        let paths = restore_credential_files(&config, false).await.expect("restore");

        let credentials = std::fs::read_to_string(&paths.credentials_path).expect("read");
        assert_eq!(credentials, r#"{"installed":{}}"#);
        let token = std::fs::read_to_string(&paths.token_path).expect("read");
        assert_eq!(token, "existing", "existing files are left alone");
    }

    #[tokio::test]
    async fn missing_token_file_is_reported_as_not_configured() {
        let dir = TempDir::new().expect("tempdir");
        let auth = GoogleAuth::new(
            reqwest::Client::new(),
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        );

        let error = auth.access_token().await.expect_err("no token file");
        assert!(matches!(error, IntegrationError::NotConfigured { .. }));
        assert!(error.to_string().contains("GOOGLE_TOKEN_BASE64"));
    }

    #[tokio::test]
    async fn valid_token_file_is_used_without_refresh() {
        let dir = TempDir::new().expect("tempdir");
        let token_path = dir.path().join("token.json");
        let expiry = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        std::fs::write(&token_path, format!(r#"{{"token":"ya29.live","expiry":"{expiry}"}}"#))
            .expect("write");

        let auth =
            GoogleAuth::new(reqwest::Client::new(), dir.path().join("credentials.json"), token_path);
        assert_eq!(auth.access_token().await.expect("token"), "ya29.live");
    }
}
