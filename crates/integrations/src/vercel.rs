//! Static-site publishing to Vercel, either over the REST API or by shelling out to the
//! Vercel CLI through `npx`.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use closer_core::config::DeployConfig;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{ensure_success, IntegrationError};

const DEPLOYMENTS_URL: &str = "https://api.vercel.com/v13/deployments";
const SERVICE: &str = "vercel";
pub const VERCEL_JSON: &str = "{\n  \"cleanUrls\": true\n}\n";

/// The two files every proposal site consists of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticSite {
    pub project_name: String,
    pub index_html: String,
}

impl StaticSite {
    pub fn files(&self) -> [(&'static str, &str); 2] {
        [("index.html", self.index_html.as_str()), ("vercel.json", VERCEL_JSON)]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub url: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, site: &StaticSite) -> Result<Deployment, IntegrationError>;

    fn mode(&self) -> &'static str;
}

#[derive(Deserialize)]
struct CreatedDeployment {
    id: Option<String>,
    url: Option<String>,
    #[serde(default)]
    alias: Vec<String>,
}

pub struct VercelApiDeployer {
    http: reqwest::Client,
    token: SecretString,
    team_id: Option<String>,
}

impl fmt::Debug for VercelApiDeployer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VercelApiDeployer")
            .field("token", &"[REDACTED]")
            .field("team_id", &self.team_id)
            .finish_non_exhaustive()
    }
}

impl VercelApiDeployer {
    pub fn new(http: reqwest::Client, token: SecretString, team_id: Option<String>) -> Self {
        Self { http, token, team_id }
    }

    pub fn from_config(config: &DeployConfig) -> Result<Self, IntegrationError> {
        let token = config.vercel_token.clone().ok_or_else(|| IntegrationError::NotConfigured {
            what: "vercel token",
            hint: "set VERCEL_TOKEN or deploy.vercel_token, or switch deploy.mode to `cli`"
                .to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(IntegrationError::transport(SERVICE))?;
        Ok(Self::new(http, token, config.team_id.clone()))
    }
}

pub fn deployment_payload(site: &StaticSite) -> serde_json::Value {
    let files: Vec<serde_json::Value> = site
        .files()
        .iter()
        .map(|(file, data)| json!({ "file": file, "data": data, "encoding": "utf-8" }))
        .collect();
    json!({
        "name": site.project_name,
        "files": files,
        "target": "production",
        "projectSettings": { "framework": null },
    })
}

#[async_trait]
impl Deployer for VercelApiDeployer {
    async fn deploy(&self, site: &StaticSite) -> Result<Deployment, IntegrationError> {
        let mut url = Url::parse(DEPLOYMENTS_URL)
            .map_err(|error| IntegrationError::InvalidRequest(error.to_string()))?;
        if let Some(team_id) = self.team_id.as_deref().filter(|id| !id.is_empty()) {
            url.query_pairs_mut().append_pair("teamId", team_id);
        }

        let response = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(&deployment_payload(site))
            .send()
            .await
            .map_err(IntegrationError::transport(SERVICE))?;
        let response = ensure_success(SERVICE, response).await?;
        let created: CreatedDeployment =
            response.json().await.map_err(IntegrationError::decode(SERVICE))?;

        let host = created.alias.into_iter().next().or(created.url).ok_or_else(|| {
            IntegrationError::Decode {
                service: SERVICE,
                message: "deployment response carried no url".to_string(),
            }
        })?;
        let deployment = Deployment {
            url: normalize_url(&host),
            project: site.project_name.clone(),
            id: created.id,
        };
        info!(
            event_name = "vercel.deployment.created",
            mode = self.mode(),
            project = %deployment.project,
            url = %deployment.url,
            "proposal deployed"
        );
        Ok(deployment)
    }

    fn mode(&self) -> &'static str {
        "api"
    }
}

/// Stages the site on disk and runs `npx -y vercel --prod`.
#[derive(Clone, Debug)]
pub struct VercelCliDeployer {
    stage_root: PathBuf,
    token: Option<SecretString>,
}

impl VercelCliDeployer {
    pub fn new(stage_root: impl Into<PathBuf>, token: Option<SecretString>) -> Self {
        Self { stage_root: stage_root.into(), token }
    }

    /// Writes a fresh copy of the site under `stage_root/{project}`. Files from an
    /// earlier deploy of the same project are removed first.
    async fn stage(&self, site: &StaticSite) -> Result<PathBuf, IntegrationError> {
        let project = site.project_name.as_str();
        if project.is_empty()
            || project.contains(['/', '\\'])
            || project.contains("..")
        {
            return Err(IntegrationError::InvalidRequest(format!(
                "project name `{project}` must be a single path segment"
            )));
        }

        let dir = self.stage_root.join(project);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(IntegrationError::io(dir.as_path())(error)),
        }
        tokio::fs::create_dir_all(&dir).await.map_err(IntegrationError::io(dir.as_path()))?;
        for (name, contents) in site.files() {
            let path = dir.join(name);
            tokio::fs::write(&path, contents).await.map_err(IntegrationError::io(path.as_path()))?;
        }
        Ok(dir)
    }
}

#[async_trait]
impl Deployer for VercelCliDeployer {
    async fn deploy(&self, site: &StaticSite) -> Result<Deployment, IntegrationError> {
        let npx = which::which("npx").map_err(|_| IntegrationError::NotConfigured {
            what: "npx",
            hint: "install Node.js so `npx vercel` is available, or use deploy.mode = `api`"
                .to_string(),
        })?;
        let dir = self.stage(site).await?;

        let mut command = Command::new(&npx);
        command
            .arg("-y")
            .arg("vercel")
            .arg("--prod")
            .arg("--yes")
            .arg("--name")
            .arg(&site.project_name)
            .arg("--cwd")
            .arg(&dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(token) = &self.token {
            command.arg("--token").arg(token.expose_secret());
        }

        let rendered = format!("npx vercel --prod --name {}", site.project_name);
        let output = command.output().await.map_err(|error| IntegrationError::Command {
            command: rendered.clone(),
            message: error.to_string(),
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IntegrationError::Command {
                command: rendered,
                message: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        let url = parse_cli_url(&stdout).ok_or_else(|| {
            warn!(event_name = "vercel.cli.no_url", stdout = %stdout, "no deployment url in output");
            IntegrationError::Command {
                command: rendered,
                message: "vercel finished without printing a deployment url".to_string(),
            }
        })?;
        let deployment = Deployment { url, project: site.project_name.clone(), id: None };
        info!(
            event_name = "vercel.deployment.created",
            mode = self.mode(),
            project = %deployment.project,
            url = %deployment.url,
            "proposal deployed"
        );
        Ok(deployment)
    }

    fn mode(&self) -> &'static str {
        "cli"
    }
}

/// The CLI prints progress lines first; the deployment URL is the last `https://` line.
pub fn parse_cli_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("https://"))
        .last()
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}

pub fn normalize_url(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{deployment_payload, normalize_url, parse_cli_url, StaticSite, VercelCliDeployer};
    use crate::error::IntegrationError;

    fn site() -> StaticSite {
        StaticSite { project_name: "proposal-acme".to_string(), index_html: "<h1>Acme</h1>".to_string() }
    }

    #[test]
    fn cli_url_is_last_https_line() {
        let stdout = "Vercel CLI 37.0.0\nhttps://proposal-acme-abc.vercel.app [2s]\nQueued\nhttps://proposal-acme.vercel.app\n";
        assert_eq!(parse_cli_url(stdout).as_deref(), Some("https://proposal-acme.vercel.app"));
        assert_eq!(parse_cli_url("Error: not logged in\n"), None);
    }

    #[test]
    fn api_hosts_gain_a_scheme() {
        assert_eq!(normalize_url("proposal-acme.vercel.app"), "https://proposal-acme.vercel.app");
        assert_eq!(normalize_url("https://x.vercel.app"), "https://x.vercel.app");
    }

    #[test]
    fn payload_ships_index_and_clean_urls_config() {
        let payload = deployment_payload(&site());
        assert_eq!(payload["name"], "proposal-acme");
        assert_eq!(payload["target"], "production");
        let files = payload["files"].as_array().expect("files");
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["file"], "index.html");
        assert_eq!(files[0]["data"], "<h1>Acme</h1>");
        let config: serde_json::Value =
            serde_json::from_str(files[1]["data"].as_str().expect("data")).expect("json");
        assert_eq!(config["cleanUrls"], true);
    }

    #[tokio::test]
    async fn cli_stages_site_under_project_dir() {
        let dir = TempDir::new().expect("tempdir");
        let deployer = VercelCliDeployer::new(dir.path(), None);

        let staged = deployer.stage(&site()).await.expect("stage");

        assert_eq!(staged, dir.path().join("proposal-acme"));
        assert_eq!(std::fs::read_to_string(staged.join("index.html")).expect("read"), "<h1>Acme</h1>");
        assert!(staged.join("vercel.json").exists());
    }

    #[tokio::test]
    async fn restaging_drops_files_from_an_earlier_deploy() {
        let dir = TempDir::new().expect("tempdir");
        let deployer = VercelCliDeployer::new(dir.path(), None);
        let stale = dir.path().join("proposal-acme").join("old-draft.html");
        std::fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
        std::fs::write(&stale, "stale").expect("write");

        let staged = deployer.stage(&site()).await.expect("stage");

        assert!(!stale.exists());
        assert!(staged.join("index.html").exists());
    }

    #[tokio::test]
    async fn project_names_that_leave_the_stage_root_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let deployer = VercelCliDeployer::new(dir.path().join("deploy"), None);

        for name in ["proposal-/../../escaped", "..", "a\\b", ""] {
            let site = StaticSite { project_name: name.to_string(), index_html: String::new() };
            let error = deployer.stage(&site).await.expect_err("rejected");
            assert!(matches!(error, IntegrationError::InvalidRequest(_)), "{name}: {error}");
        }
        assert!(!dir.path().join("escaped").exists());
    }
}
