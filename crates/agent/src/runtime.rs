use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use closer_core::assets::{file_mime_type, image_mime_type, optional_image_data_uri};
use closer_core::config::{AppConfig, DeployMode};
use closer_core::domain::proposal::ClientProposal;
use closer_core::email::{
    compose_proposal_email, delivery_copy, Attachment, InlineImage, ProposalEmailRequest,
    LOGO_CONTENT_ID,
};
use closer_core::errors::{ApplicationError, DomainError};
use closer_core::placeholders::{PlaceholderBuilder, ProposalAssets};
use closer_core::slug::{client_name_from_file_stem, project_name, slugify};
use closer_core::template::TemplateSet;
use closer_core::workspace::{ArtifactEntry, FetchedDocument, SearchHit, Workspace};
use closer_integrations::google::sheets::{FindMatch, FindQuery, HeadersReport, Record};
use closer_integrations::{
    Deployer, DriveClient, DriveFile, DriveFolder, GmailMailer, GoogleAuth, IntegrationError,
    Mailer, SheetsClient, StaticSite, SyncReport, VercelApiDeployer, VercelCliDeployer,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::TranscriptAnalyzer;
use crate::guardrails::GuardrailPolicy;
use crate::llm::{self, LlmClient};

pub const MIN_TRANSCRIPT_CHARS: usize = 50;

#[derive(Clone, Debug, Default)]
pub struct AnalyzeRequest {
    pub client_name: String,
    pub transcript: String,
    pub model: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalyzeOutcome {
    pub client_name: String,
    pub transcript_path: PathBuf,
    pub data_path: PathBuf,
    pub plan: String,
    pub proposal: ClientProposal,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct GenerateRequest {
    pub client_data: Option<PathBuf>,
    pub client_name: Option<String>,
    pub website: Option<String>,
    pub output: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GenerateOutcome {
    pub client_name: String,
    pub proposal_path: PathBuf,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeployOutcome {
    pub url: String,
    pub project: String,
    pub proposal_path: PathBuf,
    pub mode: &'static str,
}

#[derive(Clone, Debug, Default)]
pub struct EmailRequest {
    pub to: String,
    pub client_name: String,
    pub proposal_link: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub attachment_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmailOutcome {
    pub message_id: String,
    pub to: String,
    pub subject: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PackageOutcome {
    pub proposal_path: PathBuf,
    pub client_name: String,
    pub filename: String,
    pub email_copy: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuickOutcome {
    pub client: String,
    pub slug: String,
    pub transcript_path: PathBuf,
    pub data_path: PathBuf,
    pub proposal_path: PathBuf,
    pub url: String,
    pub project: String,
    pub plan: String,
    pub drive: Option<SyncReport>,
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub workspace_root: PathBuf,
    pub workspace_writable: bool,
    pub templates_loaded: bool,
    pub llm_configured: bool,
    pub deploy_mode: &'static str,
}

/// Swappable collaborators. Production wiring comes from [`PipelineRuntime::from_config`];
/// tests hand in fakes.
pub struct RuntimeServices {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub deployer: Arc<dyn Deployer>,
    pub mailer: Arc<dyn Mailer>,
    pub sheets: Option<Arc<SheetsClient>>,
    pub drive: Option<Arc<DriveClient>>,
}

pub struct PipelineRuntime {
    config: Arc<AppConfig>,
    workspace: Workspace,
    templates: TemplateSet,
    analyzer: Option<TranscriptAnalyzer>,
    deployer: Arc<dyn Deployer>,
    mailer: Arc<dyn Mailer>,
    sheets: Option<Arc<SheetsClient>>,
    drive: Option<Arc<DriveClient>>,
    today: Option<NaiveDate>,
}

impl PipelineRuntime {
    pub fn new(config: AppConfig, templates: TemplateSet, services: RuntimeServices) -> Self {
        let analyzer = services.llm.map(|llm| {
            TranscriptAnalyzer::new(llm, GuardrailPolicy::default(), &config.branding.company_name)
        });
        Self {
            workspace: Workspace::new(config.workspace.root_dir.clone()),
            config: Arc::new(config),
            templates,
            analyzer,
            deployer: services.deployer,
            mailer: services.mailer,
            sheets: services.sheets,
            drive: services.drive,
            today: None,
        }
    }

    /// Wires real clients. Missing credentials do not fail here; each operation reports
    /// them when it needs them.
    pub async fn from_config(config: AppConfig) -> Result<Self, ApplicationError> {
        let templates = TemplateSet::load(config.workspace.template_dir.as_deref())?;

        let llm = match llm::from_config(&config.llm) {
            Ok(client) => Some(client),
            Err(error) => {
                warn!(event_name = "runtime.llm.unavailable", error = %error, "transcript analysis disabled");
                None
            }
        };

        let deployer: Arc<dyn Deployer> = match config.deploy.mode {
            DeployMode::Api => match VercelApiDeployer::from_config(&config.deploy) {
                Ok(deployer) => Arc::new(deployer),
                Err(IntegrationError::NotConfigured { what, hint }) => {
                    Arc::new(Unconfigured { what, hint })
                }
                Err(other) => return Err(other.into()),
            },
            DeployMode::Cli => Arc::new(VercelCliDeployer::new(
                Workspace::new(config.workspace.root_dir.clone()).deploy_dir(),
                config.deploy.vercel_token.clone(),
            )),
        };

        let auth = Arc::new(GoogleAuth::from_config(&config.google).await?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.google.timeout_secs))
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let mailer = Arc::new(GmailMailer::new(http.clone(), auth.clone(), "me"));
        let sheets = Arc::new(SheetsClient::new(http.clone(), auth.clone(), config.google.sheet_id.clone()));
        let drive = Arc::new(DriveClient::new(http, auth, config.google.drive_root_folder.clone()));

        let runtime = Self::new(
            config,
            templates,
            RuntimeServices { llm, deployer, mailer, sheets: Some(sheets), drive: Some(drive) },
        );
        runtime.workspace.ensure_layout().await?;
        Ok(runtime)
    }

    /// Pins "today" for file names and proposal dates.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn sheets(&self) -> Result<&SheetsClient, ApplicationError> {
        self.sheets.as_deref().ok_or_else(|| {
            ApplicationError::Configuration("google sheets is not configured".to_string())
        })
    }

    pub fn drive(&self) -> Result<&DriveClient, ApplicationError> {
        self.drive.as_deref().ok_or_else(|| {
            ApplicationError::Configuration("google drive is not configured".to_string())
        })
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn analyzer(&self) -> Result<&TranscriptAnalyzer, ApplicationError> {
        match &self.analyzer {
            Some(analyzer) => Ok(analyzer),
            None => {
                self.config.llm.require_api_key()?;
                Err(ApplicationError::Configuration("no LLM client is configured".to_string()))
            }
        }
    }

    /// Saves the transcript, extracts the proposal record and writes it next to the transcript.
    pub async fn analyze_transcript(
        &self,
        request: AnalyzeRequest,
    ) -> Result<AnalyzeOutcome, ApplicationError> {
        let client_name = required(&request.client_name, "client_name")?;
        if request.transcript.trim().is_empty() {
            return Err(DomainError::MissingField("transcript".to_string()).into());
        }
        let analyzer = self.analyzer()?;

        let transcript_path =
            self.workspace.save_transcript(&client_name, &request.transcript, self.today()).await?;
        let data_path = Workspace::data_path_for(&transcript_path);
        self.analyze_into(analyzer, &request.transcript, request.model.as_deref(), transcript_path, data_path)
            .await
    }

    /// Analyzes an existing transcript file. The client name comes from the file name.
    pub async fn analyze_transcript_file(
        &self,
        transcript_path: &Path,
        model: Option<&str>,
        output: Option<&Path>,
    ) -> Result<AnalyzeOutcome, ApplicationError> {
        let analyzer = self.analyzer()?;
        let transcript_path = self.workspace.resolve(transcript_path);
        let transcript = read_text(&transcript_path).await?;
        let data_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Workspace::data_path_for(&transcript_path));
        self.analyze_into(analyzer, &transcript, model, transcript_path, data_path).await
    }

    async fn analyze_into(
        &self,
        analyzer: &TranscriptAnalyzer,
        transcript: &str,
        model: Option<&str>,
        transcript_path: PathBuf,
        data_path: PathBuf,
    ) -> Result<AnalyzeOutcome, ApplicationError> {
        let analysis = analyzer.analyze(transcript, model).await?;
        let json = analysis.proposal.to_pretty_json()?;
        write_artifact(&data_path, json.as_bytes()).await?;

        info!(
            event_name = "pipeline.analyzed",
            client = %analysis.proposal.client_name,
            plan = %analysis.proposal.investment.label(),
            warnings = analysis.warnings.len(),
            data_path = %data_path.display(),
            "transcript analyzed"
        );
        Ok(AnalyzeOutcome {
            client_name: analysis.proposal.client_name.clone(),
            transcript_path,
            data_path,
            plan: analysis.proposal.investment.wire().to_string(),
            proposal: analysis.proposal,
            warnings: analysis.warnings,
        })
    }

    pub async fn generate_proposal(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateOutcome, ApplicationError> {
        let mut proposal = match (&request.client_data, &request.client_name) {
            (Some(path), _) => {
                let path = self.workspace.resolve(path);
                ClientProposal::from_json(&read_text(&path).await?)?
            }
            (None, Some(name)) => ClientProposal::minimal(required(name, "client_name")?),
            (None, None) => {
                return Err(DomainError::MissingField("client_data or client_name".to_string()).into());
            }
        };
        if let Some(website) = request.website.filter(|website| !website.trim().is_empty()) {
            proposal.website = Some(website);
        }
        if proposal.bank_details.trim().is_empty() {
            if let Some(bank) = &self.config.branding.bank_details {
                proposal.bank_details = bank.clone();
            }
        }
        proposal.validate_for_render()?;

        let html = self.render(&proposal).await?;
        let today = self.today();
        let path = request
            .output
            .unwrap_or_else(|| self.workspace.proposal_path(&proposal.client_name, today));
        write_artifact(&path, html.as_bytes()).await?;

        info!(event_name = "pipeline.generated", client = %proposal.client_name, path = %path.display(), "proposal generated");
        Ok(GenerateOutcome { client_name: proposal.client_name, proposal_path: path })
    }

    async fn render(&self, proposal: &ClientProposal) -> Result<String, ApplicationError> {
        let assets = ProposalAssets {
            logo_data_uri: optional_image_data_uri(self.config.workspace.logo_path.as_deref()).await,
            hero_image: optional_image_data_uri(self.config.workspace.hero_image_path.as_deref()).await,
        };
        let placeholders =
            PlaceholderBuilder::new(&self.config.branding, &assets, self.today()).build(proposal);
        self.templates.render_proposal(&placeholders)
    }

    pub async fn deploy_proposal(
        &self,
        proposal_path: Option<PathBuf>,
        client_slug: Option<String>,
    ) -> Result<DeployOutcome, ApplicationError> {
        let proposal_path = match proposal_path {
            Some(path) => self.workspace.resolve(&path),
            None => self.workspace.latest_proposal().await?,
        };
        let index_html = read_text(&proposal_path).await?;
        let slug = client_slug
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or_else(|| slugify(&client_name_from_file_stem(&file_stem(&proposal_path))));
        let project = project_name(&self.config.deploy.project_prefix, &slug);

        let deployment =
            self.deployer.deploy(&StaticSite { project_name: project, index_html }).await?;
        self.workspace.record_deployment_url(&deployment.url).await?;

        info!(event_name = "pipeline.deployed", project = %deployment.project, url = %deployment.url, "proposal deployed");
        Ok(DeployOutcome {
            url: deployment.url,
            project: deployment.project,
            proposal_path,
            mode: self.deployer.mode(),
        })
    }

    pub async fn send_proposal_email(
        &self,
        request: EmailRequest,
    ) -> Result<EmailOutcome, ApplicationError> {
        let attachment = match &request.attachment_path {
            Some(path) => {
                let path = self.workspace.resolve(path);
                let bytes = tokio::fs::read(&path).await.map_err(|error| {
                    ApplicationError::NotFound(format!("attachment `{}`: {error}", path.display()))
                })?;
                Some(Attachment {
                    filename: file_name(&path),
                    content_type: file_mime_type(&path).to_string(),
                    bytes,
                })
            }
            None => None,
        };
        let logo = match self.config.workspace.logo_path.as_deref() {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(InlineImage {
                    content_id: LOGO_CONTENT_ID.to_string(),
                    content_type: image_mime_type(path).to_string(),
                    bytes,
                }),
                Err(error) => {
                    warn!(event_name = "email.logo.skipped", path = %path.display(), error = %error, "logo not attached");
                    None
                }
            },
            None => None,
        };

        let email = compose_proposal_email(
            &self.templates,
            &self.config.email,
            ProposalEmailRequest {
                to: request.to,
                client_name: request.client_name,
                proposal_link: request.proposal_link,
                subject: request.subject,
                body: request.body,
                attachment,
                logo,
            },
        )?;
        let sent = self.mailer.send(&email).await?;

        Ok(EmailOutcome { message_id: sent.id, to: email.to, subject: email.subject })
    }

    pub async fn package_proposal(
        &self,
        proposal_path: Option<PathBuf>,
    ) -> Result<PackageOutcome, ApplicationError> {
        let proposal_path = match proposal_path {
            Some(path) => self.workspace.resolve(&path),
            None => self.workspace.latest_proposal().await?,
        };
        if !tokio::fs::try_exists(&proposal_path).await.unwrap_or(false) {
            return Err(ApplicationError::NotFound(format!(
                "proposal `{}` does not exist",
                proposal_path.display()
            )));
        }
        let client_name = client_name_from_file_stem(&file_stem(&proposal_path));
        let filename = file_name(&proposal_path);
        let email_copy = delivery_copy(&client_name, &filename, &self.config.branding.company_name);
        Ok(PackageOutcome { proposal_path, client_name, filename, email_copy })
    }

    /// Analyze, generate, deploy, then mirror the workspace to Drive. Drive problems are
    /// warnings; the proposal is already live by then.
    pub async fn quick_proposal(
        &self,
        client_name: &str,
        transcript: &str,
    ) -> Result<QuickOutcome, ApplicationError> {
        let client = required(client_name, "client_name")?;
        if transcript.trim().chars().count() < MIN_TRANSCRIPT_CHARS {
            return Err(DomainError::InvalidInput(format!(
                "transcript must be at least {MIN_TRANSCRIPT_CHARS} characters"
            ))
            .into());
        }
        let slug = slugify(&client);

        let analyzed = self
            .analyze_transcript(AnalyzeRequest {
                client_name: client.clone(),
                transcript: transcript.to_string(),
                model: None,
            })
            .await?;
        let mut warnings = analyzed.warnings.clone();

        let generated = self
            .generate_proposal(GenerateRequest {
                client_data: Some(analyzed.data_path.clone()),
                output: Some(self.workspace.proposal_path(&client, self.today())),
                ..GenerateRequest::default()
            })
            .await?;
        let deployed =
            self.deploy_proposal(Some(generated.proposal_path.clone()), Some(slug.clone())).await?;

        let drive = match self.sync_to_drive().await {
            Ok(report) => {
                warnings.extend(report.failed.iter().map(|failure| format!("drive: {failure}")));
                Some(report)
            }
            Err(error) => {
                warn!(event_name = "pipeline.drive_sync.skipped", error = %error, "drive sync failed");
                warnings.push(format!("drive sync skipped: {error}"));
                None
            }
        };

        info!(event_name = "pipeline.quick.completed", client = %client, url = %deployed.url, "quick proposal finished");
        Ok(QuickOutcome {
            client,
            slug,
            transcript_path: analyzed.transcript_path,
            data_path: analyzed.data_path,
            proposal_path: generated.proposal_path,
            url: deployed.url,
            project: deployed.project,
            plan: analyzed.plan,
            drive,
            warnings,
        })
    }

    pub async fn read_sheet(
        &self,
        sheet: Option<&str>,
        headers_only: bool,
    ) -> Result<SheetRead, ApplicationError> {
        let sheets = self.sheets()?;
        if headers_only {
            return Ok(SheetRead::Headers(sheets.headers(sheet).await?));
        }
        Ok(SheetRead::Rows(sheets.read(sheet).await?))
    }

    pub async fn find_client(
        &self,
        value: &str,
        column: Option<String>,
        exact: bool,
        limit: Option<usize>,
        sheet: Option<&str>,
    ) -> Result<Vec<FindMatch>, ApplicationError> {
        let value = required(value, "search_value")?;
        let query = FindQuery { value, column, exact, limit };
        Ok(self.sheets()?.find(sheet, &query).await?)
    }

    pub async fn sync_to_drive(&self) -> Result<SyncReport, ApplicationError> {
        Ok(self.drive()?.sync_all(&self.workspace).await?)
    }

    pub async fn upload_to_drive(
        &self,
        path: &Path,
        folder_type: &str,
    ) -> Result<DriveFile, ApplicationError> {
        let path = self.workspace.resolve(path);
        Ok(self.drive()?.upload_single(&path, folder_type).await?)
    }

    pub async fn list_drive_files(
        &self,
        folder: &str,
        limit: usize,
    ) -> Result<Vec<DriveFile>, ApplicationError> {
        Ok(self.drive()?.list(DriveFolder::parse_or_exports(folder), limit).await?)
    }

    pub async fn download_from_drive(
        &self,
        file_id: &str,
        dest: Option<PathBuf>,
    ) -> Result<PathBuf, ApplicationError> {
        let dest = dest.unwrap_or_else(|| self.workspace.downloads_dir());
        if dest == self.workspace.downloads_dir() {
            tokio::fs::create_dir_all(&dest).await?;
        }
        Ok(self.drive()?.download(file_id, &dest).await?)
    }

    pub async fn list_proposals(&self, limit: usize) -> Result<Vec<ArtifactEntry>, ApplicationError> {
        self.workspace.list_proposals(limit).await
    }

    pub async fn list_transcripts(&self, limit: usize) -> Result<Vec<ArtifactEntry>, ApplicationError> {
        self.workspace.list_transcripts(limit).await
    }

    pub async fn last_deployment_url(&self) -> Result<Option<String>, ApplicationError> {
        self.workspace.last_deployment_url().await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApplicationError> {
        self.workspace.search(query).await
    }

    pub async fn fetch(&self, id: &str) -> Result<FetchedDocument, ApplicationError> {
        self.workspace.fetch(id).await
    }

    pub async fn health(&self) -> HealthReport {
        let probe = self.workspace.root().join(format!(".health-{}", uuid::Uuid::new_v4().simple()));
        let workspace_writable = match write_artifact(&probe, b"ok").await {
            Ok(()) => tokio::fs::remove_file(&probe).await.is_ok(),
            Err(_) => false,
        };
        let templates_loaded = !self.templates.proposal_source().is_empty();
        HealthReport {
            status: if workspace_writable && templates_loaded { "healthy" } else { "degraded" },
            workspace_root: self.workspace.root().to_path_buf(),
            workspace_writable,
            templates_loaded,
            llm_configured: self.analyzer.is_some(),
            deploy_mode: self.deployer.mode(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum SheetRead {
    Headers(HeadersReport),
    Rows(Vec<Record>),
}

/// Stands in for the API deployer when its token is missing, so the failure is reported
/// at deploy time instead of at startup.
struct Unconfigured {
    what: &'static str,
    hint: String,
}

#[async_trait::async_trait]
impl Deployer for Unconfigured {
    async fn deploy(
        &self,
        _site: &StaticSite,
    ) -> Result<closer_integrations::Deployment, IntegrationError> {
        Err(IntegrationError::NotConfigured { what: self.what, hint: self.hint.clone() })
    }

    fn mode(&self) -> &'static str {
        "api"
    }
}

fn required(value: &str, field: &str) -> Result<String, ApplicationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::MissingField(field.to_string()).into());
    }
    Ok(trimmed.to_string())
}

async fn read_text(path: &Path) -> Result<String, ApplicationError> {
    tokio::fs::read_to_string(path).await.map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            ApplicationError::NotFound(format!("`{}` does not exist", path.display()))
        } else {
            ApplicationError::Storage(format!("`{}`: {error}", path.display()))
        }
    })
}

async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), ApplicationError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|error| ApplicationError::Storage(format!("`{}`: {error}", path.display())))
}

fn file_stem(path: &Path) -> String {
    path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}
