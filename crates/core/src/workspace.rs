//! The local artifact directory that every pipeline step reads from and writes to.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::errors::{ApplicationError, DomainError};
use crate::slug::{date_stamp, safe_file_stem, slugify};

pub const TRANSCRIPTS_DIR: &str = "transcripts";
pub const PROPOSALS_DIR: &str = "proposals";
pub const DEPLOY_DIR: &str = "deploy";
pub const DOWNLOADS_DIR: &str = "downloads";
pub const LAST_DEPLOYMENT_FILE: &str = "last_deployment_url.txt";

const DOCUMENT_SCHEME: &str = "file://";
const SEARCHABLE_DIRS: [&str; 2] = [TRANSCRIPTS_DIR, PROPOSALS_DIR];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchedDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub metadata: DocumentMetadata,
}

#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.root.join(TRANSCRIPTS_DIR)
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.root.join(PROPOSALS_DIR)
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.root.join(DEPLOY_DIR)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    pub fn last_deployment_path(&self) -> PathBuf {
        self.root.join(LAST_DEPLOYMENT_FILE)
    }

    pub async fn ensure_layout(&self) -> Result<(), ApplicationError> {
        for dir in [self.transcripts_dir(), self.proposals_dir(), self.deploy_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|error| storage(&dir, error))?;
        }
        Ok(())
    }

    /// `transcripts/{slug}_{YYYYMMDD}.txt`
    pub fn transcript_path(&self, client_name: &str, date: NaiveDate) -> PathBuf {
        self.transcripts_dir().join(format!("{}_{}.txt", slugify(client_name), date_stamp(date)))
    }

    /// `proposals/{safe_name}_{YYYYMMDD}.html`
    pub fn proposal_path(&self, client_name: &str, date: NaiveDate) -> PathBuf {
        self.proposals_dir()
            .join(format!("{}_{}.html", safe_file_stem(client_name), date_stamp(date)))
    }

    /// The analyzer output sits next to its transcript as `<stem>_data.json`.
    pub fn data_path_for(transcript: &Path) -> PathBuf {
        let stem = transcript.file_stem().and_then(|stem| stem.to_str()).unwrap_or("transcript");
        transcript.with_file_name(format!("{stem}_data.json"))
    }

    pub async fn save_transcript(
        &self,
        client_name: &str,
        text: &str,
        date: NaiveDate,
    ) -> Result<PathBuf, ApplicationError> {
        let path = self.transcript_path(client_name, date);
        write_file(&path, text.as_bytes()).await?;
        Ok(path)
    }

    pub async fn record_deployment_url(&self, url: &str) -> Result<(), ApplicationError> {
        write_file(&self.last_deployment_path(), url.as_bytes()).await
    }

    pub async fn last_deployment_url(&self) -> Result<Option<String>, ApplicationError> {
        let path = self.last_deployment_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let url = contents.trim().to_string();
                Ok((!url.is_empty()).then_some(url))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(storage(&path, error)),
        }
    }

    pub async fn list_proposals(&self, limit: usize) -> Result<Vec<ArtifactEntry>, ApplicationError> {
        let mut entries = list_dir(&self.proposals_dir(), &["html"]).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn list_transcripts(
        &self,
        limit: usize,
    ) -> Result<Vec<ArtifactEntry>, ApplicationError> {
        let mut entries = list_dir(&self.transcripts_dir(), &["txt", "json"]).await?;
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn latest_proposal(&self) -> Result<PathBuf, ApplicationError> {
        self.list_proposals(1).await?.into_iter().next().map(|entry| entry.path).ok_or_else(|| {
            ApplicationError::NotFound(format!(
                "no proposals found in `{}`; generate one first",
                self.proposals_dir().display()
            ))
        })
    }

    /// Case-insensitive file-name match across transcripts and proposals.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApplicationError> {
        let needle = query.trim().to_lowercase();
        let mut hits = Vec::new();

        for dir_name in SEARCHABLE_DIRS {
            for entry in list_dir(&self.root.join(dir_name), &[]).await? {
                if !entry.name.to_lowercase().contains(&needle) {
                    continue;
                }
                let id = format!("{DOCUMENT_SCHEME}{dir_name}/{}", entry.name);
                hits.push(SearchHit {
                    url: id.clone(),
                    title: entry.name.clone(),
                    id,
                });
            }
        }

        Ok(hits)
    }

    pub async fn fetch(&self, id: &str) -> Result<FetchedDocument, ApplicationError> {
        let relative = parse_document_id(id)?;
        let path = self.root.join(&relative);
        let metadata = tokio::fs::metadata(&path).await.map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ApplicationError::NotFound(format!("document `{id}` does not exist"))
            } else {
                storage(&path, error)
            }
        })?;
        let bytes = tokio::fs::read(&path).await.map_err(|error| storage(&path, error))?;

        Ok(FetchedDocument {
            id: id.to_string(),
            title: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            text: String::from_utf8_lossy(&bytes).into_owned(),
            url: id.to_string(),
            metadata: DocumentMetadata {
                size: metadata.len(),
                modified: modified_at(&metadata),
            },
        })
    }

    /// Resolves a caller-supplied path, treating relative paths as workspace-relative
    /// when they do not exist relative to the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            return path.to_path_buf();
        }
        let under_root = self.root.join(path);
        if under_root.exists() {
            under_root
        } else {
            path.to_path_buf()
        }
    }

    /// Pins a path taken from a remote caller under the workspace root. Relative paths
    /// are joined to the root; absolute ones must already sit below it. Parent and
    /// root components past that point are refused.
    pub fn confine(&self, path: &Path) -> Result<PathBuf, DomainError> {
        let outside = || {
            DomainError::InvalidInput(format!("path `{}` is outside the workspace", path.display()))
        };
        let root = std::path::absolute(&self.root).unwrap_or_else(|_| self.root.clone());
        let relative = if path.is_absolute() {
            path.strip_prefix(&root).map_err(|_| outside())?
        } else {
            path
        };

        let mut confined = root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => confined.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(outside());
                }
            }
        }
        if confined == root {
            return Err(outside());
        }
        Ok(confined)
    }
}

/// Accepts `file://transcripts/x.txt` style ids and rejects anything that leaves the
/// searchable directories.
pub fn parse_document_id(id: &str) -> Result<PathBuf, DomainError> {
    let invalid = || DomainError::InvalidDocumentId(id.to_string());
    let relative = id.strip_prefix(DOCUMENT_SCHEME).ok_or_else(invalid)?;
    let path = Path::new(relative);

    let mut components = path.components();
    let top = match components.next() {
        Some(Component::Normal(top)) => top.to_str().ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    if !SEARCHABLE_DIRS.contains(&top) {
        return Err(invalid());
    }
    let rest: Vec<_> = components.collect();
    if rest.is_empty() || !rest.iter().all(|part| matches!(part, Component::Normal(_))) {
        return Err(invalid());
    }

    Ok(path.to_path_buf())
}

async fn list_dir(dir: &Path, extensions: &[&str]) -> Result<Vec<ArtifactEntry>, ApplicationError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(storage(dir, error)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|error| storage(dir, error))? {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|error| storage(&path, error))?;
        if !metadata.is_file() {
            continue;
        }
        let matches_extension = extensions.is_empty()
            || path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|wanted| ext.eq_ignore_ascii_case(wanted)))
                .unwrap_or(false);
        if !matches_extension {
            continue;
        }
        entries.push(ArtifactEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            modified: modified_at(&metadata),
            path,
        });
    }

    entries.sort_by(|left, right| {
        right.modified.cmp(&left.modified).then_with(|| right.name.cmp(&left.name))
    });
    Ok(entries)
}

fn modified_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

pub(crate) async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ApplicationError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|error| storage(parent, error))?;
    }
    tokio::fs::write(path, bytes).await.map_err(|error| storage(path, error))
}

fn storage(path: &Path, error: std::io::Error) -> ApplicationError {
    ApplicationError::Storage(format!("`{}`: {error}", path.display()))
}
