//! Third-party integrations for the proposal pipeline
//!
//! Every module here is a thin wrapper over one external REST API:
//! - **Google auth** (`google::auth`) - restores credential files and refreshes access tokens
//! - **Sheets** (`google::sheets`) - onboarding sheet reads, lookups and edits
//! - **Drive** (`google::drive`) - artifact folders, uploads and downloads
//! - **Gmail** (`gmail`) - sends composed MIME messages
//! - **Vercel** (`vercel`) - publishes a proposal as a static site
//!
//! Failures surface as [`IntegrationError`] and are never retried here; callers
//! report them and let the operator decide whether to retry.

pub mod error;
pub mod gmail;
pub mod google;
pub mod vercel;

pub use error::IntegrationError;
pub use gmail::{GmailMailer, Mailer, SentMessage};
pub use google::auth::GoogleAuth;
pub use google::drive::{DriveClient, DriveFile, DriveFolder, SyncReport, SyncedFile};
pub use google::sheets::{FindMatch, FindQuery, HeadersReport, Record, SheetsClient, UpdateReport};
pub use vercel::{Deployer, Deployment, StaticSite, VercelApiDeployer, VercelCliDeployer};
