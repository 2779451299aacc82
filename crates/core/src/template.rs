//! Proposal and email templates rendered through Tera.

use std::path::Path;

use tera::{Context, Tera};

use crate::errors::ApplicationError;
use crate::placeholders::PlaceholderMap;

pub const PROPOSAL_TEMPLATE: &str = "proposal.html";
pub const EMAIL_TEMPLATE: &str = "email.html";

const EMBEDDED_PROPOSAL: &str = include_str!("../../../templates/proposal.html.tera");
const EMBEDDED_EMAIL: &str = include_str!("../../../templates/email.html.tera");

/// File names looked up inside `workspace.template_dir` before falling back
/// to the embedded copies.
const OVERRIDE_FILES: [(&str, &str); 2] =
    [(PROPOSAL_TEMPLATE, "proposal.html.tera"), (EMAIL_TEMPLATE, "email.html.tera")];

#[derive(Clone, Debug)]
pub struct TemplateSet {
    tera: Tera,
    proposal_source: String,
    email_source: String,
}

impl TemplateSet {
    pub fn embedded() -> Result<Self, ApplicationError> {
        Self::from_sources(EMBEDDED_PROPOSAL.to_string(), EMBEDDED_EMAIL.to_string())
    }

    pub fn load(template_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let Some(dir) = template_dir else {
            return Self::embedded();
        };

        let mut sources = [EMBEDDED_PROPOSAL.to_string(), EMBEDDED_EMAIL.to_string()];
        for (slot, (_, file_name)) in OVERRIDE_FILES.iter().enumerate() {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                sources[slot] = std::fs::read_to_string(&candidate).map_err(|error| {
                    ApplicationError::Template(format!(
                        "could not read template `{}`: {error}",
                        candidate.display()
                    ))
                })?;
                tracing::debug!(
                    event_name = "template.override.loaded",
                    path = %candidate.display(),
                    "using template override"
                );
            }
        }

        let [proposal, email] = sources;
        Self::from_sources(proposal, email)
    }

    pub fn from_sources(proposal: String, email: String) -> Result<Self, ApplicationError> {
        let mut tera = Tera::default();
        // values are escaped while building the placeholder map
        tera.autoescape_on(Vec::new());
        tera.add_raw_templates(vec![
            (PROPOSAL_TEMPLATE, proposal.as_str()),
            (EMAIL_TEMPLATE, email.as_str()),
        ])
        .map_err(|error| ApplicationError::Template(describe(&error)))?;

        Ok(Self { tera, proposal_source: proposal, email_source: email })
    }

    pub fn render_proposal(&self, placeholders: &PlaceholderMap) -> Result<String, ApplicationError> {
        self.render(PROPOSAL_TEMPLATE, placeholders)
    }

    pub fn render_email(&self, placeholders: &PlaceholderMap) -> Result<String, ApplicationError> {
        self.render(EMAIL_TEMPLATE, placeholders)
    }

    pub fn proposal_source(&self) -> &str {
        &self.proposal_source
    }

    pub fn email_source(&self) -> &str {
        &self.email_source
    }

    fn render(&self, name: &str, placeholders: &PlaceholderMap) -> Result<String, ApplicationError> {
        let mut context = Context::new();
        for (key, value) in placeholders {
            context.insert(key.as_str(), value);
        }
        self.tera.render(name, &context).map_err(|error| ApplicationError::Template(describe(&error)))
    }
}

/// Tera nests the useful part of the message (`Variable X not found`) in its source chain.
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::TemplateSet;
    use crate::config::AppConfig;
    use crate::domain::proposal::ClientProposal;
    use crate::errors::ApplicationError;
    use crate::placeholders::{email_placeholders, PlaceholderBuilder, PlaceholderMap, ProposalAssets};

    #[test]
    fn embedded_proposal_renders_every_placeholder() {
        let templates = TemplateSet::embedded().expect("embedded templates parse");
        let config = AppConfig::default();
        let assets = ProposalAssets::default();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).expect("date");
        let proposal = ClientProposal::minimal("Acme & Co");

        let placeholders = PlaceholderBuilder::new(&config.branding, &assets, today).build(&proposal);
        let html = templates.render_proposal(&placeholders).expect("render");

        assert!(html.contains("Acme &amp; Co"));
        assert!(html.contains("June 01, 2025"));
        assert!(!html.contains("{{"), "no placeholder may survive rendering");
    }

    #[test]
    fn embedded_email_renders() {
        let templates = TemplateSet::embedded().expect("embedded templates parse");
        let html = templates
            .render_email(&email_placeholders("Jane Doe", Some("https://example.vercel.app")))
            .expect("render");

        assert!(html.contains("Hi Jane,"));
        assert!(html.contains("Click the button below"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn unresolved_placeholder_is_a_template_error() {
        let templates =
            TemplateSet::from_sources("<h1>{{ MISSING_FIELD }}</h1>".to_string(), String::new())
                .expect("parse");

        let error = templates.render_proposal(&PlaceholderMap::new()).expect_err("must fail");
        match error {
            ApplicationError::Template(message) => assert!(message.contains("MISSING_FIELD")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn markup_values_are_not_escaped_again() {
        let templates =
            TemplateSet::from_sources("<p>{{ DELIVERABLES }}</p>".to_string(), String::new())
                .expect("parse");
        let mut map = PlaceholderMap::new();
        map.insert("DELIVERABLES".to_string(), "1. Site<br>2. CRM".to_string());

        assert_eq!(templates.render_proposal(&map).expect("render"), "<p>1. Site<br>2. CRM</p>");
    }

    #[test]
    fn template_dir_overrides_only_present_files() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("proposal.html.tera"), "custom {{ COMPANY }}")
            .expect("write");

        let templates = TemplateSet::load(Some(dir.path())).expect("load");
        assert_eq!(templates.proposal_source(), "custom {{ COMPANY }}");
        assert!(templates.email_source().contains("INSTRUCTION_TEXT"));
    }
}
