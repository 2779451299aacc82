//! Read-only documents the assistant surfaces expose next to the tools.

use closer_core::errors::ApplicationError;
use serde::Serialize;

use crate::runtime::PipelineRuntime;

const PROPOSAL_WORKFLOW: &str = include_str!("../../../directives/proposal-workflow.md");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

pub const RESOURCES: [ResourceDescriptor; 3] = [
    ResourceDescriptor {
        uri: "proposal://template",
        name: "proposal-template",
        description: "Tera template used to render client proposals",
        mime_type: "text/html",
    },
    ResourceDescriptor {
        uri: "proposal://email-template",
        name: "email-template",
        description: "Tera template for the proposal delivery email",
        mime_type: "text/html",
    },
    ResourceDescriptor {
        uri: "directive://proposal-workflow",
        name: "proposal-workflow",
        description: "Step-by-step workflow from call transcript to sent proposal",
        mime_type: "text/markdown",
    },
];

pub fn descriptor(uri: &str) -> Option<&'static ResourceDescriptor> {
    RESOURCES.iter().find(|resource| resource.uri == uri)
}

/// Returns the text behind `uri`. Templates come from the runtime so a configured
/// template directory is what gets served.
pub fn read(runtime: &PipelineRuntime, uri: &str) -> Result<String, ApplicationError> {
    match uri {
        "proposal://template" => Ok(runtime.templates().proposal_source().to_string()),
        "proposal://email-template" => Ok(runtime.templates().email_source().to_string()),
        "directive://proposal-workflow" => Ok(PROPOSAL_WORKFLOW.to_string()),
        other => Err(ApplicationError::NotFound(format!("resource `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{descriptor, read, RESOURCES};
    use crate::runtime::tests::harness;

    #[tokio::test]
    async fn every_listed_resource_is_readable() {
        let harness = harness(false);
        for resource in RESOURCES {
            let text = read(&harness.runtime, resource.uri).expect("resource readable");
            assert!(!text.trim().is_empty(), "{} is empty", resource.uri);
        }
        assert!(read(&harness.runtime, "proposal://template")
            .expect("template")
            .contains("{{"));
    }

    #[test]
    fn unknown_uri_is_not_found() {
        let harness = harness(false);
        assert!(descriptor("proposal://nope").is_none());
        let error = read(&harness.runtime, "proposal://nope").expect_err("unknown");
        assert!(error.to_string().contains("proposal://nope"));
    }
}
