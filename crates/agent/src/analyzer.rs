use std::sync::Arc;

use closer_core::domain::proposal::ClientProposal;
use closer_core::errors::{ApplicationError, DomainError};
use tracing::{info, warn};

use crate::guardrails::GuardrailPolicy;
use crate::llm::{CompletionRequest, LlmClient};

const PROMPT_TEMPLATE: &str = include_str!("../prompts/transcript_analysis.md");
const COMPANY_MARKER: &str = "{{COMPANY}}";

pub fn system_prompt(company: &str) -> String {
    PROMPT_TEMPLATE.replace(COMPANY_MARKER, company)
}

pub fn user_prompt(transcript: &str) -> String {
    format!("Here is the transcript:\n\n{transcript}")
}

/// Removes a leading ```` ```json ```` or ```` ``` ```` fence and a trailing ```` ``` ````.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut content = raw.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }
    content.trim()
}

pub fn parse_analysis(raw: &str) -> Result<ClientProposal, DomainError> {
    let content = strip_code_fences(raw);
    if content.is_empty() {
        return Err(DomainError::InvalidProposal("model returned an empty response".to_string()));
    }
    ClientProposal::from_json(content)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Analysis {
    pub proposal: ClientProposal,
    pub warnings: Vec<String>,
}

pub struct TranscriptAnalyzer {
    llm: Arc<dyn LlmClient>,
    policy: GuardrailPolicy,
    system_prompt: String,
}

impl TranscriptAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, policy: GuardrailPolicy, company: &str) -> Self {
        Self { llm, policy, system_prompt: system_prompt(company) }
    }

    pub async fn analyze(
        &self,
        transcript: &str,
        model: Option<&str>,
    ) -> Result<Analysis, ApplicationError> {
        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            user: user_prompt(transcript),
            model: model.map(str::to_string),
        };
        let model_name = request.model.as_deref().unwrap_or(self.llm.default_model()).to_string();
        info!(event_name = "analyzer.request", model = %model_name, chars = transcript.len(), "analyzing transcript");

        let raw = self
            .llm
            .complete(&request)
            .await
            .map_err(|error| ApplicationError::Integration(format!("llm: {error:#}")))?;
        let mut proposal = parse_analysis(&raw)?;
        let warnings = self.policy.enforce(&mut proposal)?;
        for warning in &warnings {
            warn!(event_name = "analyzer.guardrail", client = %proposal.client_name, "{warning}");
        }

        Ok(Analysis { proposal, warnings })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use closer_core::domain::plan::PricingPlan;
    use closer_core::errors::{ApplicationError, DomainError};

    use super::{parse_analysis, strip_code_fences, system_prompt, TranscriptAnalyzer};
    use crate::guardrails::GuardrailPolicy;
    use crate::llm::{CompletionRequest, LlmClient};

    pub(crate) const CANNED_ANALYSIS: &str = r#"```json
{
  "client_name": "Acme Logistics",
  "goals": ["Self-serve quotes", "Carrier **portal**", "Fewer emails"],
  "problem": "Quotes take days of back and forth.",
  "problem_point_1": "Manual rate lookups",
  "problem_point_2": "Lost leads",
  "problem_point_3": "No tracking",
  "problem_point_4": "Spreadsheet sprawl",
  "solution": "A quoting portal wired into their TMS.",
  "deliverables": "1. Quote portal<br>2. TMS integration<br>3. Tracking page",
  "timeline": "6 Weeks",
  "why_us": [{"title": "Fast", "body": "Weekly releases"}, {"title": "Owned", "body": "Your code"}],
  "process_steps": [
    {"num": "01", "title": "Discover", "what": "Map flows", "why": "Avoid rework"},
    {"num": "02", "title": "Build", "what": "Ship portal", "why": "Value early"},
    {"num": "03", "title": "Launch", "what": "Go live", "why": "Start saving"}
  ],
  "investment": "Strategic Partner subscription - flat monthly plan",
  "min_term_label": "Timeline",
  "min_term_value": "6 Weeks",
  "invest_notes": ["Flat fee", "Pause anytime", "You own code", "Weekly demos"],
  "signature_instruction": "Please sign below to execute this agreement."
}
```"#;

    pub(crate) struct CannedLlm {
        pub(crate) reply: String,
        pub(crate) seen: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedLlm {
        pub(crate) fn new(reply: &str) -> Self {
            Self { reply: reply.to_string(), seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().expect("lock").push(request.clone());
            Ok(self.reply.clone())
        }

        fn default_model(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("{\"plain\":true}"), "{\"plain\":true}");
    }

    #[test]
    fn prose_instead_of_json_is_invalid() {
        let error = parse_analysis("Sure! Here is the data you asked for.").expect_err("not json");
        assert!(matches!(error, DomainError::InvalidProposal(_)));
    }

    #[test]
    fn prompt_names_the_studio() {
        let prompt = system_prompt("Northwind Studio");
        assert!(prompt.contains("proposal for Northwind Studio"));
        assert!(!prompt.contains("{{COMPANY}}"));
        assert!(prompt.contains("Strategic Partner subscription - flat monthly plan"));
    }

    #[tokio::test]
    async fn analysis_applies_guardrails_and_model_override() {
        let llm = Arc::new(CannedLlm::new(CANNED_ANALYSIS));
        let analyzer = TranscriptAnalyzer::new(llm.clone(), GuardrailPolicy::default(), "Northwind");

        let analysis = analyzer.analyze("we need a portal", Some("gpt-test")).await.expect("analysis");

        assert_eq!(analysis.proposal.client_name, "Acme Logistics");
        assert_eq!(analysis.proposal.goals[1], "Carrier portal");
        assert_eq!(analysis.proposal.investment, PricingPlan::StrategicPartner);
        assert!(analysis.warnings.is_empty());

        let seen = llm.seen.lock().expect("lock");
        assert_eq!(seen[0].model.as_deref(), Some("gpt-test"));
        assert!(seen[0].user.starts_with("Here is the transcript:\n\nwe need a portal"));
    }

    #[tokio::test]
    async fn record_without_problem_is_rejected() {
        let llm = Arc::new(CannedLlm::new(r#"{"client_name":"Acme","goals":["x"],"solution":"y"}"#));
        let analyzer = TranscriptAnalyzer::new(llm, GuardrailPolicy::default(), "Northwind");

        let error = analyzer.analyze("short", None).await.expect_err("denied");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::MissingField("problem".to_string()))
        );
    }
}
