use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::plan::PricingPlan;
use crate::errors::DomainError;

pub const DEFAULT_MIN_TERM_LABEL: &str = "Minimum Term";
pub const DEFAULT_SIGNATURE_INSTRUCTION: &str = "Please sign below to accept this proposal.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhyUs {
    pub title: String,
    pub body: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessStep {
    pub num: String,
    pub title: String,
    pub what: String,
    pub why: String,
}

/// The flat record the analyzer extracts from a transcript and the generator
/// pours into the proposal template.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProposal {
    pub client_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub goals: Vec<String>,
    pub problem: String,
    pub problem_point_1: String,
    pub problem_point_2: String,
    pub problem_point_3: String,
    pub problem_point_4: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_cost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity: Option<String>,
    pub solution: String,
    pub deliverables: String,
    pub timeline: String,
    pub why_us: Vec<WhyUs>,
    pub process_steps: Vec<ProcessStep>,
    pub investment: PricingPlan,
    pub bank_details: String,
    pub min_term_label: String,
    pub min_term_value: String,
    pub invest_notes: Vec<String>,
    pub signature_instruction: String,
}

impl ClientProposal {
    /// A bare record for generating a proposal without a transcript.
    pub fn minimal(client_name: impl Into<String>) -> Self {
        Self { client_name: client_name.into(), ..Self::default() }
    }

    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        serde_json::from_str(raw).map_err(|error| {
            DomainError::InvalidProposal(format!("client data is not valid JSON: {error}"))
        })
    }

    pub fn to_pretty_json(&self) -> Result<String, DomainError> {
        serde_json::to_string_pretty(self).map_err(|error| {
            DomainError::InvalidProposal(format!("client data could not be serialized: {error}"))
        })
    }

    pub fn company_or_client(&self) -> &str {
        self.company
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(self.client_name.trim())
    }

    pub fn problem_points(&self) -> [&str; 4] {
        [
            self.problem_point_1.as_str(),
            self.problem_point_2.as_str(),
            self.problem_point_3.as_str(),
            self.problem_point_4.as_str(),
        ]
    }

    pub fn problem_points_mut(&mut self) -> [&mut String; 4] {
        [
            &mut self.problem_point_1,
            &mut self.problem_point_2,
            &mut self.problem_point_3,
            &mut self.problem_point_4,
        ]
    }

    /// Deliverables split on `<br>` with leading list numbering removed.
    pub fn deliverable_items(&self) -> Vec<String> {
        LINE_BREAK
            .split(&self.deliverables)
            .map(strip_list_marker)
            .filter(|item| !item.is_empty())
            .collect()
    }

    /// Field-presence checks. These are the only invariants the record carries.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.client_name.trim().is_empty() {
            return Err(DomainError::MissingField("client_name".to_string()));
        }
        if self.goals.iter().all(|goal| goal.trim().is_empty()) {
            return Err(DomainError::MissingField("goals".to_string()));
        }
        if self.problem.trim().is_empty() {
            return Err(DomainError::MissingField("problem".to_string()));
        }
        if self.solution.trim().is_empty() {
            return Err(DomainError::MissingField("solution".to_string()));
        }
        Ok(())
    }

    /// Checks only what the template needs to name the document.
    pub fn validate_for_render(&self) -> Result<(), DomainError> {
        if self.client_name.trim().is_empty() {
            return Err(DomainError::MissingField("client_name".to_string()));
        }
        Ok(())
    }
}

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static pattern"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[).\-\s]*").expect("static pattern"));

fn strip_list_marker(item: &str) -> String {
    LIST_MARKER.replace(item.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::{ClientProposal, ProcessStep, WhyUs};
    use crate::domain::plan::PricingPlan;
    use crate::errors::DomainError;

    fn sample() -> ClientProposal {
        ClientProposal {
            client_name: "Acme Logistics".to_string(),
            goals: vec!["Faster quoting".to_string(), "Carrier portal".to_string()],
            problem: "Manual dispatch eats the week.".to_string(),
            problem_point_1: "Spreadsheets everywhere".to_string(),
            solution: "A dispatch portal on their stack.".to_string(),
            deliverables: "1. Dashboard<br>2) API Integration<BR/>3 - Carrier portal".to_string(),
            why_us: vec![WhyUs { title: "Own your code".to_string(), body: "No lock-in.".to_string() }],
            process_steps: vec![ProcessStep {
                num: "01".to_string(),
                title: "Discover".to_string(),
                what: "Workshops".to_string(),
                why: "Align scope".to_string(),
            }],
            investment: PricingPlan::StrategicPartner,
            ..ClientProposal::default()
        }
    }

    #[test]
    fn deliverables_are_split_and_unnumbered() {
        assert_eq!(
            sample().deliverable_items(),
            vec!["Dashboard".to_string(), "API Integration".to_string(), "Carrier portal".to_string()]
        );
    }

    #[test]
    fn deliverable_text_without_breaks_is_single_item() {
        let proposal =
            ClientProposal { deliverables: "Brand refresh".to_string(), ..ClientProposal::default() };
        assert_eq!(proposal.deliverable_items(), vec!["Brand refresh".to_string()]);
    }

    #[test]
    fn spaced_self_closing_breaks_split_and_other_tags_do_not() {
        let proposal = ClientProposal {
            deliverables: "10) Audit <br /> <brand> kit<br  >12 .Launch".to_string(),
            ..ClientProposal::default()
        };
        assert_eq!(
            proposal.deliverable_items(),
            vec!["Audit".to_string(), "<brand> kit".to_string(), "Launch".to_string()]
        );
    }

    #[test]
    fn validate_reports_first_missing_field() {
        assert_eq!(sample().validate(), Ok(()));

        let mut missing_goals = sample();
        missing_goals.goals = vec!["  ".to_string()];
        assert_eq!(missing_goals.validate(), Err(DomainError::MissingField("goals".to_string())));

        let unnamed = ClientProposal { client_name: " ".to_string(), ..sample() };
        assert_eq!(unnamed.validate(), Err(DomainError::MissingField("client_name".to_string())));
    }

    #[test]
    fn parses_analyzer_json_with_missing_optional_fields() {
        let raw = r#"{
            "client_name": "Acme",
            "goals": ["One"],
            "problem": "p",
            "solution": "s",
            "investment": "Growth subscription - flat monthly plan",
            "unexpected_field": true
        }"#;
        let proposal = ClientProposal::from_json(raw).expect("parse");
        assert_eq!(proposal.investment, PricingPlan::Growth);
        assert!(proposal.why_us.is_empty());
        assert_eq!(proposal.company_or_client(), "Acme");
    }

    #[test]
    fn invalid_json_is_a_domain_error() {
        let error = ClientProposal::from_json("{not json").expect_err("should fail");
        assert!(matches!(error, DomainError::InvalidProposal(_)));
    }
}
