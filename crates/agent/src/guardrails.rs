use std::sync::LazyLock;

use closer_core::domain::plan::PricingPlan;
use closer_core::domain::proposal::ClientProposal;
use closer_core::errors::DomainError;
use regex::Regex;

pub const EXPECTED_WHY_US: usize = 2;
pub const EXPECTED_PROCESS_STEPS: usize = 3;
pub const EXPECTED_INVEST_NOTES: usize = 4;
pub const MIN_GOALS: usize = 3;

/// Something in an extracted record that the template or the pricing rules care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposalFinding {
    MissingField { field: &'static str },
    NumericPrice { raw: String },
    UnlistedPlan { raw: String },
    CountMismatch { field: &'static str, expected: usize, actual: usize },
    TooFewGoals { actual: usize },
}

impl ProposalFinding {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "record.missing_field",
            Self::NumericPrice { .. } => "pricing.numeric_price",
            Self::UnlistedPlan { .. } => "pricing.unlisted_plan",
            Self::CountMismatch { .. } => "layout.count_mismatch",
            Self::TooFewGoals { .. } => "layout.too_few_goals",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_set_prices: bool,
    pub allow_unlisted_plans: bool,
    pub enforce_layout_counts: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { llm_can_set_prices: false, allow_unlisted_plans: false, enforce_layout_counts: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, finding: &ProposalFinding) -> GuardrailDecision {
        match finding {
            ProposalFinding::MissingField { field } => GuardrailDecision::Deny {
                reason_code: "required_field_missing",
                user_message: format!(
                    "The transcript analysis did not produce `{field}`. Re-run the analysis or fill it in by hand."
                ),
                fallback_path: "edit_client_data",
            },
            ProposalFinding::NumericPrice { .. } if self.llm_can_set_prices => GuardrailDecision::Allow,
            ProposalFinding::NumericPrice { raw } => GuardrailDecision::Degrade {
                reason_code: "numeric_price_disallowed",
                user_message: format!(
                    "Investment `{raw}` looked like an invented price; the plan was reset to be confirmed."
                ),
                fallback_path: "plan_to_be_confirmed",
            },
            ProposalFinding::UnlistedPlan { .. } if self.allow_unlisted_plans => {
                GuardrailDecision::Allow
            }
            ProposalFinding::UnlistedPlan { raw } => GuardrailDecision::Degrade {
                reason_code: "unlisted_plan",
                user_message: format!(
                    "Investment `{raw}` is not one of the subscription plans; the plan was reset to be confirmed."
                ),
                fallback_path: "plan_to_be_confirmed",
            },
            ProposalFinding::CountMismatch { .. } | ProposalFinding::TooFewGoals { .. }
                if !self.enforce_layout_counts =>
            {
                GuardrailDecision::Allow
            }
            ProposalFinding::CountMismatch { field, expected, actual } => GuardrailDecision::Degrade {
                reason_code: "layout_count_mismatch",
                user_message: format!("`{field}` has {actual} items; the layout expects {expected}."),
                fallback_path: "render_available_items",
            },
            ProposalFinding::TooFewGoals { actual } => GuardrailDecision::Degrade {
                reason_code: "too_few_goals",
                user_message: format!("Only {actual} goals were extracted; at least {MIN_GOALS} read best."),
                fallback_path: "render_available_items",
            },
        }
    }

    /// Cleans the record, applies every decision, and returns the warnings for degraded
    /// findings. The first denial aborts.
    pub fn enforce(&self, proposal: &mut ClientProposal) -> Result<Vec<String>, DomainError> {
        strip_markdown_bold(proposal);

        let mut warnings = Vec::new();
        for finding in inspect(proposal) {
            match self.evaluate(&finding) {
                GuardrailDecision::Allow => {}
                GuardrailDecision::Deny { .. } => {
                    let field = match finding {
                        ProposalFinding::MissingField { field } => field.to_string(),
                        other => other.action_key().to_string(),
                    };
                    return Err(DomainError::MissingField(field));
                }
                GuardrailDecision::Degrade { user_message, fallback_path, .. } => {
                    if fallback_path == "plan_to_be_confirmed" {
                        proposal.investment = PricingPlan::ToBeConfirmed;
                    }
                    warnings.push(user_message);
                }
            }
        }
        Ok(warnings)
    }
}

pub fn inspect(proposal: &ClientProposal) -> Vec<ProposalFinding> {
    let mut findings = Vec::new();

    let required: [(&'static str, bool); 4] = [
        ("client_name", proposal.client_name.trim().is_empty()),
        ("goals", proposal.goals.iter().all(|goal| goal.trim().is_empty())),
        ("problem", proposal.problem.trim().is_empty()),
        ("solution", proposal.solution.trim().is_empty()),
    ];
    findings.extend(
        required
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(field, _)| ProposalFinding::MissingField { field }),
    );

    if let PricingPlan::Custom(raw) = &proposal.investment {
        if looks_like_price(raw) {
            findings.push(ProposalFinding::NumericPrice { raw: raw.clone() });
        } else {
            findings.push(ProposalFinding::UnlistedPlan { raw: raw.clone() });
        }
    }

    let counts = [
        ("why_us", EXPECTED_WHY_US, proposal.why_us.len()),
        ("process_steps", EXPECTED_PROCESS_STEPS, proposal.process_steps.len()),
        ("invest_notes", EXPECTED_INVEST_NOTES, proposal.invest_notes.len()),
    ];
    findings.extend(
        counts
            .into_iter()
            .filter(|(_, expected, actual)| expected != actual)
            .map(|(field, expected, actual)| ProposalFinding::CountMismatch { field, expected, actual }),
    );

    let goals = proposal.goals.iter().filter(|goal| !goal.trim().is_empty()).count();
    if goals > 0 && goals < MIN_GOALS {
        findings.push(ProposalFinding::TooFewGoals { actual: goals });
    }

    findings
}

static PRICE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d$€£]").expect("static pattern"));

fn looks_like_price(raw: &str) -> bool {
    PRICE_LIKE.is_match(raw)
}

fn strip_markdown_bold(proposal: &mut ClientProposal) {
    let strip = |value: &mut String| {
        if value.contains("**") {
            *value = value.replace("**", "");
        }
    };

    strip(&mut proposal.client_name);
    strip(&mut proposal.problem);
    strip(&mut proposal.solution);
    strip(&mut proposal.deliverables);
    strip(&mut proposal.timeline);
    strip(&mut proposal.min_term_label);
    strip(&mut proposal.min_term_value);
    strip(&mut proposal.signature_instruction);
    for point in proposal.problem_points_mut() {
        strip(point);
    }
    proposal.goals.iter_mut().for_each(strip);
    proposal.invest_notes.iter_mut().for_each(strip);
    for item in &mut proposal.why_us {
        strip(&mut item.title);
        strip(&mut item.body);
    }
    for step in &mut proposal.process_steps {
        strip(&mut step.title);
        strip(&mut step.what);
        strip(&mut step.why);
    }
}
