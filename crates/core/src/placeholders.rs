//! Builds the `NAME -> value` map substituted into the proposal template.
//!
//! Text fields are HTML-escaped here. Fields that legitimately carry markup
//! (`DELIVERABLES`, `BANK_DETAILS`, `INVEST_NOTE_n`, image data URIs) pass
//! through untouched, so the template itself renders with autoescape off.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::config::BrandingConfig;
use crate::domain::proposal::{ClientProposal, DEFAULT_MIN_TERM_LABEL, DEFAULT_SIGNATURE_INSTRUCTION};

pub type PlaceholderMap = BTreeMap<String, String>;

#[derive(Clone, Debug, Default)]
pub struct ProposalAssets {
    pub logo_data_uri: Option<String>,
    pub hero_image: Option<String>,
}

pub struct PlaceholderBuilder<'a> {
    branding: &'a BrandingConfig,
    assets: &'a ProposalAssets,
    today: NaiveDate,
}

/// Escapes the characters that matter inside element text and quoted attributes.
/// `/` stays literal so links and websites keep their shape.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn or_default<'v>(value: &'v str, fallback: &'v str) -> &'v str {
    non_empty(Some(value)).unwrap_or(fallback)
}

impl<'a> PlaceholderBuilder<'a> {
    pub fn new(branding: &'a BrandingConfig, assets: &'a ProposalAssets, today: NaiveDate) -> Self {
        Self { branding, assets, today }
    }

    pub fn build(&self, proposal: &ClientProposal) -> PlaceholderMap {
        let mut map = PlaceholderMap::new();
        let mut text = |key: &str, value: &str| {
            map.insert(key.to_string(), escape(value));
        };

        let client = or_default(&proposal.client_name, "Client");
        text("CLIENT_NAME", client);
        text("COMPANY", or_default(proposal.company_or_client(), "Company"));
        text("WEBSITE", non_empty(proposal.website.as_deref()).unwrap_or(""));
        text(
            "PREPARED_BY",
            non_empty(proposal.prepared_by.as_deref()).unwrap_or(&self.branding.prepared_by),
        );
        let date = non_empty(proposal.date.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| self.today.format("%B %d, %Y").to_string());
        text("DATE", &date);

        text("PROBLEM", &proposal.problem);
        let points = proposal.problem_points();
        for (index, point) in points.iter().enumerate() {
            text(&format!("PROBLEM_POINT_{}", index + 1), point);
        }
        text("PROBLEM_COST", non_empty(proposal.problem_cost.as_deref()).unwrap_or(points[0]));
        text("OPPORTUNITY", non_empty(proposal.opportunity.as_deref()).unwrap_or(points[1]));

        text("SOLUTION", &proposal.solution);
        let deliverables = proposal.deliverable_items();
        for slot in 0..4 {
            let value = deliverables.get(slot).map(String::as_str).unwrap_or("");
            text(&format!("SOLUTION_POINT_{}", slot + 1), value);
        }
        text("TIMELINE", &proposal.timeline);

        for slot in 0..2 {
            let entry = proposal.why_us.get(slot);
            text(
                &format!("WHY_US_TITLE_{}", slot + 1),
                entry.map(|why| why.title.as_str()).unwrap_or(""),
            );
            text(
                &format!("WHY_US_BODY_{}", slot + 1),
                entry.map(|why| why.body.as_str()).unwrap_or(""),
            );
        }

        for slot in 0..3 {
            let n = slot + 1;
            let step = proposal.process_steps.get(slot);
            let default_num = format!("{n:02}");
            let num = step.map(|step| or_default(&step.num, &default_num)).unwrap_or(&default_num);
            text(&format!("STEP_{n}_NUM"), num);
            text(&format!("STEP_{n}_TITLE"), step.map(|step| step.title.as_str()).unwrap_or(""));
            text(&format!("STEP_{n}_WHAT"), step.map(|step| step.what.as_str()).unwrap_or(""));
            text(&format!("STEP_{n}_WHY"), step.map(|step| step.why.as_str()).unwrap_or(""));
        }

        text("INVESTMENT", proposal.investment.wire());
        text("INVESTMENT_PLAN", proposal.investment.label());
        text("INVESTMENT_PRICE", &proposal.investment.display_price());
        text("MIN_TERM_LABEL", or_default(&proposal.min_term_label, DEFAULT_MIN_TERM_LABEL));
        text("MIN_TERM_VALUE", &proposal.min_term_value);
        text(
            "SIGNATURE_INSTRUCTION",
            or_default(&proposal.signature_instruction, DEFAULT_SIGNATURE_INSTRUCTION),
        );

        let bank_details = non_empty(Some(proposal.bank_details.as_str()))
            .or(non_empty(self.branding.bank_details.as_deref()))
            .unwrap_or("");
        map.insert("DELIVERABLES".to_string(), proposal.deliverables.clone());
        map.insert("BANK_DETAILS".to_string(), bank_details.to_string());
        for slot in 0..4 {
            let note = proposal.invest_notes.get(slot).cloned().unwrap_or_default();
            map.insert(format!("INVEST_NOTE_{}", slot + 1), note);
        }
        map.insert(
            "LOGO_DATA_URI".to_string(),
            self.assets.logo_data_uri.clone().unwrap_or_default(),
        );
        map.insert("HERO_IMAGE".to_string(), self.assets.hero_image.clone().unwrap_or_default());

        map
    }
}

/// Placeholder map for the delivery email body.
pub fn email_placeholders(client_name: &str, proposal_link: Option<&str>) -> PlaceholderMap {
    let first_name = client_name.split_whitespace().next().unwrap_or("there");
    let link = non_empty(proposal_link);
    let instruction = if link.is_some() {
        "Click the button below to view and sign your proposal instantly."
    } else {
        "Please download the attached file to review your proposal."
    };

    let mut map = PlaceholderMap::new();
    map.insert("CLIENT_NAME".to_string(), escape(client_name));
    map.insert("FIRST_NAME".to_string(), escape(first_name));
    map.insert("PROPOSAL_LINK".to_string(), escape(link.unwrap_or("#")));
    map.insert("INSTRUCTION_TEXT".to_string(), escape(instruction));
    map
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{email_placeholders, PlaceholderBuilder, ProposalAssets};
    use crate::config::AppConfig;
    use crate::domain::plan::PricingPlan;
    use crate::domain::proposal::{ClientProposal, ProcessStep, WhyUs};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 9).expect("valid date")
    }

    #[test]
    fn text_fields_are_escaped_and_markup_fields_are_raw() {
        let config = AppConfig::default();
        let assets = ProposalAssets::default();
        let proposal = ClientProposal {
            client_name: "Smith & Sons".to_string(),
            problem: "<script>".to_string(),
            deliverables: "1. Site<br>2. CRM".to_string(),
            invest_notes: vec!["<strong>Cancel anytime</strong>".to_string()],
            ..ClientProposal::default()
        };

        let map = PlaceholderBuilder::new(&config.branding, &assets, today()).build(&proposal);

        assert_eq!(map["CLIENT_NAME"], "Smith &amp; Sons");
        assert_eq!(map["PROBLEM"], "&lt;script&gt;");
        assert_eq!(map["DELIVERABLES"], "1. Site<br>2. CRM");
        assert_eq!(map["SOLUTION_POINT_1"], "Site");
        assert_eq!(map["SOLUTION_POINT_2"], "CRM");
        assert_eq!(map["SOLUTION_POINT_3"], "");
        assert_eq!(map["INVEST_NOTE_1"], "<strong>Cancel anytime</strong>");
        assert_eq!(map["INVEST_NOTE_4"], "");
    }

    #[test]
    fn defaults_fill_blank_fields() {
        let config = AppConfig::default();
        let assets = ProposalAssets::default();
        let map = PlaceholderBuilder::new(&config.branding, &assets, today())
            .build(&ClientProposal::default());

        assert_eq!(map["CLIENT_NAME"], "Client");
        assert_eq!(map["COMPANY"], "Company");
        assert_eq!(map["PREPARED_BY"], "InstantProd");
        assert_eq!(map["DATE"], "January 09, 2025");
        assert_eq!(map["MIN_TERM_LABEL"], "Minimum Term");
        assert_eq!(map["SIGNATURE_INSTRUCTION"], "Please sign below to accept this proposal.");
        assert_eq!(map["STEP_1_NUM"], "01");
        assert_eq!(map["STEP_3_NUM"], "03");
    }

    #[test]
    fn plan_and_structured_sections_are_expanded() {
        let config = AppConfig::default();
        let assets = ProposalAssets {
            logo_data_uri: Some("data:image/png;base64,AA==".to_string()),
            hero_image: None,
        };
        let proposal = ClientProposal {
            client_name: "Acme".to_string(),
            problem_point_1: "Slow quotes".to_string(),
            problem_point_2: "Lost leads".to_string(),
            why_us: vec![
                WhyUs { title: "No lock-in".to_string(), body: "You own the repo.".to_string() },
                WhyUs { title: "Fast".to_string(), body: "Weekly releases.".to_string() },
            ],
            process_steps: vec![ProcessStep {
                num: String::new(),
                title: "Audit".to_string(),
                what: "Review funnel".to_string(),
                why: "Find leaks".to_string(),
            }],
            investment: PricingPlan::Growth,
            ..ClientProposal::default()
        };

        let map = PlaceholderBuilder::new(&config.branding, &assets, today()).build(&proposal);

        assert_eq!(map["PROBLEM_COST"], "Slow quotes");
        assert_eq!(map["OPPORTUNITY"], "Lost leads");
        assert_eq!(map["WHY_US_TITLE_2"], "Fast");
        assert_eq!(map["STEP_1_NUM"], "01");
        assert_eq!(map["STEP_1_TITLE"], "Audit");
        assert_eq!(map["STEP_2_TITLE"], "");
        assert_eq!(map["INVESTMENT_PLAN"], "Growth");
        assert_eq!(map["INVESTMENT_PRICE"], "JMD 240,000 / month");
        assert_eq!(map["LOGO_DATA_URI"], "data:image/png;base64,AA==");
        assert_eq!(map["HERO_IMAGE"], "");
    }

    #[test]
    fn email_instruction_depends_on_link() {
        let linked = email_placeholders("Jane Doe", Some("https://proposal-acme.vercel.app"));
        assert_eq!(linked["FIRST_NAME"], "Jane");
        assert!(linked["INSTRUCTION_TEXT"].starts_with("Click the button"));

        let attached = email_placeholders("Jane Doe", None);
        assert_eq!(attached["PROPOSAL_LINK"], "#");
        assert!(attached["INSTRUCTION_TEXT"].starts_with("Please download"));
    }

    #[test]
    fn urls_keep_their_slashes_but_not_their_quotes() {
        let config = AppConfig::default();
        let assets = ProposalAssets::default();
        let proposal = ClientProposal {
            client_name: "O'Brien".to_string(),
            website: Some("https://acme.test/about?a=1&b=2".to_string()),
            ..ClientProposal::default()
        };

        let map = PlaceholderBuilder::new(&config.branding, &assets, today()).build(&proposal);
        assert_eq!(map["WEBSITE"], "https://acme.test/about?a=1&amp;b=2");
        assert_eq!(map["CLIENT_NAME"], "O&#x27;Brien");

        let email = email_placeholders("Jane", Some("https://proposal-acme.vercel.app/\"onclick"));
        assert_eq!(email["PROPOSAL_LINK"], "https://proposal-acme.vercel.app/&quot;onclick");
    }
}
