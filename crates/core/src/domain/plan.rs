use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const STARTER_WIRE: &str = "Starter subscription - flat monthly plan";
pub const GROWTH_WIRE: &str = "Growth subscription - flat monthly plan";
pub const STRATEGIC_PARTNER_WIRE: &str = "Strategic Partner subscription - flat monthly plan";
pub const TO_BE_CONFIRMED_WIRE: &str = "Flat monthly subscription - plan to be confirmed";

const CURRENCY: &str = "JMD";

/// Flat monthly subscription tier. Serialized as the plan sentence the analyzer emits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PricingPlan {
    Starter,
    Growth,
    StrategicPartner,
    ToBeConfirmed,
    Custom(String),
}

impl PricingPlan {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            STARTER_WIRE => Self::Starter,
            GROWTH_WIRE => Self::Growth,
            STRATEGIC_PARTNER_WIRE => Self::StrategicPartner,
            TO_BE_CONFIRMED_WIRE => Self::ToBeConfirmed,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn wire(&self) -> &str {
        match self {
            Self::Starter => STARTER_WIRE,
            Self::Growth => GROWTH_WIRE,
            Self::StrategicPartner => STRATEGIC_PARTNER_WIRE,
            Self::ToBeConfirmed => TO_BE_CONFIRMED_WIRE,
            Self::Custom(raw) => raw,
        }
    }

    /// Short name shown on the investment card.
    pub fn label(&self) -> &str {
        match self {
            Self::Starter => "Starter",
            Self::Growth => "Growth",
            Self::StrategicPartner => "Strategic Partner",
            Self::ToBeConfirmed | Self::Custom(_) => self.wire(),
        }
    }

    pub fn monthly_price(&self) -> Option<Decimal> {
        match self {
            Self::Starter => Some(Decimal::from(85_000)),
            Self::Growth => Some(Decimal::from(240_000)),
            Self::StrategicPartner => Some(Decimal::from(650_000)),
            Self::ToBeConfirmed | Self::Custom(_) => None,
        }
    }

    /// `JMD 85,000 / month`, or empty when the tier has no list price.
    pub fn display_price(&self) -> String {
        self.monthly_price()
            .map(|amount| format!("{CURRENCY} {} / month", group_thousands(amount)))
            .unwrap_or_default()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl Default for PricingPlan {
    fn default() -> Self {
        Self::ToBeConfirmed
    }
}

impl From<String> for PricingPlan {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<PricingPlan> for String {
    fn from(value: PricingPlan) -> Self {
        value.wire().to_string()
    }
}

impl fmt::Display for PricingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire())
    }
}

fn group_thousands(amount: Decimal) -> String {
    let whole = amount.trunc().abs().to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if amount.is_sign_negative() && !amount.is_zero() {
        grouped.insert(0, '-');
    }
    grouped
}
