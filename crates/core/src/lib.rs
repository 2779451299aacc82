pub mod assets;
pub mod config;
pub mod domain;
pub mod email;
pub mod errors;
pub mod placeholders;
pub mod slug;
pub mod template;
pub mod workspace;

pub use domain::plan::PricingPlan;
pub use domain::proposal::{ClientProposal, ProcessStep, WhyUs};
pub use email::{compose_proposal_email, OutgoingEmail, ProposalEmailRequest};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use placeholders::{PlaceholderBuilder, PlaceholderMap, ProposalAssets};
pub use template::TemplateSet;
pub use workspace::Workspace;
