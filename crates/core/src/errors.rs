use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("required field `{0}` is missing or empty")]
    MissingField(String),
    #[error("invalid proposal record: {0}")]
    InvalidProposal(String),
    #[error("invalid document id `{0}`")]
    InvalidDocumentId(String),
    #[error("invalid email: {0}")]
    InvalidEmail(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("template failure: {0}")]
    Template(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("upstream failure: {message}")]
    Upstream { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check the inputs and try again."
            }
            Self::NotFound { .. } => {
                "The requested item does not exist. Check the name or path and try again."
            }
            Self::Upstream { .. } => {
                "An external service call failed. Retry shortly, or complete the step manually."
            }
            Self::Internal { .. } => {
                "An unexpected error occurred. Check the configuration and logs, then retry."
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Upstream { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Upstream { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Upstream { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Template(message) => {
                Self::BadRequest { message, correlation_id: unassigned }
            }
            ApplicationError::NotFound(message) => {
                Self::NotFound { message, correlation_id: unassigned }
            }
            ApplicationError::Integration(message) => {
                Self::Upstream { message, correlation_id: unassigned }
            }
            ApplicationError::Storage(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

impl From<std::io::Error> for ApplicationError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<crate::config::ConfigError> for ApplicationError {
    fn from(value: crate::config::ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}
