use thiserror::Error;

/// Errors that abort a simulation before any month is computed.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid date in {field}: '{value}' (expected MM/YYYY)")]
    InvalidDate { field: String, value: String },

    #[error("First installment month {first_installment} is earlier than signing month {signing}")]
    FirstInstallmentBeforeSigning {
        signing: String,
        first_installment: String,
    },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Total months cannot be zero.")]
    ZeroTerm,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SimulationError {
    fn from(e: serde_json::Error) -> Self {
        SimulationError::Serialization(e.to_string())
    }
}

pub type SimulationResult<T> = Result<T, SimulationError>;

pub(crate) fn invalid_input(field: &str, reason: impl Into<String>) -> SimulationError {
    SimulationError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}

/// Error for a month whose amounts no longer fit a `Decimal`; `field` names
/// the input driving the growth.
pub(crate) fn overflow(field: &str, month: u32) -> SimulationError {
    invalid_input(field, format!("amounts exceed the decimal range at month {month}"))
}
