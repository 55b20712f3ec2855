//! Generation-time errors.
//!
//! Every variant aborts generation of the one member it was raised for;
//! sibling members keep generating.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid type signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("invalid {kind} name `{name}`")]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid C symbol `{0}`")]
    InvalidSymbol(String),

    #[error("duplicate {kind} symbol `{symbol}` on interface `{interface}`")]
    DuplicateSymbol {
        kind: &'static str,
        symbol: String,
        interface: String,
    },

    #[error("duplicate argument symbol `{symbol}` in `{member}`")]
    DuplicateArgument { symbol: String, member: String },

    #[error("invalid value `{value}` for annotation `{annotation}` on `{member}`")]
    InvalidAnnotation {
        annotation: String,
        value: String,
        member: String,
    },

    #[error("signal `{member}` argument `{argument}` must not be an input")]
    InvalidDirection { member: String, argument: String },
}

impl Error {
    pub(crate) fn signature(signature: &str, reason: impl Into<String>) -> Self {
        Error::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }
}
