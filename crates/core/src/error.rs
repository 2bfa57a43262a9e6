/// Errors raised while parsing rule specifications, comparing values,
/// or selecting a rule specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Rule JSON is missing a field or has the wrong shape.
    #[error("deserialization error: {message}")]
    Deserialize { message: String },

    /// Two values have no defined ordering or equality.
    #[error("cannot compare values of types {left} and {right}")]
    Incomparable { left: String, right: String },

    /// No rule specification is in force for the law on the requested date.
    #[error("no rule specification for law '{law}' (service {service}) valid on {date}")]
    NoRuleSpec {
        law: String,
        service: String,
        date: String,
    },

    /// Reading a rule file from disk failed.
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
}

impl CoreError {
    pub(crate) fn deserialize(message: impl Into<String>) -> Self {
        CoreError::Deserialize {
            message: message.into(),
        }
    }
}
