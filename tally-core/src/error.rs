use std::borrow::Cow;

#[derive(thiserror::Error, Debug)]
pub enum TallyError {
    #[error("invalid configuration '{0}'")]
    InvalidConfig(Cow<'static, str>),

    #[error("counter already defined for field '{0}'")]
    DuplicateSequence(/* sequence id */ String),

    #[error("auto increment field '{field}' already present and not of type number (found {found})")]
    IncompatibleField {
        field: Cow<'static, str>,
        found: Cow<'static, str>,
    },

    #[error("trying to increment a wrong sequence using the id '{0}'")]
    UnknownSequence(/* sequence id */ String),

    #[error("duplicate counter key for sequence '{0}'")]
    DuplicateKey(/* sequence id */ String),

    #[error("no counter found for sequence '{0}'")]
    CounterNotFound(/* sequence id */ String),

    #[error("counter storage failure: {0}")]
    Storage(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error), // source and Display delegate to anyhow::Error
}

impl TallyError {
    /// Returns true if the error is raised while attaching a sequence.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TallyError::InvalidConfig(_)
                | TallyError::DuplicateSequence(_)
                | TallyError::IncompatibleField { .. }
        )
    }
}
