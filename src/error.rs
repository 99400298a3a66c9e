use thiserror::Error;

/// Errors produced by the profile aggregation core.
///
/// Within a merge session the first non-`Misuse` error poisons the merger:
/// later `add` calls report `Misuse` and `finish` returns the original
/// error.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ProfileError {
    /// Input bytes are not a valid protobuf of the declared schema.
    #[error("failed to parse profile: {0}")]
    Parse(String),
    /// A parsed profile violates a structural invariant.
    #[error("invalid profile: {0}")]
    Invariant(String),
    /// A merged-in profile has value types incompatible with the output's
    /// fixed list.
    #[error("incompatible value types: {0}")]
    IncompatibleValueTypes(String),
    /// A counter overflow that cannot be handled by saturation. Reserved:
    /// sample values saturate, so nothing raises this today.
    #[error("counter overflow: {0}")]
    Overflow(String),
    /// The API was called in the wrong state, e.g. `add` after `finish`.
    #[error("operation on a finished or poisoned merger")]
    Misuse,
    /// Bug-level invariants broken.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProfileError {
    pub(crate) fn parse(err: prost::DecodeError) -> Self {
        ProfileError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProfileError>;
