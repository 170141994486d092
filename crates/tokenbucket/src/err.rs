//! Declare error types.

use std::time::Duration;

/// An error related to an option passed to a [`TokenBucket`](crate::TokenBucket)
/// via a configuration builder, or when reconfiguring one.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigBuildError {
    /// A mandatory field was not present.
    #[error("Field was not provided: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },
    /// A single field had a value that proved to be unusable.
    #[error("Value of {field} was incorrect: {problem}")]
    Invalid {
        /// The name of the invalid field
        field: String,
        /// A description of the problem.
        problem: String,
    },
}

impl From<derive_builder::UninitializedFieldError> for ConfigBuildError {
    fn from(val: derive_builder::UninitializedFieldError) -> Self {
        ConfigBuildError::MissingField {
            field: val.field_name().to_string(),
        }
    }
}

/// A bounded token request was refused, because the tokens would not be
/// available soon enough.
///
/// When this is returned, the bucket was left exactly as it was:
/// no tokens were taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{count} tokens would only be available after {wait:?}, longer than the allowed {max_wait:?}")]
#[non_exhaustive]
pub struct ExceedsMaxWaitError {
    /// The number of tokens that were requested.
    pub count: i64,
    /// How long the caller would have had to wait.
    ///
    /// This is [`Duration::MAX`] if the tokens would arrive too far in the
    /// future for the time to be represented.
    pub wait: Duration,
    /// The longest wait the caller was willing to accept.
    pub max_wait: Duration,
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::mixed_attributes_style)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;

    #[test]
    fn display() {
        let e1 = ConfigBuildError::MissingField {
            field: "capacity".to_owned(),
        };
        let e2 = ConfigBuildError::Invalid {
            field: "fill_interval".to_owned(),
            problem: "must not be zero".to_owned(),
        };
        assert_eq!(&e1.to_string(), "Field was not provided: capacity");
        assert_eq!(
            &e2.to_string(),
            "Value of fill_interval was incorrect: must not be zero"
        );

        let e3 = ExceedsMaxWaitError {
            count: 5,
            wait: Duration::from_millis(500),
            max_wait: Duration::from_millis(100),
        };
        assert_eq!(
            &e3.to_string(),
            "5 tokens would only be available after 500ms, longer than the allowed 100ms"
        );
    }
}
