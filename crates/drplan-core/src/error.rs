//! Validation errors for plan and group definitions.

use thiserror::Error;

/// Result type alias for definition-level validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Structural problems in a group or plan definition.
///
/// These are always hard blocks at the creation boundary; none of them can
/// ever reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name '{0}' exceeds {1} characters")]
    NameTooLong(String, usize),

    #[error("plan has no waves")]
    NoWaves,

    #[error("duplicate wave id '{0}'")]
    DuplicateWaveId(String),

    #[error("wave '{wave}' depends on unknown wave '{dependency}'")]
    UnknownDependency { wave: String, dependency: String },

    #[error("wave '{wave}' references no protection groups")]
    EmptyWave { wave: String },

    #[error("dependency cycle detected through wave '{wave}'")]
    DependencyCycle { wave: String },
}

/// Maximum length for group and plan names.
pub const MAX_NAME_LEN: usize = 64;

/// Validate a user-supplied group or plan name (1-64 chars).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong(name.to_string(), MAX_NAME_LEN));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_bounds() {
        assert!(validate_name("app-tier").is_ok());
        assert!(validate_name(&"x".repeat(64)).is_ok());
        assert_eq!(validate_name(""), Err(ValidationError::EmptyName));
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
        assert!(matches!(
            validate_name(&"x".repeat(65)),
            Err(ValidationError::NameTooLong(_, 64))
        ));
    }
}
