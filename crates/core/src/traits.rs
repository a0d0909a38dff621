//! Core traits for Decoy
//!
//! This module defines the traits shared across crates: validation of
//! declarative definitions.

use crate::error::OrmResult;

// ============================================================================
// Validatable Trait
// ============================================================================

/// Trait for types that can be validated
///
/// Types implementing this trait can check their internal consistency
/// and return validation errors if the state is invalid.
///
/// # Example
///
/// ```rust,ignore
/// use decoy_core::{OrmError, OrmResult, Validatable};
///
/// struct ModelName(String);
///
/// impl Validatable for ModelName {
///     fn validate(&self) -> OrmResult<()> {
///         if self.0.is_empty() {
///             return Err(OrmError::InvalidDefinition("Model name cannot be empty".into()));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validatable {
    /// Validate the current state of the object
    ///
    /// Returns `Ok(())` if valid, or an `OrmError` describing the problem.
    fn validate(&self) -> OrmResult<()>;

    /// Check if the object is valid without returning error details
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Get all validation errors (for types that can have multiple errors)
    fn validation_errors(&self) -> Vec<String> {
        match self.validate() {
            Ok(()) => vec![],
            Err(e) => vec![e.to_string()],
        }
    }
}

/// Check that a name is usable as a model or association identifier
///
/// Identifiers start with an ASCII letter and contain only ASCII
/// alphanumerics or underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct TestValidatable {
        valid: bool,
    }

    impl Validatable for TestValidatable {
        fn validate(&self) -> OrmResult<()> {
            if self.valid {
                Ok(())
            } else {
                Err(crate::error::OrmError::InvalidDefinition(
                    "Invalid state".to_string(),
                ))
            }
        }
    }

    #[test]
    fn test_validatable_trait() {
        let valid = TestValidatable { valid: true };
        assert!(valid.is_valid());
        assert!(valid.validation_errors().is_empty());

        let invalid = TestValidatable { valid: false };
        assert!(!invalid.is_valid());
        assert_eq!(invalid.validation_errors().len(), 1);
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("post"));
        assert!(is_valid_identifier("blogPost"));
        assert!(is_valid_identifier("user_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("blog-post"));
    }
}
