//! # Request Validation Helpers
//!
//! Utilities for validating incoming request data using the `validator` crate.
//!
//! ## How Validation Works
//!
//! We use the [`validator`](https://docs.rs/validator/) crate which provides
//! derive macros for declarative validation:
//!
//! ```rust,ignore
//! use validator::Validate;
//!
//! #[derive(Validate)]
//! struct CreateUser {
//!     #[validate(email)]
//!     email: String,
//!
//!     #[validate(length(min = 8))]
//!     password: String,
//! }
//! ```
//!
//! ## Error Response Format
//!
//! When validation fails, the API returns a 400 Bad Request with details:
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "error": "Validation error",
//!   "details": {
//!     "email": [
//!       { "code": "email", "message": "Invalid email format" }
//!     ]
//!   }
//! }
//! ```
//!
//! ## Custom Validators
//!
//! The [`validators`] module provides the validation functions shared by the
//! request DTOs and the broker payload schemas:
//!
//! | Validator | Purpose |
//! |-----------|---------|
//! | `not_blank` | String is not empty after trimming |
//! | `valid_role_name` | Lowercase role identifier |
//! | `valid_hex_digest` | 64-char lowercase hex SHA-256 |

use crate::errors::ApiError;
use validator::Validate;

// =============================================================================
// Core Validation Functions
// =============================================================================

/// Validates a request DTO that implements `Validate`.
///
/// This is the primary validation function. Use it in handlers to
/// validate incoming data.
///
/// ## Example
///
/// ```rust,ignore
/// async fn create_user(body: Json<CreateUserRequest>) -> Result<impl Responder, ApiError> {
///     validate_request(&body)?;  // Returns early if invalid
///
///     // Continue with validated data
/// }
/// ```
///
/// ## Errors
///
/// Returns `ApiError::ValidationError` with field-level details if validation fails.
pub fn validate_request<T: Validate>(data: &T) -> Result<(), ApiError> {
    data.validate().map_err(ApiError::ValidationError)
}

// =============================================================================
// Custom Validators
// =============================================================================

/// Custom validation functions for use with `#[validate(custom)]`.
///
/// These functions follow the validator crate's signature:
/// `fn(&T) -> Result<(), ValidationError>`
pub mod validators {
    use validator::ValidationError;

    /// Validates that a string is not blank (empty or whitespace-only).
    pub fn not_blank(value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new("blank"));
        }
        Ok(())
    }

    /// Validates a role identifier.
    ///
    /// ## Rules
    ///
    /// - Starts with a lowercase letter
    /// - Continues with lowercase letters, digits, `:`, `_` or `-`
    ///
    /// ## Valid Examples
    ///
    /// - `"admin"` ✓
    /// - `"node-operators"` ✓
    /// - `"ops:readonly"` ✓
    ///
    /// ## Invalid Examples
    ///
    /// - `"Admin"` ✗ (uppercase)
    /// - `"1st-line"` ✗ (starts with digit)
    /// - `"ops team"` ✗ (space)
    pub fn valid_role_name(value: &str) -> Result<(), ValidationError> {
        let mut chars = value.chars();

        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return Err(ValidationError::new("invalid_role_name")),
        }

        if !chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == ':' || c == '_' || c == '-'
        }) {
            return Err(ValidationError::new("invalid_role_name"));
        }

        Ok(())
    }

    /// Validates a lowercase hex SHA-256 digest (64 characters).
    pub fn valid_hex_digest(value: &str) -> Result<(), ValidationError> {
        if value.len() != 64 {
            return Err(ValidationError::new("invalid_digest"));
        }
        if !value.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)) {
            return Err(ValidationError::new("invalid_digest"));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::validators::*;

    #[test]
    fn test_not_blank_valid() {
        assert!(not_blank("hello").is_ok());
        assert!(not_blank("  hello  ").is_ok());
        assert!(not_blank("a").is_ok());
    }

    #[test]
    fn test_not_blank_invalid() {
        assert!(not_blank("").is_err());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("\t\n").is_err());
    }

    #[test]
    fn test_valid_role_name_valid() {
        assert!(valid_role_name("admin").is_ok());
        assert!(valid_role_name("user").is_ok());
        assert!(valid_role_name("node-operators").is_ok());
        assert!(valid_role_name("ops:readonly").is_ok());
        assert!(valid_role_name("a").is_ok());
        assert!(valid_role_name("tier_2").is_ok());
    }

    #[test]
    fn test_valid_role_name_invalid() {
        assert!(valid_role_name("").is_err());
        assert!(valid_role_name("Admin").is_err());
        assert!(valid_role_name("1st-line").is_err());
        assert!(valid_role_name("-ops").is_err());
        assert!(valid_role_name("ops team").is_err());
        assert!(valid_role_name("ops.read").is_err());
    }

    #[test]
    fn test_valid_hex_digest() {
        let digest = "a".repeat(64);
        assert!(valid_hex_digest(&digest).is_ok());

        assert!(valid_hex_digest("abc123").is_err()); // too short
        assert!(valid_hex_digest(&"A".repeat(64)).is_err()); // uppercase
        assert!(valid_hex_digest(&"g".repeat(64)).is_err()); // not hex
    }
}
