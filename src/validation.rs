//! Pure sign-up form validation.
//!
//! Rules run in a fixed order and the first violation short-circuits:
//! names, email, address, password, confirmation. No I/O: the orchestrator
//! guarantees nothing leaves the device until this module passes, so every
//! rule here is independently testable without collaborators.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::SignupForm;

/// Minimum length for first/last names.
const NAME_MIN_LEN: usize = 2;
/// Minimum length for the street address, after trimming.
const ADDRESS_MIN_LEN: usize = 5;
/// Minimum password length. Strength scoring applies on top of this.
const PASSWORD_MIN_LEN: usize = 6;
/// Passwords shorter than this never earn the length criterion.
const PASSWORD_STRONG_LEN: usize = 8;
/// Minimum strength score (criteria met out of 4) for an acceptable password.
const PASSWORD_MIN_STRENGTH: u8 = 2;
/// Punctuation set counted as "symbol" by the strength score.
const PASSWORD_SYMBOLS: &str = "!@#$%^&*(),.?\":{}|<>";

// Compile-once patterns via OnceLock.
fn re_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Letters, spaces, hyphens, apostrophes only
    RE.get_or_init(|| Regex::new(r"^[A-Za-z '-]+$").unwrap())
}

fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // local@domain.tld — same permissive shape the shipped form used
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

/// Form field a validation rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldId {
    FirstName,
    LastName,
    Email,
    Address,
    Password,
    Confirmation,
}

impl FieldId {
    /// Label used when composing user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            FieldId::FirstName => "First name",
            FieldId::LastName => "Last name",
            FieldId::Email => "Email",
            FieldId::Address => "Address",
            FieldId::Password => "Password",
            FieldId::Confirmation => "Password confirmation",
        }
    }
}

/// Which rule a field violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleId {
    Required,
    TooShort,
    InvalidCharacters,
    InvalidFormat,
    TooWeak,
    Mismatch,
}

/// A single rule violation: which field, which rule.
///
/// Resolved locally by the shell (highlight the field, show the message);
/// never crosses a collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: FieldId,
    pub rule: RuleId,
}

impl ValidationError {
    fn new(field: FieldId, rule: RuleId) -> Self {
        Self { field, rule }
    }

    /// One actionable message per violation.
    pub fn message(&self) -> String {
        match self.rule {
            RuleId::Required => format!("{} is required.", self.field.label()),
            RuleId::TooShort => match self.field {
                FieldId::FirstName | FieldId::LastName => format!(
                    "{} must be at least {} characters.",
                    self.field.label(),
                    NAME_MIN_LEN
                ),
                FieldId::Address => format!(
                    "{} must be at least {} characters.",
                    self.field.label(),
                    ADDRESS_MIN_LEN
                ),
                _ => format!(
                    "{} must be at least {} characters.",
                    self.field.label(),
                    PASSWORD_MIN_LEN
                ),
            },
            RuleId::InvalidCharacters => format!(
                "{} may only contain letters, spaces, hyphens, and apostrophes.",
                self.field.label()
            ),
            RuleId::InvalidFormat => "Enter a valid email address.".to_string(),
            RuleId::TooWeak => {
                "Password is too weak. Use 8+ characters with a mix of uppercase, \
                 numbers, and symbols."
                    .to_string()
            }
            RuleId::Mismatch => "Passwords do not match.".to_string(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Password strength score: how many of the four criteria the password
/// meets (length >= 8, a digit, an uppercase letter, a symbol).
///
/// Public so the shell can render a live strength meter from the same
/// scoring the validator enforces.
pub fn password_strength(password: &str) -> u8 {
    let mut score = 0u8;
    if password.chars().count() >= PASSWORD_STRONG_LEN {
        score += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if password.chars().any(|c| c.is_uppercase()) {
        score += 1;
    }
    if password.chars().any(|c| PASSWORD_SYMBOLS.contains(c)) {
        score += 1;
    }
    score
}

/// Validate a sign-up form. First failing rule wins.
pub fn validate(form: &SignupForm) -> Result<(), ValidationError> {
    validate_name(FieldId::FirstName, &form.first_name)?;
    validate_name(FieldId::LastName, &form.last_name)?;
    validate_email(&form.email)?;
    validate_address(&form.address)?;
    validate_password(&form.password)?;
    validate_confirmation(&form.password, &form.confirm_password)?;
    Ok(())
}

fn validate_name(field: FieldId, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(field, RuleId::Required));
    }
    if trimmed.chars().count() < NAME_MIN_LEN {
        return Err(ValidationError::new(field, RuleId::TooShort));
    }
    if !re_name().is_match(trimmed) {
        return Err(ValidationError::new(field, RuleId::InvalidCharacters));
    }
    Ok(())
}

fn validate_email(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(FieldId::Email, RuleId::Required));
    }
    if !re_email().is_match(trimmed) {
        return Err(ValidationError::new(FieldId::Email, RuleId::InvalidFormat));
    }
    Ok(())
}

fn validate_address(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(FieldId::Address, RuleId::Required));
    }
    if trimmed.chars().count() < ADDRESS_MIN_LEN {
        return Err(ValidationError::new(FieldId::Address, RuleId::TooShort));
    }
    Ok(())
}

fn validate_password(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::new(FieldId::Password, RuleId::Required));
    }
    if value.chars().count() < PASSWORD_MIN_LEN {
        return Err(ValidationError::new(FieldId::Password, RuleId::TooShort));
    }
    if password_strength(value) < PASSWORD_MIN_STRENGTH {
        return Err(ValidationError::new(FieldId::Password, RuleId::TooWeak));
    }
    Ok(())
}

fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if confirmation.is_empty() {
        return Err(ValidationError::new(FieldId::Confirmation, RuleId::Required));
    }
    if confirmation != password {
        return Err(ValidationError::new(FieldId::Confirmation, RuleId::Mismatch));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> SignupForm {
        SignupForm {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "a@b.com".into(),
            address: "12 Analytical Row".into(),
            password: "Passw0rd!".into(),
            confirm_password: "Passw0rd!".into(),
        }
    }

    #[test]
    fn test_valid_form_passes() {
        assert!(validate(&valid_form()).is_ok());
    }

    #[test]
    fn test_first_name_required() {
        let mut form = valid_form();
        form.first_name = "   ".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::FirstName, RuleId::Required))
        );
    }

    #[test]
    fn test_name_too_short() {
        let mut form = valid_form();
        form.last_name = "L".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::LastName, RuleId::TooShort))
        );
    }

    #[test]
    fn test_name_rejects_digits_and_punctuation() {
        let mut form = valid_form();
        form.first_name = "Ada3".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(
                FieldId::FirstName,
                RuleId::InvalidCharacters
            ))
        );

        form.first_name = "Ada_".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(
                FieldId::FirstName,
                RuleId::InvalidCharacters
            ))
        );
    }

    #[test]
    fn test_name_allows_hyphens_apostrophes_spaces() {
        let mut form = valid_form();
        form.last_name = "O'Neill-Smith".into();
        assert!(validate(&form).is_ok());

        form.first_name = "Mary Jane".into();
        assert!(validate(&form).is_ok());
    }

    #[test]
    fn test_email_shape() {
        let mut form = valid_form();
        for bad in ["plainaddress", "a@b", "a b@c.com", "@no-local.com", "a@@b.com"] {
            form.email = bad.into();
            assert_eq!(
                validate(&form),
                Err(ValidationError::new(FieldId::Email, RuleId::InvalidFormat)),
                "expected {bad:?} to be rejected"
            );
        }

        form.email = "first.last+tag@sub.example.co".into();
        assert!(validate(&form).is_ok());
    }

    #[test]
    fn test_address_minimum_length() {
        let mut form = valid_form();
        form.address = " 12a ".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::Address, RuleId::TooShort))
        );
    }

    #[test]
    fn test_password_too_short() {
        // Scenario: three-character password fails the length rule, not strength
        let mut form = valid_form();
        form.password = "abc".into();
        form.confirm_password = "abc".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::Password, RuleId::TooShort))
        );
    }

    #[test]
    fn test_password_long_enough_but_weak() {
        let mut form = valid_form();
        // 6 chars, all lowercase letters: strength 0
        form.password = "abcdef".into();
        form.confirm_password = "abcdef".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::Password, RuleId::TooWeak))
        );
    }

    #[test]
    fn test_confirmation_mismatch() {
        let mut form = valid_form();
        form.confirm_password = "Passw0rd?".into();
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::Confirmation, RuleId::Mismatch))
        );
    }

    #[test]
    fn test_rules_short_circuit_in_order() {
        // Multiple violations: the name rule fires first
        let form = SignupForm {
            first_name: String::new(),
            last_name: String::new(),
            email: "not-an-email".into(),
            address: String::new(),
            password: "x".into(),
            confirm_password: "y".into(),
        };
        assert_eq!(
            validate(&form),
            Err(ValidationError::new(FieldId::FirstName, RuleId::Required))
        );
    }

    #[test]
    fn test_strength_scoring() {
        assert_eq!(password_strength(""), 0);
        assert_eq!(password_strength("abcdef"), 0);
        assert_eq!(password_strength("abcdefgh"), 1); // length only
        assert_eq!(password_strength("abcdef1"), 1); // digit only
        assert_eq!(password_strength("Abcdef1"), 2); // digit + uppercase
        assert_eq!(password_strength("Abcdefg1"), 3); // + length
        assert_eq!(password_strength("Passw0rd!"), 4); // all four
    }

    #[test]
    fn test_validation_error_messages_are_actionable() {
        let err = ValidationError::new(FieldId::Password, RuleId::TooWeak);
        assert!(err.message().contains("8+"));
        let err = ValidationError::new(FieldId::Confirmation, RuleId::Mismatch);
        assert_eq!(err.message(), "Passwords do not match.");
    }

    #[test]
    fn test_field_and_rule_serialize_camel_case() {
        assert_eq!(
            serde_json::to_string(&FieldId::FirstName).unwrap(),
            "\"firstName\""
        );
        assert_eq!(serde_json::to_string(&RuleId::TooWeak).unwrap(), "\"tooWeak\"");
    }
}
