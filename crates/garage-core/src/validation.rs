//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (reporting/UI layer)                                  │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: garage-core                                                  │
//! │  └── THIS MODULE: amounts, quantities, rates, free text                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (balance ≥ 0, signed amounts)                   │
//! │  ├── UNIQUE constraints (numbers, one reversal per payment)            │
//! │  └── Triggers (append-only history and payments)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use garage_core::money::Money;
//! use garage_core::validation::{validate_description, validate_payment_amount};
//!
//! validate_description("Front brake pads").unwrap();
//! assert!(validate_payment_amount(Money::zero()).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Quantity, TaxRate};
use crate::{MAX_DESCRIPTION_LEN, MAX_NOTE_LEN, MAX_REFERENCE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a line description.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_DESCRIPTION_LEN`] characters
pub fn validate_description(description: &str) -> ValidationResult<()> {
    let description = description.trim();

    if description.is_empty() {
        return Err(ValidationError::Required {
            field: "description".to_string(),
        });
    }

    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }

    Ok(())
}

/// Validates a mandatory reason (reversal, cancellation).
///
/// ## Returns
/// The trimmed reason.
pub fn validate_reason(field: &str, reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if reason.chars().count() > MAX_NOTE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LEN,
        });
    }

    Ok(reason.to_string())
}

/// Normalizes an optional free-text field.
///
/// Blank input becomes `None`; anything longer than `max` is rejected.
pub fn normalize_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Normalizes an optional note.
pub fn normalize_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    normalize_optional("note", note, MAX_NOTE_LEN)
}

/// Normalizes an optional payment reference (UTR, cheque number, ...).
pub fn normalize_reference(reference: Option<&str>) -> ValidationResult<Option<String>> {
    normalize_optional("reference", reference, MAX_REFERENCE_LEN)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a billable quantity.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_quantity(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates a unit price.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (goodwill labour, warranty parts)
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "unit price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment or advance amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a GST rate.
///
/// ## Rules
/// - Must be between 0 and 10000 bps (0% to 100%)
pub fn validate_tax_rate(rate: TaxRate) -> ValidationResult<()> {
    if rate.bps() > TaxRate::MAX_BPS {
        return Err(ValidationError::OutOfRange {
            field: "gst rate".to_string(),
            min: 0,
            max: TaxRate::MAX_BPS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use garage_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_description() {
        assert!(validate_description("Engine oil 5W-30").is_ok());
        assert!(validate_description("").is_err());
        assert!(validate_description("   ").is_err());
        assert!(validate_description(&"A".repeat(MAX_DESCRIPTION_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_reason_trims() {
        assert_eq!(validate_reason("reason", "  bounced cheque ").unwrap(), "bounced cheque");
        assert!(validate_reason("reason", " ").is_err());
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_note(None).unwrap(), None);
        assert_eq!(normalize_note(Some("  ")).unwrap(), None);
        assert_eq!(normalize_reference(Some(" UTR123 ")).unwrap().as_deref(), Some("UTR123"));
        assert!(normalize_reference(Some(&"9".repeat(MAX_REFERENCE_LEN + 1))).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(Quantity::from_thousandths(1)).is_ok());
        assert!(validate_quantity(Quantity::from_units(0)).is_err());
        assert!(validate_quantity(Quantity::from_thousandths(-500)).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_unit_price(Money::zero()).is_ok());
        assert!(validate_unit_price(Money::from_paise(-1)).is_err());
        assert!(validate_payment_amount(Money::from_paise(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
    }

    #[test]
    fn test_validate_tax_rate() {
        assert!(validate_tax_rate(TaxRate::from_bps(0)).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(2800)).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(10_000)).is_ok());
        assert!(validate_tax_rate(TaxRate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
