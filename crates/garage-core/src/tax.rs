//! # Tax Line Calculator
//!
//! Turns one billable job line into a fully split GST line.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  branch state ─┐                                                        │
//! │                ├─► normalize ─► same? ──yes──► INTRASTATE (CGST+SGST)   │
//! │  customer state┘                   │                                    │
//! │                                    └──no───► INTERSTATE (IGST)          │
//! │                                                                         │
//! │  quantity × unit_price ──round──► taxable_value                         │
//! │  taxable_value × rate  ──round──► tax_amount                            │
//! │                                                                         │
//! │  INTERSTATE: igst = tax_amount                                          │
//! │  INTRASTATE: cgst = round(tax_amount / 2)                               │
//! │              sgst = tax_amount − cgst   (remainder, never rounded)      │
//! │                                                                         │
//! │  total_value = taxable_value + tax_amount                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every field is rounded once, half-up, from unrounded inputs.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{ItemKind, Quantity, TaxRate, TaxRegime};
use crate::validation::{
    validate_description, validate_quantity, validate_tax_rate, validate_unit_price,
};

// =============================================================================
// Regime
// =============================================================================

/// Folds a state name for comparison: case-folded, with whitespace and
/// punctuation removed ("Tamil Nadu" == "tamil-nadu" == "TAMILNADU").
pub fn normalize_state(state: &str) -> String {
    state
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Decides the GST regime from the supplying branch's state and the
/// customer's state.
///
/// ## Errors
/// `InvalidTaxContext` when either side is missing or normalizes to empty.
pub fn determine_regime(
    branch_state: Option<&str>,
    customer_state: Option<&str>,
) -> CoreResult<TaxRegime> {
    let branch = branch_state.map(normalize_state).unwrap_or_default();
    if branch.is_empty() {
        return Err(CoreError::InvalidTaxContext(
            "branch state is missing".to_string(),
        ));
    }

    let customer = customer_state.map(normalize_state).unwrap_or_default();
    if customer.is_empty() {
        return Err(CoreError::InvalidTaxContext(
            "customer state is missing".to_string(),
        ));
    }

    Ok(if branch == customer {
        TaxRegime::Intrastate
    } else {
        TaxRegime::Interstate
    })
}

// =============================================================================
// Line Types
// =============================================================================

/// A billable line as exposed by the job source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineInput {
    pub item_kind: ItemKind,
    pub description: String,
    pub linked_part_id: Option<String>,
    pub linked_service_id: Option<String>,
    pub hsn_sac: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub gst_rate: TaxRate,
}

/// A fully calculated, GST-split invoice line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TaxLine {
    pub item_kind: ItemKind,
    pub description: String,
    pub linked_part_id: Option<String>,
    pub linked_service_id: Option<String>,
    pub hsn_sac: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub gst_rate: TaxRate,
    pub taxable_value: Money,
    pub cgst_rate: TaxRate,
    pub cgst_amount: Money,
    pub sgst_rate: TaxRate,
    pub sgst_amount: Money,
    pub igst_rate: TaxRate,
    pub igst_amount: Money,
    pub tax_amount: Money,
    pub total_value: Money,
}

impl TaxLine {
    /// Checks the line invariants: totals add up, components add up, and
    /// only the components of one regime are in use.
    pub fn is_consistent(&self) -> bool {
        let totals_add_up = self.total_value == self.taxable_value + self.tax_amount;
        let components_add_up =
            self.cgst_amount + self.sgst_amount + self.igst_amount == self.tax_amount;
        let single_regime = self.igst_amount.is_zero()
            || (self.cgst_amount.is_zero() && self.sgst_amount.is_zero());
        totals_add_up && components_add_up && single_regime
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Calculates one tax line.
///
/// ## Example
/// ```rust
/// use garage_core::money::Money;
/// use garage_core::tax::{calculate_line, LineInput};
/// use garage_core::types::{ItemKind, Quantity, TaxRate, TaxRegime};
///
/// let input = LineInput {
///     item_kind: ItemKind::Labor,
///     description: "General service".into(),
///     linked_part_id: None,
///     linked_service_id: None,
///     hsn_sac: Some("998714".into()),
///     quantity: Quantity::from_units(1),
///     unit_price: Money::from_rupees(1000),
///     gst_rate: TaxRate::from_percent(18),
/// };
/// let line = calculate_line(&input, TaxRegime::Intrastate).unwrap();
/// assert_eq!(line.cgst_amount, Money::from_rupees(90));
/// assert_eq!(line.sgst_amount, Money::from_rupees(90));
/// assert_eq!(line.total_value, Money::from_rupees(1180));
/// ```
pub fn calculate_line(input: &LineInput, regime: TaxRegime) -> CoreResult<TaxLine> {
    validate_description(&input.description)?;
    validate_quantity(input.quantity)?;
    validate_unit_price(input.unit_price)?;
    validate_tax_rate(input.gst_rate)?;

    let taxable_value = input.unit_price.times(input.quantity).ok_or_else(|| too_large("taxable value"))?;
    let tax_amount = taxable_value.percent(input.gst_rate).ok_or_else(|| too_large("tax amount"))?;
    let total_value = taxable_value
        .checked_add(tax_amount)
        .ok_or_else(|| too_large("line total"))?;

    let (cgst_rate, cgst_amount, sgst_rate, sgst_amount, igst_rate, igst_amount) = match regime {
        TaxRegime::Interstate => (
            TaxRate::zero(),
            Money::zero(),
            TaxRate::zero(),
            Money::zero(),
            input.gst_rate,
            tax_amount,
        ),
        TaxRegime::Intrastate => {
            let (cgst_rate, sgst_rate) = input.gst_rate.halves();
            let (cgst, sgst) = tax_amount.split_half();
            (cgst_rate, cgst, sgst_rate, sgst, TaxRate::zero(), Money::zero())
        }
    };

    Ok(TaxLine {
        item_kind: input.item_kind,
        description: input.description.trim().to_string(),
        linked_part_id: input.linked_part_id.clone(),
        linked_service_id: input.linked_service_id.clone(),
        hsn_sac: input.hsn_sac.clone(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        gst_rate: input.gst_rate,
        taxable_value,
        cgst_rate,
        cgst_amount,
        sgst_rate,
        sgst_amount,
        igst_rate,
        igst_amount,
        tax_amount,
        total_value,
    })
}

fn too_large(field: &str) -> ValidationError {
    ValidationError::TooLarge {
        field: field.to_string(),
    }
}

/// Calculates every line of a job under one regime, preserving order.
pub fn calculate_lines(inputs: &[LineInput], regime: TaxRegime) -> CoreResult<Vec<TaxLine>> {
    inputs
        .iter()
        .map(|input| calculate_line(input, regime))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(qty: i64, price: i64, bps: u32) -> LineInput {
        LineInput {
            item_kind: ItemKind::Part,
            description: "Brake pad set".to_string(),
            linked_part_id: Some("part-1".to_string()),
            linked_service_id: None,
            hsn_sac: Some("8708".to_string()),
            quantity: Quantity::from_thousandths(qty),
            unit_price: Money::from_paise(price),
            gst_rate: TaxRate::from_bps(bps),
        }
    }

    #[test]
    fn test_normalize_state() {
        assert_eq!(normalize_state("Tamil Nadu"), "tamilnadu");
        assert_eq!(normalize_state(" TAMIL-NADU. "), "tamilnadu");
    }

    #[test]
    fn test_determine_regime() {
        assert_eq!(
            determine_regime(Some("Karnataka"), Some("karnataka ")).unwrap(),
            TaxRegime::Intrastate
        );
        assert_eq!(
            determine_regime(Some("Karnataka"), Some("Kerala")).unwrap(),
            TaxRegime::Interstate
        );
        assert!(matches!(
            determine_regime(Some("Karnataka"), None),
            Err(CoreError::InvalidTaxContext(_))
        ));
        assert!(matches!(
            determine_regime(Some(" - "), Some("Kerala")),
            Err(CoreError::InvalidTaxContext(_))
        ));
    }

    #[test]
    fn test_intrastate_split() {
        let line = calculate_line(&input(1000, 100_000, 1800), TaxRegime::Intrastate).unwrap();
        assert_eq!(line.taxable_value.paise(), 100_000);
        assert_eq!(line.cgst_amount.paise(), 9_000);
        assert_eq!(line.sgst_amount.paise(), 9_000);
        assert_eq!(line.cgst_rate.bps(), 900);
        assert!(line.igst_amount.is_zero());
        assert_eq!(line.total_value.paise(), 118_000);
    }

    #[test]
    fn test_odd_tax_remainder_goes_to_sgst() {
        // ₹10.05 at 18% = 181 paise; CGST 91, SGST 90
        let line = calculate_line(&input(1000, 1005, 1800), TaxRegime::Intrastate).unwrap();
        assert_eq!(line.tax_amount.paise(), 181);
        assert_eq!(line.cgst_amount.paise(), 91);
        assert_eq!(line.sgst_amount.paise(), 90);
    }

    #[test]
    fn test_interstate_is_igst_only() {
        let line = calculate_line(&input(2000, 45_050, 2800), TaxRegime::Interstate).unwrap();
        assert_eq!(line.taxable_value.paise(), 90_100);
        assert_eq!(line.igst_amount, line.tax_amount);
        assert_eq!(line.igst_rate.bps(), 2800);
        assert!(line.cgst_amount.is_zero() && line.sgst_amount.is_zero());
    }

    #[test]
    fn test_fractional_quantity_rounds_once() {
        // 1.5 hours at ₹333.33 = 499.995 → ₹500.00, tax at 18% = ₹90.00
        let line = calculate_line(&input(1500, 33_333, 1800), TaxRegime::Intrastate).unwrap();
        assert_eq!(line.taxable_value.paise(), 50_000);
        assert_eq!(line.tax_amount.paise(), 9_000);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(calculate_line(&input(0, 100, 1800), TaxRegime::Intrastate).is_err());
        assert!(calculate_line(&input(1000, -1, 1800), TaxRegime::Intrastate).is_err());
        assert!(calculate_line(&input(1000, 100, 10_001), TaxRegime::Intrastate).is_err());
        let mut blank = input(1000, 100, 1800);
        blank.description = "  ".to_string();
        assert!(calculate_line(&blank, TaxRegime::Intrastate).is_err());
    }

    #[test]
    fn test_overflowing_line_is_a_validation_error() {
        // 1000 units at ~₹92 lakh crore each cannot be held in paise
        let err = calculate_line(&input(1_000_000, i64::MAX / 100, 1800), TaxRegime::Intrastate).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::TooLarge { ref field }) if field == "taxable value"
        ));

        // taxable fits, taxable + 18% does not
        let err = calculate_line(&input(1000, i64::MAX - 10, 1800), TaxRegime::Interstate).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    fn arb_rate() -> impl Strategy<Value = u32> {
        prop_oneof![
            Just(0u32),
            Just(25u32),
            Just(300u32),
            Just(500u32),
            Just(1200u32),
            Just(1800u32),
            Just(2800u32),
            0u32..=10_000u32,
        ]
    }

    fn arb_regime() -> impl Strategy<Value = TaxRegime> {
        prop_oneof![Just(TaxRegime::Intrastate), Just(TaxRegime::Interstate)]
    }

    proptest! {
        /// Every calculated line satisfies the TaxLine invariants.
        #[test]
        fn line_invariants_hold(
            qty in 1i64..1_000_000i64,
            price in 0i64..100_000_000i64,
            bps in arb_rate(),
            regime in arb_regime(),
        ) {
            let line = calculate_line(&input(qty, price, bps), regime).unwrap();
            prop_assert_eq!(line.total_value, line.taxable_value + line.tax_amount);
            prop_assert_eq!(
                line.cgst_amount + line.sgst_amount + line.igst_amount,
                line.tax_amount
            );
            prop_assert!(line.is_consistent());
            if regime == TaxRegime::Intrastate {
                prop_assert!((line.cgst_amount - line.sgst_amount).abs().paise() <= 1);
            }
        }
    }
}
