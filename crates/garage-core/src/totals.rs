//! # Invoice Totals Aggregator
//!
//! Rolls calculated tax lines into the invoice header.
//!
//! ```text
//! lines ──► subtotal_service (LABOR taxable)
//!       ──► subtotal_parts   (PART taxable)
//!       ──► taxable_amount, cgst, sgst, igst, total_tax_amount
//!
//! gross_total  = taxable_amount + total_tax_amount
//! grand_total  = gross_total rounded to the rupee (half-up)
//! round_off    = grand_total − gross_total          (−₹0.49 ..= +₹0.50)
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::tax::TaxLine;
use crate::types::ItemKind;

/// Header totals of an invoice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceTotals {
    pub subtotal_service: Money,
    pub subtotal_parts: Money,
    pub taxable_amount: Money,
    pub cgst_amount: Money,
    pub sgst_amount: Money,
    pub igst_amount: Money,
    pub total_tax_amount: Money,
    pub gross_total: Money,
    pub round_off: Money,
    pub grand_total: Money,
}

/// Aggregates lines into header totals.
///
/// ## Errors
/// `EmptyInvoice` when `lines` is empty.
pub fn aggregate(lines: &[TaxLine]) -> CoreResult<InvoiceTotals> {
    if lines.is_empty() {
        return Err(CoreError::EmptyInvoice);
    }

    let add = |acc: Money, value: Money| {
        acc.checked_add(value).ok_or_else(|| ValidationError::TooLarge {
            field: "invoice total".to_string(),
        })
    };

    let mut totals = InvoiceTotals::default();
    for line in lines {
        match line.item_kind {
            ItemKind::Labor => totals.subtotal_service = add(totals.subtotal_service, line.taxable_value)?,
            ItemKind::Part => totals.subtotal_parts = add(totals.subtotal_parts, line.taxable_value)?,
        }
        totals.taxable_amount = add(totals.taxable_amount, line.taxable_value)?;
        totals.cgst_amount = add(totals.cgst_amount, line.cgst_amount)?;
        totals.sgst_amount = add(totals.sgst_amount, line.sgst_amount)?;
        totals.igst_amount = add(totals.igst_amount, line.igst_amount)?;
        totals.total_tax_amount = add(totals.total_tax_amount, line.tax_amount)?;
    }

    totals.gross_total = add(totals.taxable_amount, totals.total_tax_amount)?;
    totals.grand_total = totals.gross_total.round_to_rupee();
    totals.round_off = totals.grand_total - totals.gross_total;

    Ok(totals)
}

/// Verifies a stored header against its lines.
///
/// The sum of line `total_value` must match `gross_total` within
/// `tolerance`, and the header must be internally consistent.
pub fn reconcile(lines: &[TaxLine], totals: &InvoiceTotals, tolerance: Money) -> CoreResult<()> {
    let line_total: Money = lines.iter().map(|l| l.total_value).sum();

    let header_consistent = totals.gross_total == totals.taxable_amount + totals.total_tax_amount
        && totals.grand_total == totals.gross_total + totals.round_off
        && totals.total_tax_amount
            == totals.cgst_amount + totals.sgst_amount + totals.igst_amount;

    if !header_consistent || (line_total - totals.gross_total).abs() > tolerance {
        return Err(CoreError::ReconciliationFailed {
            header: totals.gross_total,
            lines: line_total,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::{calculate_line, LineInput};
    use crate::types::{Quantity, TaxRate, TaxRegime};
    use proptest::prelude::*;

    fn line(kind: ItemKind, qty: i64, price: i64, bps: u32, regime: TaxRegime) -> TaxLine {
        let input = LineInput {
            item_kind: kind,
            description: "line".to_string(),
            linked_part_id: None,
            linked_service_id: None,
            hsn_sac: None,
            quantity: Quantity::from_thousandths(qty),
            unit_price: Money::from_paise(price),
            gst_rate: TaxRate::from_bps(bps),
        };
        calculate_line(&input, regime).unwrap()
    }

    #[test]
    fn test_empty_invoice_rejected() {
        assert!(matches!(aggregate(&[]), Err(CoreError::EmptyInvoice)));
    }

    #[test]
    fn test_groups_by_item_kind() {
        let lines = vec![
            line(ItemKind::Labor, 1000, 60_000, 1800, TaxRegime::Intrastate),
            line(ItemKind::Part, 2000, 20_000, 1800, TaxRegime::Intrastate),
        ];
        let totals = aggregate(&lines).unwrap();
        assert_eq!(totals.subtotal_service.paise(), 60_000);
        assert_eq!(totals.subtotal_parts.paise(), 40_000);
        assert_eq!(totals.taxable_amount.paise(), 100_000);
        assert_eq!(totals.cgst_amount.paise(), 9_000);
        assert_eq!(totals.sgst_amount.paise(), 9_000);
        assert_eq!(totals.grand_total.paise(), 118_000);
        assert!(totals.round_off.is_zero());
    }

    #[test]
    fn test_round_off_to_rupee() {
        // ₹10.05 at 18% → gross ₹11.86 → grand ₹12.00, round-off +₹0.14
        let totals =
            aggregate(&[line(ItemKind::Part, 1000, 1005, 1800, TaxRegime::Intrastate)]).unwrap();
        assert_eq!(totals.gross_total.paise(), 1186);
        assert_eq!(totals.grand_total.paise(), 1200);
        assert_eq!(totals.round_off.paise(), 14);

        // ₹10.40 at 0% → grand ₹10.00, round-off −₹0.40
        let totals =
            aggregate(&[line(ItemKind::Labor, 1000, 1040, 0, TaxRegime::Interstate)]).unwrap();
        assert_eq!(totals.grand_total.paise(), 1000);
        assert_eq!(totals.round_off.paise(), -40);
    }

    #[test]
    fn test_reconcile_detects_tampering() {
        let lines = vec![line(ItemKind::Part, 1000, 1005, 1800, TaxRegime::Intrastate)];
        let totals = aggregate(&lines).unwrap();
        assert!(reconcile(&lines, &totals, Money::from_paise(5)).is_ok());

        let mut skewed = totals;
        skewed.gross_total += Money::from_paise(6);
        skewed.taxable_amount += Money::from_paise(6);
        skewed.grand_total = skewed.gross_total + skewed.round_off;
        assert!(matches!(
            reconcile(&lines, &skewed, Money::from_paise(5)),
            Err(CoreError::ReconciliationFailed { .. })
        ));
    }

    fn arb_line() -> impl Strategy<Value = TaxLine> {
        (
            prop_oneof![Just(ItemKind::Labor), Just(ItemKind::Part)],
            1i64..50_000i64,
            0i64..5_000_000i64,
            prop_oneof![Just(0u32), Just(500u32), Just(1200u32), Just(1800u32), Just(2800u32)],
            prop_oneof![Just(TaxRegime::Intrastate), Just(TaxRegime::Interstate)],
        )
            .prop_map(|(kind, qty, price, bps, regime)| line(kind, qty, price, bps, regime))
    }

    proptest! {
        /// grand_total is whole rupees and grand − round_off is taxable + tax.
        #[test]
        fn grand_total_is_whole_rupees(lines in prop::collection::vec(arb_line(), 1..=12)) {
            let totals = aggregate(&lines).unwrap();
            prop_assert!(totals.grand_total.is_whole_rupees());
            prop_assert_eq!(
                totals.grand_total - totals.round_off,
                totals.taxable_amount + totals.total_tax_amount
            );
            prop_assert!(totals.round_off.paise() >= -49 && totals.round_off.paise() <= 50);
            prop_assert!(reconcile(&lines, &totals, Money::from_paise(5)).is_ok());
        }
    }
}
