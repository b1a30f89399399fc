//! # garage-core: Pure Business Logic for the Garage Ledger
//!
//! This crate is the **heart** of the garage ledger. It holds every financial
//! rule as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Garage Ledger Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Reporting / UI layers (collaborators)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ LedgerService                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               garage-db (transactions, SQLite)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ pure calls                             │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ garage-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────┐ ┌─────────┐ │   │
//! │  │   │   tax   │ │ totals  │ │ numbering │ │ ledger │ │lifecycle│ │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────┘ └─────────┘ │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────────────────┐ │   │
//! │  │   │  money  │ │  types  │ │  records  │ │     integrity      │ │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer paise and half-up rounding
//! - [`types`] - Rates, quantities, statuses, request context
//! - [`records`] - Typed ledger rows and collaborator records
//! - [`tax`] - GST line calculation
//! - [`totals`] - Invoice header aggregation and reconciliation
//! - [`numbering`] - Fiscal years, prefixes, number format
//! - [`ledger`] - Payment status, outstanding, advance allocation
//! - [`lifecycle`] - Invoice state machine
//! - [`integrity`] - Cancellation/deletion dependency reports
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: paise in i64, rates in basis points, quantities in thousandths
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use garage_core::tax::{calculate_line, determine_regime, LineInput};
//! use garage_core::totals::aggregate;
//! use garage_core::{ItemKind, Money, Quantity, TaxRate};
//!
//! let regime = determine_regime(Some("Karnataka"), Some("karnataka")).unwrap();
//! let line = calculate_line(
//!     &LineInput {
//!         item_kind: ItemKind::Labor,
//!         description: "Periodic service".into(),
//!         linked_part_id: None,
//!         linked_service_id: None,
//!         hsn_sac: None,
//!         quantity: Quantity::from_units(1),
//!         unit_price: Money::from_rupees(1000),
//!         gst_rate: TaxRate::from_percent(18),
//!     },
//!     regime,
//! )
//! .unwrap();
//! let totals = aggregate(&[line]).unwrap();
//! assert_eq!(totals.grand_total, Money::from_rupees(1180));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod integrity;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod numbering;
pub mod records;
pub mod tax;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use garage_core::Money` instead of
// `use garage_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use integrity::DependencyReport;
pub use ledger::Settlement;
pub use lifecycle::CancellationResult;
pub use money::Money;
pub use numbering::IssuedNumber;
pub use records::*;
pub use tax::{LineInput, TaxLine};
pub use totals::InvoiceTotals;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest accepted line description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Longest accepted note or reason.
pub const MAX_NOTE_LEN: usize = 1000;

/// Longest accepted payment reference (UTR, cheque number).
pub const MAX_REFERENCE_LEN: usize = 100;

/// Default tolerance when reconciling header totals against line totals.
pub const RECONCILE_TOLERANCE: Money = Money::from_paise(5);
