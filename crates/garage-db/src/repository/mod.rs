//! # Repository Module
//!
//! Database access for the garage ledger.
//!
//! ## Two Layers per Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Free functions  fn(conn: &mut SqliteConnection, ...)                   │
//! │       │          run inside a transaction the CALLER owns;              │
//! │       │          LedgerService composes them into one atomic unit       │
//! │       │                                                                 │
//! │  Repositories    db.invoices().get_by_id(id)                            │
//! │                  pool-backed reads and single-step writes               │
//! │                                                                         │
//! │  SQL lives only here. Rules live in garage-core.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InvoiceRepository`] - Invoice headers, lines, status history
//! - [`PaymentRepository`] - Append-only payment ledger and its history
//! - [`AdvanceRepository`] - Advances and adjustments
//! - [`SequenceRepository`] - Document number counters
//! - [`JobRepository`] - Job cards and billable lines
//! - [`PurchaseRepository`] - Vendor bills and their payments
//! - [`InventoryRepository`] - Stock movements by source document
//! - [`DirectoryRepository`] - Branches, customers, fiscal years
//! - [`DependencyRepository`] - Read-only cancellation/deletion reports

pub mod advance;
pub mod dependency;
pub mod directory;
pub mod inventory;
pub mod invoice;
pub mod job;
pub mod payment;
pub mod purchase;
pub mod sequence;

pub use advance::AdvanceRepository;
pub use dependency::DependencyRepository;
pub use directory::DirectoryRepository;
pub use inventory::{InventoryRepository, MovementSource};
pub use invoice::InvoiceRepository;
pub use job::JobRepository;
pub use payment::PaymentRepository;
pub use purchase::PurchaseRepository;
pub use sequence::SequenceRepository;
