//! # garage-db: Persistence and Transactions for the Garage Ledger
//!
//! This crate owns every SQLite transaction of the ledger. It uses sqlx for
//! async access and delegates every financial rule to `garage-core`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Garage Ledger Data Flow                          │
//! │                                                                         │
//! │  Host application / garage-ledger CLI                                   │
//! │       │  RequestContext { company_id, branch_id, actor_id }             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    garage-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │ LedgerService │───►│  Repositories │    │  Migrations  │   │   │
//! │  │   │ (service.rs)  │    │ invoice.rs    │    │  (embedded)  │   │   │
//! │  │   │               │    │ payment.rs    │    │              │   │   │
//! │  │   │ one tx per    │    │ advance.rs    │    │ 001_ledger_  │   │   │
//! │  │   │ operation     │    │ sequence.rs   │    │  schema.sql  │   │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │           │ pure rules         │                                │   │
//! │  │           ▼                    ▼                                │   │
//! │  │      garage-core          Database (pool.rs)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  │   ~/.local/share/ledger/garage-ledger.db (platform data dir)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`service`] - `LedgerService`, the ledger's operations
//! - [`repository`] - SQL per table (transaction-scoped functions + repositories)
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - tracing subscriber setup
//! - [`error`] - `DbError`, `LedgerError`, `ErrorReport`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use garage_db::{Database, LedgerConfig, LedgerService};
//!
//! let config = LedgerConfig::load(None)?;
//! let db = Database::new(config.database.db_config()).await?;
//! let ledger = LedgerService::new(db, &config);
//!
//! let invoice = ledger.create_invoice_from_job(&ctx, &job_id, today).await?;
//! let invoice = ledger.finalize_invoice(&ctx, &invoice.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::LedgerConfig;
pub use error::{DbError, DbResult, ErrorReport, LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};
pub use service::{
    AdvanceRequest, InventoryNotifier, LedgerService, NoopNotifier, PaymentHistory, PaymentRequest,
};

// Repository re-exports for convenience
pub use repository::{
    AdvanceRepository, DependencyRepository, DirectoryRepository, InventoryRepository,
    InvoiceRepository, JobRepository, MovementSource, PaymentRepository, PurchaseRepository,
    SequenceRepository,
};
