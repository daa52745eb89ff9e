//! # catering-db: Database Layer for the Catering Quote Engine
//!
//! This crate provides persistence for quotes, invoices, change requests
//! and their audit trails. It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Catering Engine Data Flow                           │
//! │                                                                         │
//! │  ChangeRequestProcessor::approve (catering-engine)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                   catering-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐   │    │
//! │  │   │   Database    │    │  Repositories   │   │  Migrations  │   │    │
//! │  │   │   (pool.rs)   │    │                 │   │  (embedded)  │   │    │
//! │  │   │               │    │ QuoteRepo       │   │              │   │    │
//! │  │   │ SqlitePool    │◄───│ InvoiceRepo     │   │ 001_initial  │   │    │
//! │  │   │ Connection    │    │ ChangeRequest   │   │  _schema.sql │   │    │
//! │  │   │ Management    │    │ EstimateVersion │   │              │   │    │
//! │  │   │               │    │ Audit           │   │              │   │    │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘   │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     SQLite Database                             │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catering_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("catering.db")).await?;
//! let quote = db.quotes().get_by_id(&quote_id).await?;
//! let items = db.invoices().get_line_items(&invoice_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::AuditRepository;
pub use repository::change_request::{ChangeRequestRepository, Resolution};
pub use repository::estimate_version::EstimateVersionRepository;
pub use repository::invoice::{CustomLineItem, InvoiceRepository};
pub use repository::quote::QuoteRepository;
