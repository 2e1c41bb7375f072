//! Removal-quote marketplace core.
//!
//! Homeowners submit move requests, vetted removal companies are matched to them,
//! and partners spend credits to reveal a homeowner's contact details. The
//! [`marketplace`] module holds the partner lifecycle, the append-only credit
//! ledger, reveal pricing, the audit trail, and the HTTP router that exposes them.

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;
