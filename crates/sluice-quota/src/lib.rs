//! Quota guard for sluice.
//!
//! Every upload is gated on its declared size before a single byte is
//! pushed. The arithmetic is a pure function ([`check_quota`]); the guard
//! adds the one I/O call it needs, a fresh usage query against the backend.
//!
//! # Quick Start
//!
//! ```rust
//! use sluice_quota::{check_quota, QuotaDecision, QuotaDenial};
//!
//! assert_eq!(check_quota(50, 900, 1000), QuotaDecision::Allow);
//! assert!(matches!(
//!     check_quota(200, 900, 1000),
//!     QuotaDecision::Deny(QuotaDenial::NotEnoughSpace { .. })
//! ));
//! ```
//!
//! The check is advisory. Usage is read at one instant and the push happens
//! later; nothing reserves the space in between, so a concurrent writer can
//! still make the push fail at the backend.

pub mod config;
pub mod error;
pub mod guard;

pub use config::QuotaConfig;
pub use error::{QuotaError, QuotaResult};
pub use guard::{check_quota, BucketQuotaState, QuotaCheck, QuotaDecision, QuotaDenial, QuotaGuard};
