//! MOLPay hosted payment page integration
//!
//! Builds signed redirects to the MOLPay payment page and verifies the PDT and
//! IPN confirmations the gateway sends back. Order, catalog and settings data
//! belong to the host platform and reach the plugin through the traits in
//! [`payments::traits`].

pub mod config;
pub mod error;
pub mod payments;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use config::MolPaySettings;
pub use error::{AppError, AppErrorKind, AppResult};
pub use payments::providers::molpay::{CallbackResponse, MolPayProvider};
pub use payments::traits::{OrderAttributeStore, OrderLookups, PaymentMethod};

/// Provider name used in errors and logs
pub const PROVIDER_NAME: &str = "MOLPay";
