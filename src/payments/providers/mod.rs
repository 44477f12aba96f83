//! Payment method implementations
//!
//! Concrete implementations of the PaymentMethod trait.

pub mod molpay;

pub use molpay::MolPayProvider;
