//! Payment method integration module
//!
//! This module provides the MOLPay hosted payment page integration behind the
//! host platform's payment method interface.

pub mod providers;
pub mod traits;
pub mod types;
