//! Payment types and data structures
//!
//! Read-only views of host data handed to the plugin, plus the result types
//! the plugin hands back.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;
use uuid::Uuid;

/// Generic payment state of an order, owned by the host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Paid,
    PartiallyRefunded,
    Refunded,
    Voided,
}

/// How the customer completes a payment with this method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethodType {
    /// Payment details are collected on the store's checkout page
    Standard,
    /// Customer is sent to a third-party site
    Redirection,
    /// Payment starts from a button on the cart page
    Button,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecurringPaymentType {
    NotSupported,
    Manual,
    Automatic,
}

/// Result of a payment transition as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Captured,
    Pending,
    Failed,
}

impl GatewayOutcome {
    /// Parse the gateway's numeric `status` field (`00`, `22`, `11`).
    pub fn from_status_code(code: &str) -> Option<Self> {
        match code.trim() {
            "00" => Some(Self::Captured),
            "22" => Some(Self::Pending),
            "11" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Rounding applied to every amount sent to the gateway
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AmountRounding {
    /// Midpoint to even, the platform's default decimal rounding
    #[default]
    Bankers,
    /// Midpoint away from zero
    AwayFromZero,
}

impl AmountRounding {
    /// Round to two fractional digits.
    pub fn round(self, amount: Decimal) -> Decimal {
        let strategy = match self {
            AmountRounding::Bankers => RoundingStrategy::MidpointNearestEven,
            AmountRounding::AwayFromZero => RoundingStrategy::MidpointAwayFromZero,
        };
        amount.round_dp_with_strategy(2, strategy)
    }
}

/// Format an amount with exactly two fractional digits and no grouping.
pub fn format_amount(amount: Decimal) -> String {
    let mut amount = amount;
    amount.rescale(2);
    amount.to_string()
}

/// Merchant identity and the shared secret used to sign requests
#[derive(Clone)]
pub struct MerchantCredentials {
    merchant_id: String,
    vkey: SecretString,
}

impl MerchantCredentials {
    pub fn new(merchant_id: impl Into<String>, vkey: SecretString) -> AppResult<Self> {
        let merchant_id = merchant_id.into();
        if merchant_id.trim().is_empty() {
            return Err(AppError::configuration("MOLPay merchant id is required"));
        }
        if vkey.expose_secret().trim().is_empty() {
            return Err(AppError::configuration("MOLPay verify key (vkey) is required"));
        }
        Ok(Self { merchant_id, vkey })
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn vkey(&self) -> &SecretString {
        &self.vkey
    }
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("merchant_id", &self.merchant_id)
            .field("vkey", &"[REDACTED]")
            .finish()
    }
}

/// Store-wide values the host resolves once
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// Store base URL, e.g. `https://shop.example.com/`
    pub store_url: Url,
    /// Code of the primary store currency (MYR, USD, ...)
    pub primary_currency_code: String,
}

/// Postal address as stored on an order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub country_id: Option<String>,
    pub state_province_id: Option<String>,
}

/// One purchased product line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: u32,
    /// Unit price excluding tax
    pub unit_price_excl_tax: Decimal,
    /// Line total excluding tax
    pub price_excl_tax: Decimal,
}

/// A checkout attribute value selected by the customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutAttributeValue {
    pub checkout_attribute_id: String,
    pub name: String,
    pub price_adjustment: Decimal,
}

/// Read-only view of an order at redirect time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: String,
    pub order_number: u64,
    /// Host-side order reference, logged with the redirect
    pub order_guid: Uuid,
    pub customer_id: String,
    pub created_on_utc: DateTime<Utc>,
    pub order_total: Decimal,
    pub order_shipping_excl_tax: Decimal,
    pub payment_method_additional_fee_excl_tax: Decimal,
    pub order_tax: Decimal,
    pub billing_address: Option<Address>,
    pub shipping_address: Option<Address>,
    pub items: Vec<OrderItem>,
    pub checkout_attributes: Vec<CheckoutAttributeValue>,
    /// System name of the payment method chosen at checkout
    pub payment_method_system_name: String,
}

/// Outcome of a host-initiated payment operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationResult {
    pub errors: Vec<String>,
}

impl OperationResult {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Payment details collected on the checkout page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub custom_values: HashMap<String, String>,
}

/// Static capability flags of a payment method
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentCapabilities {
    pub supports_capture: bool,
    pub supports_partial_refund: bool,
    pub supports_refund: bool,
    pub supports_void: bool,
    pub recurring_payment_type: RecurringPaymentType,
    pub payment_method_type: PaymentMethodType,
    pub skip_payment_info: bool,
}
