//! Payment method trait definitions
//!
//! Defines the interface the host platform drives a payment plugin through,
//! and the narrow collaborator interfaces the plugin needs from the host.

use crate::error::AppResult;
use crate::payments::providers::molpay::CallbackResponse;
use crate::payments::types::{
    CheckoutAttributeValue, OperationResult, OrderItem, OrderSnapshot, PaymentCapabilities,
    PaymentInfo,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Trait for payment method implementations loaded by the host
#[async_trait]
pub trait PaymentMethod: Send + Sync {
    /// Process a payment when the order is placed
    ///
    /// Redirection methods do nothing here; the work happens in
    /// [`PaymentMethod::post_process_payment`].
    fn process_payment(&self, order: &OrderSnapshot) -> OperationResult;

    /// Build the redirect to the hosted payment page
    ///
    /// # Arguments
    /// * `order` - The placed order
    ///
    /// # Returns
    /// * `http::Response<()>` - A `302 Found` response whose `Location` header
    ///   points at the gateway
    fn post_process_payment(&self, order: &OrderSnapshot) -> AppResult<http::Response<()>>;

    /// Confirm a one-time transaction token with the gateway (PDT)
    ///
    /// # Arguments
    /// * `transaction_token` - The `tx` value the gateway appended to the return URL
    /// * `user_agent` - User agent of the customer's browser, forwarded to the gateway
    ///
    /// # Returns
    /// * `CallbackResponse` - Outcome plus the transaction fields reported by the gateway
    async fn verify_pdt(
        &self,
        transaction_token: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse>;

    /// Validate a posted notification by echoing it to the gateway (IPN)
    ///
    /// # Arguments
    /// * `form_body` - Raw `application/x-www-form-urlencoded` body as received
    /// * `user_agent` - User agent of the notifying request
    ///
    /// # Returns
    /// * `CallbackResponse` - Outcome plus the fields of the posted form
    async fn verify_ipn(
        &self,
        form_body: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse>;

    /// Whether the method should be hidden for the given cart
    fn hide_payment_method(&self, cart: &[OrderItem]) -> bool;

    /// Extra fee charged for choosing this method
    ///
    /// # Arguments
    /// * `cart_total` - Cart total without any payment method fee
    fn additional_handling_fee(&self, cart_total: Decimal) -> Decimal;

    fn capture(&self, order: &OrderSnapshot) -> OperationResult;

    fn refund(&self, order: &OrderSnapshot, amount: Decimal) -> OperationResult;

    fn void(&self, order: &OrderSnapshot) -> OperationResult;

    fn process_recurring_payment(&self, order: &OrderSnapshot) -> OperationResult;

    fn cancel_recurring_payment(&self, order: &OrderSnapshot) -> OperationResult;

    /// Whether the customer may be sent to the gateway again for an unpaid order
    fn can_repost_process_payment(&self, order: &OrderSnapshot, now: DateTime<Utc>) -> bool;

    /// Validate the checkout payment form, returning error messages
    fn validate_payment_form(&self, form: &HashMap<String, String>) -> Vec<String>;

    fn payment_info(&self, form: &HashMap<String, String>) -> PaymentInfo;

    fn capabilities(&self) -> PaymentCapabilities;

    fn configuration_page_url(&self) -> String;

    fn public_view_component_name(&self) -> &'static str;

    /// Description shown on the "payment method" checkout step
    fn payment_method_description(&self) -> &'static str;
}

/// Read-only lookups into host catalog, directory and tax data
///
/// Every lookup returns `None` when the host has no matching record.
pub trait OrderLookups: Send + Sync {
    /// Two-letter ISO code of a country
    fn country_iso_code(&self, country_id: &str) -> Option<String>;

    /// Abbreviation of a state or province
    fn state_abbreviation(&self, state_province_id: &str) -> Option<String>;

    fn product_name(&self, product_id: &str) -> Option<String>;

    fn checkout_attribute_name(&self, checkout_attribute_id: &str) -> Option<String>;

    /// Price of a checkout attribute value, excluding tax, for the customer
    fn checkout_attribute_price(&self, value: &CheckoutAttributeValue, customer_id: &str)
        -> Decimal;
}

/// Key/value attributes the host stores against an order
pub trait OrderAttributeStore: Send + Sync {
    fn save_decimal(&self, order_id: &str, key: &str, value: Decimal) -> AppResult<()>;

    fn get_decimal(&self, order_id: &str, key: &str) -> AppResult<Option<Decimal>>;
}
