//! MOLPay payment method implementation
//!
//! This module integrates the MOLPay hosted payment page: customers are
//! redirected with a signed request and come back through PDT (return URL)
//! and IPN (server-to-server notification) confirmations.

pub mod request;
pub mod signature;
pub mod verifier;

#[cfg(test)]
mod tests;

pub use request::{build_redirect_request, BuiltRedirect, RedirectContext, RedirectRequest};
pub use signature::vcode;
pub use verifier::{CallbackFields, CallbackResponse, CallbackVerifier};

use crate::config::MolPaySettings;
use crate::error::{AppError, AppResult};
use crate::payments::traits::{OrderAttributeStore, OrderLookups, PaymentMethod};
use crate::payments::types::{
    GatewayOutcome, OperationResult, OrderItem, OrderSnapshot, PaymentCapabilities, PaymentInfo,
    PaymentMethodType, PaymentStatus, RecurringPaymentType, StoreContext,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http::{header::LOCATION, Response, StatusCode};
use reqwest::Client;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

/// Order attribute holding the amount sent in the last redirect
pub const ORDER_TOTAL_SENT_KEY: &str = "OrderTotalSentToMOLPay";

pub const VIEW_COMPONENT_NAME: &str = "MOLPay";
pub const CONFIGURE_PATH: &str = "Admin/MOLPay/Configure";
pub const PAYMENT_METHOD_DESCRIPTION: &str =
    "You will be redirected to MOLPay site to complete the payment";

const CAPTURE_NOT_SUPPORTED: &str = "Capture method not supported";
const REFUND_NOT_SUPPORTED: &str = "Refund method not supported";
const VOID_NOT_SUPPORTED: &str = "Void method not supported";
const RECURRING_NOT_SUPPORTED: &str = "Recurring payment not supported";

/// Seconds an order must exist before the customer may be redirected again
const REPOST_DELAY_SECS: i64 = 5;

/// MOLPay payment method
pub struct MolPayProvider {
    settings: MolPaySettings,
    store: StoreContext,
    verifier: CallbackVerifier,
    lookups: Arc<dyn OrderLookups>,
    attributes: Arc<dyn OrderAttributeStore>,
}

impl MolPayProvider {
    /// Create a new MOLPay provider instance
    pub fn new(
        settings: MolPaySettings,
        store: StoreContext,
        lookups: Arc<dyn OrderLookups>,
        attributes: Arc<dyn OrderAttributeStore>,
    ) -> AppResult<Self> {
        settings
            .validate()
            .map_err(|e| AppError::configuration(e.to_string()))?;

        let client = Client::builder()
            .user_agent(concat!("molpay-payments/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        let pdt_url = parse_endpoint(settings.pdt_url())?;
        let ipn_url = parse_endpoint(settings.ipn_url())?;
        let verifier = CallbackVerifier::new(client, pdt_url, ipn_url, settings.request_timeout());

        info!(
            "MOLPay provider initialised: sandbox={}, line_items={}",
            settings.use_sandbox, settings.pass_product_names_and_totals
        );

        Ok(Self {
            settings,
            store,
            verifier,
            lookups,
            attributes,
        })
    }

    pub fn settings(&self) -> &MolPaySettings {
        &self.settings
    }

    /// Build the redirect for an order without persisting anything
    pub fn build_redirect(&self, order: &OrderSnapshot) -> AppResult<BuiltRedirect> {
        let credentials = self.settings.credentials()?;
        let ctx = RedirectContext {
            order,
            credentials: &credentials,
            currency_code: &self.store.primary_currency_code,
            store_url: &self.store.store_url,
            gateway_url: self.settings.pay_url(),
            rounding: self.settings.rounding,
            pass_line_items: self.settings.pass_product_names_and_totals,
        };

        build_redirect_request(&ctx, self.lookups.as_ref())
    }

    /// Host payment status for a gateway outcome, per the configured mapping
    pub fn map_status(&self, outcome: GatewayOutcome) -> PaymentStatus {
        match outcome {
            GatewayOutcome::Captured => self.settings.captured_mode,
            GatewayOutcome::Pending => self.settings.pending_mode,
            GatewayOutcome::Failed => self.settings.failed_mode,
        }
    }

    /// Compare the gross amount reported by the gateway with the amount sent
    ///
    /// Always passes when order total validation is disabled. Fails when no
    /// amount was recorded for the order.
    pub fn validate_order_total(&self, order_id: &str, reported: Decimal) -> AppResult<bool> {
        if !self.settings.pdt_validate_order_total {
            return Ok(true);
        }

        let Some(sent) = self.attributes.get_decimal(order_id, ORDER_TOTAL_SENT_KEY)? else {
            warn!("No amount recorded as sent to MOLPay for order {}", order_id);
            return Ok(false);
        };

        let rounding = self.settings.rounding;
        let matches = rounding.round(reported) == rounding.round(sent);
        if !matches {
            warn!(
                "MOLPay reported {} for order {} but {} was sent",
                reported, order_id, sent
            );
        }
        Ok(matches)
    }
}

fn parse_endpoint(raw: &str) -> AppResult<Url> {
    Url::parse(raw).map_err(|e| AppError::invalid_url(raw, e.to_string()))
}

#[async_trait]
impl PaymentMethod for MolPayProvider {
    fn process_payment(&self, _order: &OrderSnapshot) -> OperationResult {
        OperationResult::success()
    }

    fn post_process_payment(&self, order: &OrderSnapshot) -> AppResult<Response<()>> {
        let redirect = self.build_redirect(order)?;

        self.attributes
            .save_decimal(&order.id, ORDER_TOTAL_SENT_KEY, redirect.amount_sent)
            .map_err(|e| {
                error!(
                    "Failed to save amount sent to MOLPay for order {}: {}",
                    order.order_number, e
                );
                e
            })?;

        info!(
            "Redirecting order {} ({}) to MOLPay: amount_sent={}, line_items={}",
            order.order_number,
            order.order_guid,
            redirect.amount_sent,
            redirect.includes_line_items
        );

        Response::builder()
            .status(StatusCode::FOUND)
            .header(LOCATION, redirect.url.as_str())
            .body(())
            .map_err(|e| AppError::invalid_url(redirect.url.as_str(), e.to_string()))
    }

    async fn verify_pdt(
        &self,
        transaction_token: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse> {
        self.verifier
            .verify_pdt(&self.settings.pdt_token, transaction_token, user_agent)
            .await
    }

    async fn verify_ipn(
        &self,
        form_body: &str,
        user_agent: Option<&str>,
    ) -> AppResult<CallbackResponse> {
        self.verifier.verify_ipn(form_body, user_agent).await
    }

    fn hide_payment_method(&self, _cart: &[OrderItem]) -> bool {
        false
    }

    fn additional_handling_fee(&self, cart_total: Decimal) -> Decimal {
        let fee = self.settings.additional_fee;
        if fee <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        if self.settings.additional_fee_percentage {
            self.settings
                .rounding
                .round(cart_total * fee / Decimal::ONE_HUNDRED)
        } else {
            fee
        }
    }

    fn capture(&self, _order: &OrderSnapshot) -> OperationResult {
        OperationResult::failed(CAPTURE_NOT_SUPPORTED)
    }

    fn refund(&self, _order: &OrderSnapshot, _amount: Decimal) -> OperationResult {
        OperationResult::failed(REFUND_NOT_SUPPORTED)
    }

    fn void(&self, _order: &OrderSnapshot) -> OperationResult {
        OperationResult::failed(VOID_NOT_SUPPORTED)
    }

    fn process_recurring_payment(&self, _order: &OrderSnapshot) -> OperationResult {
        OperationResult::failed(RECURRING_NOT_SUPPORTED)
    }

    fn cancel_recurring_payment(&self, _order: &OrderSnapshot) -> OperationResult {
        OperationResult::failed(RECURRING_NOT_SUPPORTED)
    }

    fn can_repost_process_payment(&self, order: &OrderSnapshot, now: DateTime<Utc>) -> bool {
        now - order.created_on_utc >= ChronoDuration::seconds(REPOST_DELAY_SECS)
    }

    fn validate_payment_form(&self, _form: &HashMap<String, String>) -> Vec<String> {
        Vec::new()
    }

    fn payment_info(&self, _form: &HashMap<String, String>) -> PaymentInfo {
        PaymentInfo::default()
    }

    fn capabilities(&self) -> PaymentCapabilities {
        PaymentCapabilities {
            supports_capture: false,
            supports_partial_refund: false,
            supports_refund: false,
            supports_void: false,
            recurring_payment_type: RecurringPaymentType::NotSupported,
            payment_method_type: PaymentMethodType::Redirection,
            skip_payment_info: false,
        }
    }

    fn configuration_page_url(&self) -> String {
        request::store_route(&self.store.store_url, CONFIGURE_PATH)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.store.store_url, CONFIGURE_PATH))
    }

    fn public_view_component_name(&self) -> &'static str {
        VIEW_COMPONENT_NAME
    }

    fn payment_method_description(&self) -> &'static str {
        PAYMENT_METHOD_DESCRIPTION
    }
}
