//! Redirect request construction
//!
//! Turns an order into the signed query parameters of the hosted payment page
//! redirect. Nothing here performs I/O; the provider persists the amount and
//! issues the redirect.

use super::signature::vcode;
use crate::error::{AppError, AppResult};
use crate::payments::traits::OrderLookups;
use crate::payments::types::{
    format_amount, AmountRounding, MerchantCredentials, OrderSnapshot,
};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use url::Url;

/// Longest redirect URL the gateway and browsers reliably accept
pub const MAX_REDIRECT_URL_LENGTH: usize = 2048;

pub const LANGUAGE_CODE: &str = "en";
pub const RETURN_PATH: &str = "Plugins/MOLPay/PDTHandler";
pub const CALLBACK_PATH: &str = "Plugins/MOLPay/IPNHandler";

const SHIPPING_FEE_ITEM: &str = "Shipping fee";
const PAYMENT_FEE_ITEM: &str = "Payment method fee";
const TAX_ITEM: &str = "Tax amount";

/// Ordered query parameters of a redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectRequest {
    parameters: IndexMap<String, String>,
}

impl RedirectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter, keeping its first position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop every parameter whose value is empty.
    pub fn strip_empty(&mut self) {
        self.parameters.retain(|_, value| !value.is_empty());
    }

    /// Append the parameters to `base` as a form-urlencoded query string.
    pub fn to_url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut().extend_pairs(self.iter());
        url
    }
}

/// Everything the builder needs besides host lookups
#[derive(Debug, Clone, Copy)]
pub struct RedirectContext<'a> {
    pub order: &'a OrderSnapshot,
    pub credentials: &'a MerchantCredentials,
    pub currency_code: &'a str,
    pub store_url: &'a Url,
    /// Hosted payment page base; the merchant id is appended to it
    pub gateway_url: &'a str,
    pub rounding: AmountRounding,
    pub pass_line_items: bool,
}

/// A redirect ready to be issued
#[derive(Debug, Clone)]
pub struct BuiltRedirect {
    pub parameters: RedirectRequest,
    pub url: Url,
    /// Amount to persist as "amount sent to gateway"
    pub amount_sent: Decimal,
    pub includes_line_items: bool,
}

/// Shipping destination codes resolved from the order's shipping address
///
/// Only `country_code` is a MOLPay parameter. `state_code` is resolved for
/// hosts that build their own gateway requests from the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingDestination {
    pub country_code: String,
    pub state_code: String,
}

pub fn resolve_destination(order: &OrderSnapshot, lookups: &dyn OrderLookups) -> ShippingDestination {
    let Some(address) = order.shipping_address.as_ref() else {
        return ShippingDestination::default();
    };

    let country_code = address
        .country_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .and_then(|id| lookups.country_iso_code(id))
        .unwrap_or_default();
    let state_code = address
        .state_province_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .and_then(|id| lookups.state_abbreviation(id))
        .unwrap_or_default();

    ShippingDestination {
        country_code,
        state_code,
    }
}

/// Resolve `path` against the store URL, tolerating a missing trailing slash.
pub fn store_route(store_url: &Url, path: &str) -> AppResult<Url> {
    let mut base = store_url.clone();
    if !base.path().ends_with('/') {
        let path_with_slash = format!("{}/", base.path());
        base.set_path(&path_with_slash);
    }
    base.join(path)
        .map_err(|e| AppError::invalid_url(store_url.as_str(), e.to_string()))
}

/// Gateway URL for a merchant: `{gateway_url}{merchant_id}`.
pub fn gateway_endpoint(gateway_url: &str, merchant_id: &str) -> AppResult<Url> {
    let raw = format!("{}{}", gateway_url, merchant_id);
    Url::parse(&raw).map_err(|e| AppError::invalid_url(raw, e.to_string()))
}

/// Parameters every redirect carries.
pub fn common_parameters(
    ctx: &RedirectContext<'_>,
    lookups: &dyn OrderLookups,
) -> AppResult<RedirectRequest> {
    let order = ctx.order;
    let destination = resolve_destination(order, lookups);

    let amount = format_amount(ctx.rounding.round(order.order_total));
    let order_id = order.order_number.to_string();
    let merchant_id = ctx.credentials.merchant_id();
    let signature = vcode(&amount, merchant_id, &order_id, ctx.credentials.vkey());

    let billing = order.billing_address.clone().unwrap_or_default();
    let bill_name = format!(
        "{} {}",
        billing.first_name.unwrap_or_default(),
        billing.last_name.unwrap_or_default()
    );
    let bill_desc = format!(
        "{} {}",
        billing.address1.unwrap_or_default(),
        billing.address2.unwrap_or_default()
    );

    let mut parameters = RedirectRequest::new();
    parameters.insert("status", "true");
    parameters.insert("merchant_id", merchant_id);
    parameters.insert("amount", amount);
    parameters.insert("orderid", order_id);
    parameters.insert("bill_name", bill_name);
    parameters.insert("bill_email", billing.email.unwrap_or_default());
    parameters.insert("bill_mobile", billing.phone_number.unwrap_or_default());
    parameters.insert("bill_desc", bill_desc);
    parameters.insert("country", destination.country_code);
    parameters.insert("vcode", signature);
    parameters.insert("currency", ctx.currency_code);
    parameters.insert("channel", order.payment_method_system_name.as_str());
    parameters.insert("langcode", LANGUAGE_CODE);
    parameters.insert("returnurl", store_route(ctx.store_url, RETURN_PATH)?.as_str());
    parameters.insert("callbackurl", store_route(ctx.store_url, CALLBACK_PATH)?.as_str());

    Ok(parameters)
}

/// Append one named line item per order component.
///
/// Returns the amount to persist: the rounded sum of all components, less
/// the cart discount when the raw sum exceeds the order total.
pub fn add_line_items(
    parameters: &mut RedirectRequest,
    ctx: &RedirectContext<'_>,
    lookups: &dyn OrderLookups,
) -> AppResult<Decimal> {
    let order = ctx.order;
    let round = |amount: Decimal| ctx.rounding.round(amount);

    parameters.insert("cmd", "_cart");
    parameters.insert("upload", "1");

    let mut cart_total = Decimal::ZERO;
    let mut rounded_cart_total = Decimal::ZERO;
    let mut item_count = 1;

    for item in &order.items {
        let name = lookups
            .product_name(&item.product_id)
            .ok_or_else(|| {
                AppError::lookup_failed("Product", &item.product_id)
                    .with_context(format!("order {}", order.order_number))
            })?;

        parameters.insert(format!("item_name_{}", item_count), name);

        cart_total += item.price_excl_tax;
        rounded_cart_total += round(item.unit_price_excl_tax) * Decimal::from(item.quantity);
        item_count += 1;
    }

    for value in &order.checkout_attributes {
        let price = lookups.checkout_attribute_price(value, &order.customer_id);
        if price <= Decimal::ZERO {
            continue;
        }

        let name = lookups
            .checkout_attribute_name(&value.checkout_attribute_id)
            .ok_or_else(|| {
                AppError::lookup_failed("Checkout attribute", &value.checkout_attribute_id)
                    .with_context(format!("order {}", order.order_number))
            })?;

        parameters.insert(format!("item_name_{}", item_count), name);

        cart_total += price;
        rounded_cart_total += round(price);
        item_count += 1;
    }

    let fees = [
        (SHIPPING_FEE_ITEM, order.order_shipping_excl_tax),
        (PAYMENT_FEE_ITEM, order.payment_method_additional_fee_excl_tax),
        (TAX_ITEM, order.order_tax),
    ];
    for (name, amount) in fees {
        let rounded = round(amount);
        if rounded > Decimal::ZERO {
            parameters.insert(format!("item_name_{}", item_count), name);

            cart_total += amount;
            rounded_cart_total += rounded;
            item_count += 1;
        }
    }

    // Gift cards and reward points reduce the total upstream of the line items.
    if cart_total > order.order_total {
        let discount = round(cart_total - order.order_total);
        rounded_cart_total -= discount;
        parameters.insert("discount_amount_cart", format_amount(discount));
    }

    Ok(rounded_cart_total)
}

/// Build the redirect for an order.
///
/// With line items enabled the itemised request is used when its URL fits
/// in [`MAX_REDIRECT_URL_LENGTH`]; otherwise, and when line items are
/// disabled, only the order total is sent.
pub fn build_redirect_request(
    ctx: &RedirectContext<'_>,
    lookups: &dyn OrderLookups,
) -> AppResult<BuiltRedirect> {
    let endpoint = gateway_endpoint(ctx.gateway_url, ctx.credentials.merchant_id())?;
    let common = common_parameters(ctx, lookups)?;

    if ctx.pass_line_items {
        let mut itemised = common.clone();
        let amount_sent = add_line_items(&mut itemised, ctx, lookups)?;
        itemised.strip_empty();

        let url = itemised.to_url(&endpoint);
        if url.as_str().len() <= MAX_REDIRECT_URL_LENGTH {
            debug!(
                "Built itemised MOLPay redirect for order {} ({} parameters)",
                ctx.order.order_number,
                itemised.len()
            );
            return Ok(BuiltRedirect {
                parameters: itemised,
                url,
                amount_sent,
                includes_line_items: true,
            });
        }

        warn!(
            "Itemised redirect for order {} is {} characters long, sending order total only",
            ctx.order.order_number,
            url.as_str().len()
        );
    }

    let mut parameters = common;
    parameters.insert("cmd", "_xclick");
    parameters.strip_empty();

    let url = parameters.to_url(&endpoint);
    Ok(BuiltRedirect {
        parameters,
        url,
        amount_sent: ctx.rounding.round(ctx.order.order_total),
        includes_line_items: false,
    })
}
