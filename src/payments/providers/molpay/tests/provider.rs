use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use http::{header::LOCATION, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use crate::config::MolPaySettings;
use crate::error::{AppErrorKind, AppResult, ValidationError};
use crate::payments::providers::molpay::{MolPayProvider, ORDER_TOTAL_SENT_KEY};
use crate::payments::traits::{OrderAttributeStore, OrderLookups, PaymentMethod};
use crate::payments::types::{
    Address, CheckoutAttributeValue, GatewayOutcome, OrderItem, OrderSnapshot, PaymentMethodType,
    PaymentStatus, RecurringPaymentType, StoreContext,
};

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

struct Catalog;

impl OrderLookups for Catalog {
    fn country_iso_code(&self, _: &str) -> Option<String> {
        Some("MY".to_string())
    }

    fn state_abbreviation(&self, _: &str) -> Option<String> {
        None
    }

    fn product_name(&self, product_id: &str) -> Option<String> {
        Some(format!("Product {}", product_id))
    }

    fn checkout_attribute_name(&self, _: &str) -> Option<String> {
        None
    }

    fn checkout_attribute_price(&self, value: &CheckoutAttributeValue, _: &str) -> Decimal {
        value.price_adjustment
    }
}

#[derive(Default)]
struct MemoryAttributes {
    values: Mutex<HashMap<(String, String), Decimal>>,
}

impl OrderAttributeStore for MemoryAttributes {
    fn save_decimal(&self, order_id: &str, key: &str, value: Decimal) -> AppResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert((order_id.to_string(), key.to_string()), value);
        Ok(())
    }

    fn get_decimal(&self, order_id: &str, key: &str) -> AppResult<Option<Decimal>> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get(&(order_id.to_string(), key.to_string()))
            .copied())
    }
}

fn settings() -> MolPaySettings {
    MolPaySettings {
        merchant_id: "shopmy".to_string(),
        vkey: SecretString::new("vkey-123".to_string()),
        pdt_token: SecretString::new("pdt-456".to_string()),
        ..Default::default()
    }
}

fn provider_with(settings: MolPaySettings) -> (MolPayProvider, Arc<MemoryAttributes>) {
    let attributes = Arc::new(MemoryAttributes::default());
    let store = StoreContext {
        store_url: Url::parse("https://shop.example.com/").unwrap(),
        primary_currency_code: "MYR".to_string(),
    };
    let provider =
        MolPayProvider::new(settings, store, Arc::new(Catalog), attributes.clone()).unwrap();
    (provider, attributes)
}

fn order() -> OrderSnapshot {
    OrderSnapshot {
        id: "order-1".to_string(),
        order_number: 7,
        order_guid: Uuid::new_v4(),
        customer_id: "cust-1".to_string(),
        created_on_utc: Utc::now(),
        order_total: dec("50.00"),
        order_shipping_excl_tax: Decimal::ZERO,
        payment_method_additional_fee_excl_tax: Decimal::ZERO,
        order_tax: Decimal::ZERO,
        billing_address: Some(Address {
            first_name: Some("Siti".to_string()),
            last_name: Some("Rahman".to_string()),
            ..Default::default()
        }),
        shipping_address: None,
        items: vec![OrderItem {
            product_id: "p1".to_string(),
            quantity: 1,
            unit_price_excl_tax: dec("55.00"),
            price_excl_tax: dec("55.00"),
        }],
        checkout_attributes: Vec::new(),
        payment_method_system_name: "Payments.MOLPay".to_string(),
    }
}

#[test]
fn test_post_process_payment_redirects_and_persists_amount() {
    let (provider, attributes) = provider_with(settings());

    let response = provider.post_process_payment(&order()).unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[LOCATION].to_str().unwrap();
    assert!(location.starts_with("https://sandbox.molpay.com/MOLPay/pay/shopmy?"));
    assert!(location.contains("amount=50.00"));
    assert!(location.contains("cmd=_xclick"));
    assert_eq!(
        attributes.get_decimal("order-1", ORDER_TOTAL_SENT_KEY).unwrap(),
        Some(dec("50.00"))
    );
}

#[test]
fn test_post_process_payment_with_line_items_records_cart_total() {
    let (provider, attributes) = provider_with(MolPaySettings {
        pass_product_names_and_totals: true,
        ..settings()
    });

    let response = provider.post_process_payment(&order()).unwrap();
    let location = response.headers()[LOCATION].to_str().unwrap();

    assert!(location.contains("item_name_1=Product+p1"));
    assert!(location.contains("discount_amount_cart=5.00"));
    assert_eq!(
        attributes.get_decimal("order-1", ORDER_TOTAL_SENT_KEY).unwrap(),
        Some(dec("50.00"))
    );
}

#[test]
fn test_missing_credentials_fail_before_redirect() {
    let (provider, attributes) = provider_with(MolPaySettings {
        vkey: SecretString::new(String::new()),
        ..settings()
    });

    let err = provider.post_process_payment(&order()).unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(
        attributes.get_decimal("order-1", ORDER_TOTAL_SENT_KEY).unwrap(),
        None
    );
}

#[test]
fn test_unresolved_checkout_attribute_persists_nothing() {
    let (provider, attributes) = provider_with(MolPaySettings {
        pass_product_names_and_totals: true,
        ..settings()
    });
    let mut order = order();
    order.checkout_attributes.push(CheckoutAttributeValue {
        checkout_attribute_id: "a".to_string(),
        name: "Gift note".to_string(),
        price_adjustment: dec("3.00"),
    });

    let err = provider.post_process_payment(&order).unwrap_err();
    assert_eq!(
        err.kind,
        AppErrorKind::Validation(ValidationError::LookupFailed {
            entity: "Checkout attribute".to_string(),
            id: "a".to_string(),
        })
    );
    assert_eq!(
        attributes.get_decimal("order-1", ORDER_TOTAL_SENT_KEY).unwrap(),
        None
    );
}

#[tokio::test]
async fn test_missing_pdt_token_fails_without_network() {
    let (provider, _) = provider_with(MolPaySettings {
        pdt_token: SecretString::new(String::new()),
        // Unroutable: a network attempt would surface as a gateway error instead.
        pdt_url: Some("http://127.0.0.1:9/".to_string()),
        ..settings()
    });

    let err = provider.verify_pdt("TX-1", Some("Mozilla/5.0")).await.unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_unsupported_operations_report_fixed_messages() {
    let (provider, _) = provider_with(settings());
    let order = order();

    assert_eq!(provider.capture(&order).errors, vec!["Capture method not supported"]);
    assert_eq!(
        provider.refund(&order, dec("10.00")).errors,
        vec!["Refund method not supported"]
    );
    assert_eq!(provider.void(&order).errors, vec!["Void method not supported"]);
    assert_eq!(
        provider.process_recurring_payment(&order).errors,
        vec!["Recurring payment not supported"]
    );
    assert_eq!(
        provider.cancel_recurring_payment(&order).errors,
        vec!["Recurring payment not supported"]
    );
    assert!(provider.process_payment(&order).is_success());
}

#[test]
fn test_capabilities() {
    let (provider, _) = provider_with(settings());
    let caps = provider.capabilities();

    assert!(!caps.supports_capture);
    assert!(!caps.supports_partial_refund);
    assert!(!caps.supports_refund);
    assert!(!caps.supports_void);
    assert!(!caps.skip_payment_info);
    assert_eq!(caps.recurring_payment_type, RecurringPaymentType::NotSupported);
    assert_eq!(caps.payment_method_type, PaymentMethodType::Redirection);
    assert_eq!(provider.public_view_component_name(), "MOLPay");
    assert_eq!(
        provider.configuration_page_url(),
        "https://shop.example.com/Admin/MOLPay/Configure"
    );
    assert!(!provider.hide_payment_method(&order().items));
    assert!(provider.validate_payment_form(&HashMap::new()).is_empty());
    assert!(provider.payment_info(&HashMap::new()).custom_values.is_empty());
}

#[test]
fn test_fixed_additional_fee() {
    let (provider, _) = provider_with(MolPaySettings {
        additional_fee: dec("2.50"),
        ..settings()
    });
    assert_eq!(provider.additional_handling_fee(dec("80.00")), dec("2.50"));
}

#[test]
fn test_percentage_additional_fee() {
    let (provider, _) = provider_with(MolPaySettings {
        additional_fee: dec("1.5"),
        additional_fee_percentage: true,
        ..settings()
    });
    assert_eq!(provider.additional_handling_fee(dec("80.30")), dec("1.20"));
}

#[test]
fn test_no_fee_when_unset() {
    let (provider, _) = provider_with(settings());
    assert_eq!(provider.additional_handling_fee(dec("80.00")), Decimal::ZERO);
}

#[test]
fn test_repost_requires_five_seconds() {
    let (provider, _) = provider_with(settings());
    let order = order();

    assert!(!provider.can_repost_process_payment(&order, order.created_on_utc + Duration::seconds(4)));
    assert!(provider.can_repost_process_payment(&order, order.created_on_utc + Duration::seconds(5)));
}

#[test]
fn test_status_mapping_follows_settings() {
    let (provider, _) = provider_with(MolPaySettings {
        captured_mode: PaymentStatus::Authorized,
        ..settings()
    });

    assert_eq!(provider.map_status(GatewayOutcome::Captured), PaymentStatus::Authorized);
    assert_eq!(provider.map_status(GatewayOutcome::Pending), PaymentStatus::Pending);
    assert_eq!(provider.map_status(GatewayOutcome::Failed), PaymentStatus::Voided);
}

#[test]
fn test_order_total_validation() {
    let (provider, attributes) = provider_with(settings());

    assert!(!provider.validate_order_total("order-1", dec("50.00")).unwrap());

    attributes
        .save_decimal("order-1", ORDER_TOTAL_SENT_KEY, dec("50.00"))
        .unwrap();
    assert!(provider.validate_order_total("order-1", dec("50.00")).unwrap());
    assert!(provider.validate_order_total("order-1", dec("50.001")).unwrap());
    assert!(!provider.validate_order_total("order-1", dec("49.99")).unwrap());
}

#[test]
fn test_order_total_validation_can_be_disabled() {
    let (provider, _) = provider_with(MolPaySettings {
        pdt_validate_order_total: false,
        ..settings()
    });
    assert!(provider.validate_order_total("unknown", dec("1.00")).unwrap());
}

#[test]
fn test_invalid_settings_are_rejected() {
    let store = StoreContext {
        store_url: Url::parse("https://shop.example.com/").unwrap(),
        primary_currency_code: "MYR".to_string(),
    };
    let result = MolPayProvider::new(
        MolPaySettings {
            request_timeout_secs: 0,
            ..settings()
        },
        store,
        Arc::new(Catalog),
        Arc::new(MemoryAttributes::default()),
    );
    assert!(result.err().expect("zero timeout must be rejected").is_configuration());
}
