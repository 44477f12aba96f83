use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::AppResult;
use crate::payments::types::{AmountRounding, MerchantCredentials, PaymentStatus};

pub const SANDBOX_PAY_URL: &str = "https://sandbox.molpay.com/MOLPay/pay/";
pub const LIVE_PAY_URL: &str = "https://www.onlinepayment.com.my/MOLPay/pay/";
pub const SANDBOX_IPN_URL: &str = "https://ipnpb.sandbox.paypal.com/cgi-bin/webscr";
pub const LIVE_IPN_URL: &str = "https://ipnpb.paypal.com/cgi-bin/webscr";

const ENV_PREFIX: &str = "MOLPAY";

/// Plugin settings as stored by the host
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MolPaySettings {
    pub use_sandbox: bool,
    pub merchant_id: String,
    /// Shared secret used to sign redirect requests
    pub vkey: SecretString,
    /// PDT identity token
    pub pdt_token: SecretString,
    pub captured_mode: PaymentStatus,
    pub pending_mode: PaymentStatus,
    pub failed_mode: PaymentStatus,
    pub additional_fee: Decimal,
    pub additional_fee_percentage: bool,
    pub pass_product_names_and_totals: bool,
    pub pdt_validate_order_total: bool,
    pub request_timeout_secs: u64,
    pub rounding: AmountRounding,
    /// Overrides the PDT confirmation endpoint
    pub pdt_url: Option<String>,
    /// Overrides the IPN validation endpoint
    pub ipn_url: Option<String>,
}

impl Default for MolPaySettings {
    fn default() -> Self {
        Self {
            use_sandbox: true,
            merchant_id: String::new(),
            vkey: SecretString::new(String::new()),
            pdt_token: SecretString::new(String::new()),
            captured_mode: PaymentStatus::Paid,
            pending_mode: PaymentStatus::Pending,
            failed_mode: PaymentStatus::Voided,
            additional_fee: Decimal::ZERO,
            additional_fee_percentage: false,
            pass_product_names_and_totals: false,
            pdt_validate_order_total: true,
            request_timeout_secs: 10,
            rounding: AmountRounding::default(),
            pdt_url: None,
            ipn_url: None,
        }
    }
}

impl MolPaySettings {
    /// Load settings from `MOLPAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load settings from an optional file, overridden by `MOLPAY_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        Self::from_builder(builder)
    }

    fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: MolPaySettings = builder
            .build()
            .context("Failed to read MOLPay settings")?
            .try_deserialize()
            .context("MOLPay settings are malformed")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }

        if self.additional_fee < Decimal::ZERO {
            return Err(anyhow!(
                "additional_fee cannot be negative, got {}",
                self.additional_fee
            ));
        }

        for (name, value) in [("pdt_url", &self.pdt_url), ("ipn_url", &self.ipn_url)] {
            if let Some(value) = value {
                Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
            }
        }

        Ok(())
    }

    /// Hosted payment page base for the selected environment
    pub fn pay_url(&self) -> &str {
        if self.use_sandbox {
            SANDBOX_PAY_URL
        } else {
            LIVE_PAY_URL
        }
    }

    pub fn pdt_url(&self) -> &str {
        self.pdt_url.as_deref().unwrap_or_else(|| self.pay_url())
    }

    pub fn ipn_url(&self) -> &str {
        self.ipn_url.as_deref().unwrap_or(if self.use_sandbox {
            SANDBOX_IPN_URL
        } else {
            LIVE_IPN_URL
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Merchant id and vkey, failing when either is missing
    pub fn credentials(&self) -> AppResult<MerchantCredentials> {
        MerchantCredentials::new(
            self.merchant_id.clone(),
            SecretString::new(self.vkey.expose_secret().clone()),
        )
    }
}
