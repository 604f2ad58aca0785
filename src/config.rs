use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Connection-info keys as the host presents them.
pub mod keys {
    pub const API_KEY: &str = "APIKey";
    pub const REGION: &str = "Region";
    pub const DIVISION_ID: &str = "DivisionId";
    pub const LIFETIME: &str = "LifetimeDays";
    pub const CA_CERT_ID: &str = "CACertId";
    pub const PAYMENT_METHOD: &str = "PaymentMethod";
}

/// Per-request attribute names the host may supply alongside a template.
pub mod attributes {
    pub const ORGANIZATION_NAME: &str = "Organization-Name";
    pub const DCV_METHOD: &str = "DCV-Method";
    pub const PRIOR_CERT_SN: &str = "PriorCertSN";
}

/// The one product type that carries no organization.
pub const DV_SSL_PRODUCT: &str = "dv_ssl_certificate";

/// Account region; selects the API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Region::Us => "https://www.digicert.com/",
            Region::Eu => "https://www.digicert.eu/",
        }
    }

    pub fn parse(raw: &str) -> Option<Region> {
        match raw.to_uppercase().as_str() {
            "US" => Some(Region::Us),
            "EU" => Some(Region::Eu),
            _ => None,
        }
    }
}

/// Domain control validation method sent with new orders. The host
/// platform currently only supports retrieving email-based validation, so
/// `Email` is the working default; the other methods are wired through the
/// same configuration point for when host support lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DcvMethod {
    #[default]
    Email,
    DnsTxtToken,
    HttpToken,
}

impl DcvMethod {
    pub fn wire_value(&self) -> &'static str {
        match self {
            DcvMethod::Email => "email",
            DcvMethod::DnsTxtToken => "dns-txt-token",
            DcvMethod::HttpToken => "http-token",
        }
    }
}

/// Connector configuration as loaded by the host at initialize time.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GatewayConfig {
    pub api_key: String,
    /// Lesser credential for calls made on behalf of a requestor rather
    /// than the account admin.
    pub api_requestor_key: Option<String>,
    #[serde(default)]
    pub region: Region,
    /// Division/container scope for product detail lookups, when the
    /// account uses per-division product settings.
    pub division_id: Option<i32>,
    /// "balance" or "card"; absent means the account default applies.
    pub payment_method: Option<String>,
    /// Revoke individual certificates instead of whole orders.
    #[serde(default)]
    pub revoke_certificate_only: bool,
    #[serde(default)]
    pub dcv_method: DcvMethod,
    /// Overrides the region-derived endpoint; used by tests and
    /// private-instance deployments.
    pub endpoint: Option<String>,
}

impl GatewayConfig {
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| self.region.endpoint().to_string())
    }

    /// Wire value for the configured payment method. "card" accounts pay
    /// through a stored profile on the CA side.
    pub fn payment_method_wire(&self) -> Option<String> {
        self.payment_method.as_ref().map(|method| {
            if method.eq_ignore_ascii_case("card") {
                "profile".to_string()
            } else {
                method.to_lowercase()
            }
        })
    }
}

/// Checks host-supplied connection info and collects every problem found,
/// so the caller sees all of them in one pass.
pub fn collect_connection_info_errors(info: &HashMap<String, String>) -> Vec<String> {
    let mut errors = Vec::new();

    let api_key = info.get(keys::API_KEY).map(String::as_str).unwrap_or("");
    if api_key.trim().is_empty() {
        errors.push("The API Key is required.".to_string());
    }

    if let Some(region) = info.get(keys::REGION) {
        if Region::parse(region).is_none() {
            errors.push("Region must be one of the following values if provided: US,EU".to_string());
        }
    }

    if let Some(payment) = info.get(keys::PAYMENT_METHOD) {
        let valid = ["BALANCE", "CARD"];
        if payment.trim().is_empty() || !valid.contains(&payment.to_uppercase().as_str()) {
            errors.push(
                "PaymentMethod must be one of the following values if provided: BALANCE,CARD"
                    .to_string(),
            );
        }
    }

    errors
}
