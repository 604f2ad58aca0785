//! Product catalog cache.
//!
//! Builds the account's certificate-product list once and keeps it for
//! the life of the handle. Individual detail lookups that fail are
//! skipped with a warning rather than failing the whole build; the
//! product list itself failing is fatal.

use std::sync::Mutex;

use log::{debug, error, trace, warn};

use crate::api::products::{ProductDetailsRequest, ProductListRequest};
use crate::client::CertCentralClient;
use crate::error::ConnectorError;

/// Product types for which enrollment through the gateway is not
/// supported. Fixed set, keyed by display name.
pub const UNSUPPORTED_PRODUCT_NAMES: [&str; 14] = [
    "Document Signing - Organization (2000)",
    "Document Signing - Organization (5000)",
    "Code Signing",
    "EV Code Signing",
    "Premium SHA256",
    "Premium",
    "Email Security Plus",
    "Email Security Plus SHA256",
    "Digital Signature Plus",
    "Digital Signature Plus SHA256",
    "Grid Premium",
    "Grid Robot FQDN",
    "Grid Robot Name",
    "Grid Robot Email",
];

/// One certificate product and the constraints that matter to
/// enrollment.
#[derive(Debug, Clone)]
pub struct ProductType {
    /// The CA's `name_id`; what the host calls the product id.
    pub product_code: String,
    pub short_name: String,
    /// Short name plus an "(Enrollment Unavailable)" marker for denylisted
    /// products.
    pub display_name: String,
    pub product_kind: String,
    pub signature_algorithm: Option<String>,
    /// Whether the product accepts additional DNS SANs.
    pub multidomain: bool,
    pub allowed_validity_years: Vec<i32>,
    pub allowed_hash_types: Vec<String>,
    pub enrollment_unavailable: bool,
}

/// Lazily-populated, handle-owned catalog. Cleared only via [`clear`];
/// concurrent first-population may duplicate the fetch, which is benign
/// (last write wins).
///
/// [`clear`]: ProductCatalog::clear
#[derive(Default)]
pub struct ProductCatalog {
    types: Mutex<Vec<ProductType>>,
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all product types, fetching them on first use.
    pub fn all_types(
        &self,
        client: &CertCentralClient,
        division_id: Option<i32>,
    ) -> Result<Vec<ProductType>, ConnectorError> {
        {
            let cached = self.types.lock().expect("catalog lock poisoned");
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let fetched = retrieve_product_types(client, division_id)?;
        let mut cached = self.types.lock().expect("catalog lock poisoned");
        if cached.is_empty() {
            *cached = fetched;
        }
        Ok(cached.clone())
    }

    /// Finds a product by its code, populating the catalog if needed.
    pub fn find(
        &self,
        client: &CertCentralClient,
        division_id: Option<i32>,
        product_code: &str,
    ) -> Result<Option<ProductType>, ConnectorError> {
        Ok(self
            .all_types(client, division_id)?
            .into_iter()
            .find(|t| t.product_code.eq_ignore_ascii_case(product_code)))
    }

    pub fn clear(&self) {
        self.types.lock().expect("catalog lock poisoned").clear();
    }
}

fn retrieve_product_types(
    client: &CertCentralClient,
    division_id: Option<i32>,
) -> Result<Vec<ProductType>, ConnectorError> {
    let list = client
        .product_list()?
        .into_payload("failed to list product types")?;
    debug!("[catalog] Found {} product types", list.products.len());

    let mut types = Vec::new();
    for product in &list.products {
        trace!("[catalog] Retrieving details for product type {}", product.name_id);
        let details = match client
            .product_details(&ProductDetailsRequest::new(&product.name_id, division_id))
        {
            Ok(envelope) if !envelope.is_error() => match envelope.payload() {
                Some(details) => details.clone(),
                None => continue,
            },
            Ok(envelope) => {
                error!(
                    "[catalog] Unable to retrieve details for product type {}. Skipping...",
                    product.name_id
                );
                trace!(
                    "[catalog] Detail retrieval error: {}",
                    envelope.error_summary()
                );
                continue;
            }
            Err(err) => {
                warn!(
                    "[catalog] Detail lookup for {} failed in transit: {}. Skipping...",
                    product.name_id, err
                );
                continue;
            }
        };

        let unavailable = UNSUPPORTED_PRODUCT_NAMES.contains(&details.name.as_str());
        let display_name = if unavailable {
            format!("{} (Enrollment Unavailable)", details.name)
        } else {
            details.name.clone()
        };
        types.push(ProductType {
            product_code: details.name_id.clone(),
            short_name: details.name.clone(),
            display_name,
            product_kind: details.kind.clone(),
            signature_algorithm: if details.signature_hash_types.default_hash_type_id.is_empty() {
                None
            } else {
                Some(details.signature_hash_types.default_hash_type_id.clone())
            },
            multidomain: details.additional_dns_names_allowed,
            allowed_validity_years: details.allowed_validity_years.clone(),
            allowed_hash_types: details
                .signature_hash_types
                .allowed_hash_types
                .iter()
                .map(|h| h.id.clone())
                .collect(),
            enrollment_unavailable: unavailable,
        });
    }
    Ok(types)
}
