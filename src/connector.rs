//! The plugin contract surface the host drives: initialize, ping,
//! validation, enrollment, single-record retrieval, revocation, and
//! synchronization.

use std::collections::HashMap;

use log::{debug, error, trace};

use crate::api::account::ListDomainsRequest;
use crate::api::orders::{RevokeCertificateRequest, RevokeOrderRequest, UpdateRequestStatusRequest};
use crate::api::products::ProductDetailsRequest;
use crate::cancel::CancellationToken;
use crate::catalog::ProductCatalog;
use crate::client::CertCentralClient;
use crate::config::{GatewayConfig, Region, collect_connection_info_errors, keys};
use crate::enroll::{DcvTokenCache, EnrollmentContext, enroll};
use crate::error::ConnectorError;
use crate::record::{
    CertificateDataReader, CertificateRecord, EnrollmentOutcome, EnrollmentType, ProductInfo,
    RecordSink, SyncInfo, parse_ca_request_id, revoke_reason_comment,
};
use crate::status::{Disposition, order_status};
use crate::sync;

pub struct CertCentralConnector {
    config: GatewayConfig,
    client: CertCentralClient,
    catalog: ProductCatalog,
    dcv_tokens: DcvTokenCache,
}

impl CertCentralConnector {
    /// Builds a connector from host configuration. Fails fast on
    /// configuration the gateway cannot operate with.
    pub fn initialize(config: GatewayConfig) -> Result<Self, ConnectorError> {
        if config.api_key.trim().is_empty() {
            return Err(ConnectorError::InvalidConfig(
                "The API Key is required.".to_string(),
            ));
        }
        let client = CertCentralClient::from_config(&config);
        Ok(Self {
            config,
            client,
            catalog: ProductCatalog::new(),
            dcv_tokens: DcvTokenCache::default(),
        })
    }

    /// Test seam: same connector over an injected client.
    pub fn with_client(config: GatewayConfig, client: CertCentralClient) -> Self {
        Self {
            config,
            client,
            catalog: ProductCatalog::new(),
            dcv_tokens: DcvTokenCache::default(),
        }
    }

    /// Reaches the CA over the network; any failure is surfaced.
    pub fn ping(&self) -> Result<(), ConnectorError> {
        debug!("[connector] Attempting to ping the CA API");
        let response = self
            .client
            .list_domains(&ListDomainsRequest::default())
            .map_err(|e| {
                error!("[connector] There was an error contacting the CA: {e}");
                ConnectorError::Unavailable(e)
            })?;
        if response.is_error() {
            return Err(ConnectorError::Operation(format!(
                "Error attempting to ping the CA: {}",
                response.error_summary()
            )));
        }
        debug!("[connector] Successfully pinged the CA API");
        Ok(())
    }

    /// Checks host-supplied connection info, collecting every problem so
    /// the caller sees them all in one pass. A live domain listing
    /// validates that the key actually works.
    pub fn validate_connection_info(&self, info: &HashMap<String, String>) -> Vec<String> {
        let mut errors = collect_connection_info_errors(info);

        let api_key = info.get(keys::API_KEY).cloned().unwrap_or_default();
        let region = info
            .get(keys::REGION)
            .and_then(|r| Region::parse(r))
            .unwrap_or_default();
        let probe_config = GatewayConfig {
            api_key,
            region,
            // The connector's endpoint override also governs probes, so
            // validation exercises the same host the gateway will use.
            endpoint: self.config.endpoint.clone(),
            ..Default::default()
        };
        let probe = CertCentralClient::from_config(&probe_config);
        match probe.list_domains(&ListDomainsRequest::default()) {
            Ok(response) if !response.is_error() => {}
            Ok(response) => {
                error!(
                    "[connector] Error from CA validating connection: {}",
                    response.first_error_message()
                );
                errors.push("Error grabbing CA domains".to_string());
            }
            Err(err) => {
                error!("[connector] Error contacting CA during validation: {err}");
                errors.push("Error grabbing CA domains".to_string());
            }
        }
        errors
    }

    /// Validates that a product id exists for this account and that its
    /// details are retrievable under the configured division.
    pub fn validate_product_info(
        &self,
        product_info: &ProductInfo,
        connection_info: &HashMap<String, String>,
    ) -> Result<(), ConnectorError> {
        let products = self
            .client
            .product_list()?
            .into_payload("The product types could not be retrieved from the server")?;

        let product = products
            .products
            .iter()
            .find(|p| p.name_id.eq_ignore_ascii_case(&product_info.product_id))
            .ok_or_else(|| {
                let known: Vec<&str> =
                    products.products.iter().map(|p| p.name_id.as_str()).collect();
                ConnectorError::Operation(format!(
                    "The product ID '{}' does not exist. The following product IDs are valid: {}",
                    product_info.product_id,
                    known.join(", ")
                ))
            })?;

        let division_id = connection_info
            .get(keys::DIVISION_ID)
            .and_then(|raw| raw.parse::<i32>().ok())
            .or(self.config.division_id);
        let details = self
            .client
            .product_details(&ProductDetailsRequest::new(&product.name_id, division_id))?;
        if details.is_error() {
            return Err(ConnectorError::Operation(format!(
                "Validation of '{}' failed for the following reasons: {}.",
                product_info.product_id,
                details.error_summary()
            )));
        }
        Ok(())
    }

    /// Enrolls for a certificate; the enrollment type picks the new,
    /// renew, or reissue workflow.
    pub fn enroll(
        &self,
        reader: &dyn CertificateDataReader,
        csr: &str,
        subject: &str,
        sans: &HashMap<String, Vec<String>>,
        product_info: &ProductInfo,
        enrollment_type: EnrollmentType,
    ) -> Result<EnrollmentOutcome, ConnectorError> {
        let ctx = EnrollmentContext {
            client: &self.client,
            catalog: &self.catalog,
            config: &self.config,
            dcv_tokens: &self.dcv_tokens,
        };
        enroll(&ctx, reader, csr, subject, sans, product_info, enrollment_type)
    }

    /// Returns a single certificate record by its composite correlation
    /// id.
    pub fn get_single_record(
        &self,
        ca_request_id: &str,
    ) -> Result<CertificateRecord, ConnectorError> {
        sync::get_single_record(&self.client, ca_request_id)
    }

    /// Revokes a certificate (or its whole order, depending on
    /// configuration) and approves the resulting revocation request. A
    /// failed approval fails the revocation loudly.
    pub fn revoke(
        &self,
        ca_request_id: &str,
        _serial_hex: &str,
        reason_code: u32,
    ) -> Result<Disposition, ConnectorError> {
        let (order_id, certificate_id) = parse_ca_request_id(ca_request_id)
            .map_err(|e| ConnectorError::NotFound(e.to_string()))?;

        let view = self.client.view_certificate_order(order_id)?;
        let issued = view
            .payload()
            .map(|order| order.status.eq_ignore_ascii_case(order_status::ISSUED))
            .unwrap_or(false);
        if view.is_error() || !issued {
            let message =
                format!("Request {order_id} was not found in the CA database or is not valid");
            return Err(ConnectorError::NotFound(message));
        }

        trace!("[connector] Making request to revoke {ca_request_id}");
        let comments = Some(revoke_reason_comment(reason_code).to_string());
        let revoke_response = if self.config.revoke_certificate_only {
            self.client
                .revoke_certificate(&RevokeCertificateRequest { certificate_id, comments })?
        } else {
            let order_id = view.payload().map(|o| o.id).unwrap_or(order_id);
            self.client
                .revoke_order(&RevokeOrderRequest { order_id, comments })?
        };
        if revoke_response.is_error() {
            let message = format!(
                "Unable to revoke certificate {ca_request_id}. Error(s): {}",
                revoke_response
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join(";")
            );
            error!("[connector] {message}");
            return Err(ConnectorError::Operation(message));
        }
        let request_id = revoke_response
            .payload()
            .map(|r| r.id)
            .unwrap_or_default();

        let update = self
            .client
            .update_request_status(&UpdateRequestStatusRequest::new(
                request_id,
                order_status::APPROVED,
            ))?;
        if update.is_error() {
            let message = "Unable to approve revocation request. Manual approval through the CA portal required. Verify that the gateway API key has administrator rights for future revocations.";
            error!("[connector] {message}");
            return Err(ConnectorError::Operation(message.to_string()));
        }
        Ok(Disposition::Revoked)
    }

    /// Reconciles the CA's inventory into the host-provided sink, in full
    /// or incremental mode.
    pub fn synchronize(
        &self,
        reader: &dyn CertificateDataReader,
        sink: &dyn RecordSink,
        sync_info: &SyncInfo,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectorError> {
        sync::synchronize(&self.client, reader, sink, sync_info, cancel)
    }

    /// Human-readable listing of the account's product types for host
    /// configuration screens. Swallows every failure and returns an empty
    /// string; this surface must never block configuration.
    pub fn product_id_comment(&self) -> String {
        let products = match self.client.product_list() {
            Ok(envelope) if !envelope.is_error() => match envelope.payload() {
                Some(products) => products.products.clone(),
                None => return String::new(),
            },
            _ => return String::new(),
        };
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        format!("Available product types are: {}", names.join(", "))
    }

    /// DCV random value retained from a pending enrollment, if one is
    /// still cached for the order.
    pub fn dcv_token(&self, order_id: i32) -> Option<String> {
        self.dcv_tokens.get(order_id)
    }

    /// Drops the cached product catalog so the next use re-fetches it.
    pub fn clear_product_cache(&self) {
        self.catalog.clear();
    }
}
