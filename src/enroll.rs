//! Enrollment orchestration: builds CA order requests from host-supplied
//! subject/SAN/product/lifetime parameters, chooses the new/renew/reissue
//! workflow, and reduces the CA's possibly-multi-step response to a
//! single enrollment outcome.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Days, Utc};
use log::{debug, error, trace, warn};

use crate::api::account::{ListMetadataRequest, ListOrganizationsRequest};
use crate::api::orders::{
    CustomFieldValue, OrderRequest, OrderResponse, ReissueCertificate, ReissueRequest,
    UpdateRequestStatusRequest,
};
use crate::api::Envelope;
use crate::catalog::ProductCatalog;
use crate::client::CertCentralClient;
use crate::config::{DV_SSL_PRODUCT, GatewayConfig, attributes, keys};
use crate::error::ConnectorError;
use crate::record::{
    CertificateDataReader, EnrollmentOutcome, EnrollmentType, ProductInfo, ca_request_id,
    hex_serial_to_bytes, parse_ca_request_id,
};
use crate::status::{Disposition, normalize_order_status, order_status};
use crate::sync;

/// Error code the CA returns when the API key may not approve requests.
const APPROVER_DENIED_CODE: &str = "access_denied|invalid_approver";

/// A renewal with more than this much validity left becomes a reissue.
const REISSUE_THRESHOLD_DAYS: u64 = 90;

/// DCV random values handed back on pending orders, kept for later
/// retrieval. Bounded and time-expiring so entries cannot accumulate for
/// the life of the process.
pub struct DcvTokenCache {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<i32, (String, Instant)>>,
}

impl Default for DcvTokenCache {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_entries: 1024,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl DcvTokenCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, order_id: i32, token: String) {
        let mut entries = self.entries.lock().expect("dcv token lock poisoned");
        let now = Instant::now();
        entries.retain(|_, (_, stored)| now.duration_since(*stored) < self.ttl);
        if entries.len() >= self.max_entries {
            // Drop the stalest entry to stay within bounds.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, (_, stored))| *stored)
                .map(|(id, _)| *id)
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(order_id, (token, now));
    }

    pub fn get(&self, order_id: i32) -> Option<String> {
        let entries = self.entries.lock().expect("dcv token lock poisoned");
        entries.get(&order_id).and_then(|(token, stored)| {
            if stored.elapsed() < self.ttl {
                Some(token.clone())
            } else {
                None
            }
        })
    }
}

/// Subject fields the order request needs.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SubjectFields {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub org_unit: Option<String>,
}

/// Pulls CN, O, and OU out of a distinguished name. Later occurrences of
/// a key win, matching how the CA reads multi-valued subjects.
pub(crate) fn parse_subject_dn(subject: &str) -> SubjectFields {
    let mut fields = SubjectFields::default();
    for part in split_dn(subject) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_uppercase().as_str() {
            "CN" => fields.common_name = Some(value),
            "O" => fields.organization = Some(value),
            "OU" => fields.org_unit = Some(value),
            _ => {}
        }
    }
    fields
}

/// Splits on commas, honoring backslash escapes inside values.
fn split_dn(subject: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in subject.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ',' {
            parts.push(current.trim().to_string());
            current = String::new();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Maps a requested lifetime onto the CA's validity model: whole years
/// for the standard terms, otherwise a custom expiration date.
pub(crate) fn resolve_validity(days: u32) -> (i32, Option<chrono::NaiveDate>) {
    match days {
        365 | 730 | 1095 => ((days / 365) as i32, None),
        other => {
            let expiration = Utc::now()
                .date_naive()
                .checked_add_days(Days::new(other as u64));
            (0, expiration)
        }
    }
}

pub(crate) struct EnrollmentContext<'a> {
    pub client: &'a CertCentralClient,
    pub catalog: &'a ProductCatalog,
    pub config: &'a GatewayConfig,
    pub dcv_tokens: &'a DcvTokenCache,
}

pub(crate) fn enroll(
    ctx: &EnrollmentContext<'_>,
    reader: &dyn CertificateDataReader,
    csr: &str,
    subject: &str,
    sans: &HashMap<String, Vec<String>>,
    product_info: &ProductInfo,
    mut enrollment_type: EnrollmentType,
) -> Result<EnrollmentOutcome, ConnectorError> {
    let product = ctx
        .catalog
        .find(ctx.client, ctx.config.division_id, &product_info.product_id)?
        .ok_or_else(|| {
            ConnectorError::Operation(format!(
                "The product type '{}' does not exist.",
                product_info.product_id
            ))
        })?;

    let days = match product_info.parameters.get(keys::LIFETIME) {
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            ConnectorError::InvalidConfig(format!("{} must be a number of days", keys::LIFETIME))
        })?,
        None => 365,
    };
    let (validity_years, custom_expiration_date) = resolve_validity(days);

    let dns_names: Vec<String> = sans
        .get("Dns")
        .or_else(|| sans.get("dns"))
        .cloned()
        .unwrap_or_default();

    let parsed = parse_subject_dn(subject);
    let common_name = match parsed.common_name {
        Some(cn) => cn,
        None => dns_names.first().cloned().ok_or_else(|| {
            ConnectorError::Operation(
                "No Common Name or DNS SAN provided, unable to enroll".to_string(),
            )
        })?,
    };

    // An explicit attribute overrides whatever the CSR subject carried.
    let organization = product_info
        .parameters
        .get(attributes::ORGANIZATION_NAME)
        .cloned()
        .or(parsed.organization);

    let organization_id = if product_info
        .product_id
        .eq_ignore_ascii_case(DV_SSL_PRODUCT)
    {
        // DV certs carry no organization; skip resolution entirely.
        None
    } else {
        let name = organization.ok_or_else(|| {
            ConnectorError::Operation(
                "No organization provided in either subject or attributes, unable to enroll"
                    .to_string(),
            )
        })?;
        Some(resolve_organization_id(ctx.client, &name)?)
    };

    let custom_fields = collect_metadata_fields(ctx.client, product_info)?;
    let ca_cert_id = product_info.parameters.get(keys::CA_CERT_ID).cloned();
    let signature_hash = product.signature_algorithm.clone();

    let mut request = OrderRequest::new(&product.product_code);
    request.certificate.common_name = common_name.clone();
    request.certificate.csr = csr.to_string();
    request.certificate.signature_hash = signature_hash.clone();
    request.certificate.dns_names = dns_names.clone();
    request.certificate.ca_cert_id = ca_cert_id.clone();
    request.set_organization(organization_id);
    if let Some(ou) = parsed.org_unit {
        request.certificate.organization_units = Some(vec![ou]);
    }
    request.dcv_method = Some(ctx.config.dcv_method.wire_value().to_string());
    request.custom_fields = custom_fields;
    request.validity_years = validity_years;
    request.custom_expiration_date = custom_expiration_date;
    request.payment_method = ctx.config.payment_method_wire();

    // Multi-year orders with enough validity left get a reissue rather
    // than a fresh renewal order.
    let mut prior_order_id = None;
    if matches!(enrollment_type, EnrollmentType::Renew | EnrollmentType::Reissue) {
        let order_id = locate_prior_order(reader, product_info)?;
        prior_order_id = Some(order_id);

        if enrollment_type == EnrollmentType::Renew {
            let view = ctx.client.view_certificate_order(order_id)?;
            if let Some(order) = view.payload() {
                if let Some(valid_till) = order.order_valid_till {
                    let threshold = valid_till
                        .checked_sub_days(Days::new(REISSUE_THRESHOLD_DAYS))
                        .unwrap_or(valid_till);
                    if threshold > Utc::now().date_naive() {
                        debug!(
                            "[enroll] Order {} still has validity past the renewal window, reissuing instead",
                            order_id
                        );
                        enrollment_type = EnrollmentType::Reissue;
                    }
                }
            }
        }
    }

    debug!("[enroll] Making request to enroll ({enrollment_type:?})");
    match enrollment_type {
        EnrollmentType::New => {
            let response = ctx.client.order_certificate(&request, true)?;
            extract_enrollment_result(ctx, response, &common_name)
        }
        EnrollmentType::Renew => {
            request.renewal_of_order_id = prior_order_id;
            let response = ctx.client.order_certificate(&request, true)?;
            extract_enrollment_result(ctx, response, &common_name)
        }
        EnrollmentType::Reissue => {
            let order_id = match prior_order_id {
                Some(id) => id,
                None => locate_prior_order(reader, product_info)?,
            };
            let reissue = ReissueRequest {
                order_id,
                certificate: ReissueCertificate {
                    common_name: common_name.clone(),
                    dns_names,
                    csr: csr.to_string(),
                    signature_hash,
                    ca_cert_id,
                },
                // Without skip_approval the CA withholds the certificate id.
                skip_approval: true,
            };
            let response = ctx.client.reissue_certificate(&reissue, true)?;
            extract_enrollment_result(ctx, response, &common_name)
        }
    }
}

fn locate_prior_order(
    reader: &dyn CertificateDataReader,
    product_info: &ProductInfo,
) -> Result<i32, ConnectorError> {
    let serial = product_info
        .parameters
        .get(attributes::PRIOR_CERT_SN)
        .ok_or_else(|| {
            ConnectorError::Operation(
                "No prior certificate serial number provided for renewal/reissue".to_string(),
            )
        })?;
    trace!("[enroll] Attempting to retrieve the certificate with serial number {serial}");
    let serial_bytes =
        hex_serial_to_bytes(serial).map_err(|e| ConnectorError::Operation(e.to_string()))?;
    let record = reader.record_by_serial(&serial_bytes).ok_or_else(|| {
        ConnectorError::Operation(format!(
            "No certificate with serial number '{serial}' could be found."
        ))
    })?;
    let (order_id, _) = parse_ca_request_id(&record.ca_request_id).map_err(|e| {
        ConnectorError::Operation(format!(
            "There was an error parsing the order ID from the certificate: {e}"
        ))
    })?;
    Ok(order_id)
}

fn resolve_organization_id(
    client: &CertCentralClient,
    organization: &str,
) -> Result<i32, ConnectorError> {
    let response = client.list_organizations(&ListOrganizationsRequest::default())?;
    if response.is_error() {
        error!(
            "[enroll] Error from CA listing organizations: {}",
            response.first_error_message()
        );
    }
    response
        .payload()
        .and_then(|list| {
            list.organizations
                .iter()
                .find(|org| org.name.eq_ignore_ascii_case(organization))
                .map(|org| org.id)
        })
        .ok_or_else(|| {
            ConnectorError::Operation(format!(
                "Organization '{organization}' is invalid for this account, please check name"
            ))
        })
}

/// Attaches any account-defined active metadata field whose label matches
/// a supplied request attribute.
fn collect_metadata_fields(
    client: &CertCentralClient,
    product_info: &ProductInfo,
) -> Result<Vec<CustomFieldValue>, ConnectorError> {
    let response = client.list_metadata(&ListMetadataRequest)?;
    let mut fields = Vec::new();
    if let Some(metadata) = response.payload() {
        let active: Vec<_> = metadata.metadata_fields.iter().filter(|m| m.active).collect();
        trace!(
            "[enroll] Found {} active metadata fields in the account",
            active.len()
        );
        for field in active {
            if let Some(value) = product_info.parameters.get(&field.label) {
                trace!("[enroll] Found {} in the request, adding...", field.label);
                fields.push(CustomFieldValue {
                    metadata_id: field.id,
                    value: value.clone(),
                });
            }
        }
    }
    Ok(fields)
}

/// Reduces an order/reissue response to the host-facing outcome. The CA
/// may issue immediately, leave the order pending validation, or (on
/// misconfigured accounts) withhold the certificate id until a request is
/// approved.
pub(crate) fn extract_enrollment_result(
    ctx: &EnrollmentContext<'_>,
    response: Envelope<OrderResponse>,
    common_name: &str,
) -> Result<EnrollmentOutcome, ConnectorError> {
    if response.is_error() {
        error!(
            "[enroll] Error from CA: {}",
            response.first_error_message()
        );
        return Ok(EnrollmentOutcome {
            ca_request_id: None,
            certificate: None,
            disposition: Disposition::Failed,
            message: Some(response.first_error_message()),
        });
    }

    let order = response
        .payload()
        .cloned()
        .ok_or_else(|| ConnectorError::Operation("empty order response".to_string()))?;
    let order_id = order.id;

    let view = ctx.client.view_certificate_order(order_id)?;
    if view.is_error() {
        return Err(ConnectorError::Operation(format!(
            "Order {order_id} was not found in the CA database"
        )));
    }
    let view = view
        .payload()
        .cloned()
        .ok_or_else(|| ConnectorError::Operation("empty order view".to_string()))?;

    let mut disposition = normalize_order_status(&view.status, order_id);
    let mut certificate = None;
    let mut request_id = None;
    let mut message = None;

    if let Some(chain) = order.certificate_chain.as_ref().filter(|c| !c.is_empty()) {
        trace!("[enroll] Certificate for order {order_id} was immediately issued");
        let pem = chain
            .iter()
            .find(|entry| entry.subject_common_name.eq_ignore_ascii_case(common_name))
            .map(|entry| entry.pem.clone());
        if pem.is_none() {
            warn!(
                "[enroll] Order {} was for Common Name '{}', but no certificate with that Common Name was returned",
                order_id, common_name
            );
        }
        certificate = pem;
        request_id = Some(ca_request_id(order_id, order.certificate_id.unwrap_or_default()));
    } else if let Some(certificate_id) = order.certificate_id {
        trace!(
            "[enroll] Certificate for order {order_id} is being processed by the CA. Most likely a domain or organization requires further validation"
        );
        if let Some(token) = order.dcv_random_value.as_ref() {
            debug!("[enroll] Saving DCV token for order {order_id}");
            ctx.dcv_tokens.insert(order_id, token.clone());
        }
        request_id = Some(ca_request_id(order_id, certificate_id));
    } else {
        // No certificate id on a successful order: the account likely
        // requires manual approval. Try to approve the pending request.
        warn!("[enroll] Order {order_id} did not return a certificate id. Manual intervention may be required");
        let pending = order
            .requests
            .iter()
            .find(|r| r.status == order_status::PENDING);
        match pending {
            Some(pending_request) => {
                trace!("[enroll] Attempting to approve order '{order_id}'");
                let update = ctx.client.update_request_status(
                    &UpdateRequestStatusRequest::new(pending_request.id, order_status::APPROVED),
                )?;
                if update.is_error() {
                    let errors = update.error_summary();
                    error!("[enroll] The order '{order_id}' could not be approved: '{errors}'");
                    request_id = Some(order_id.to_string());
                    if update.errors.iter().any(|e| e.code == APPROVER_DENIED_CODE) {
                        disposition = Disposition::ExternalValidation;
                        message = Some(errors);
                    } else {
                        disposition = Disposition::Failed;
                        message = Some(format!(
                            "Approval of order '{order_id}' failed. Check the gateway logs for more details."
                        ));
                    }
                } else {
                    // Approval went through; attempt to pick up the
                    // certificate. Failures here are non-fatal because the
                    // next sync will retrieve it.
                    let refreshed = ctx.client.view_certificate_order(order_id)?;
                    if !refreshed.is_error() {
                        if let Some(refreshed) = refreshed.payload() {
                            let composite =
                                ca_request_id(refreshed.id, refreshed.certificate.id);
                            request_id = Some(composite.clone());
                            match sync::get_single_record(ctx.client, &composite) {
                                Ok(record) => {
                                    certificate = record.certificate;
                                    disposition = record.disposition;
                                    message = Some(format!(
                                        "Post-submission approval of order {} returned success",
                                        refreshed.id
                                    ));
                                }
                                Err(err) => {
                                    warn!(
                                        "[enroll] Unable to retrieve certificate {} for order {}: {}",
                                        refreshed.certificate.id, refreshed.id, err
                                    );
                                    disposition = Disposition::Unknown;
                                    message = Some(format!(
                                        "Post-submission approval of order {} was successful, but pickup failed",
                                        refreshed.id
                                    ));
                                }
                            }
                        }
                    }
                }
            }
            None => {
                warn!("[enroll] The request disposition for this enrollment could not be determined");
                disposition = Disposition::Unknown;
                message = Some("The request disposition could not be determined.".to_string());
            }
        }
    }

    Ok(EnrollmentOutcome {
        ca_request_id: request_id,
        certificate,
        disposition,
        message,
    })
}
