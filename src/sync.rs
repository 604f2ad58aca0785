//! Inventory synchronization between the CA and the host record store.
//!
//! Two modes: full (paginated enumeration of every order) and incremental
//! (time-windowed status-changes feed). Either way, each order's reissues
//! and duplicates are folded into one flat worklist, and a single order
//! failing never aborts the batch.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use log::{debug, error, info, warn};

use crate::api::orders::{StatusChangesRequest, StatusOrder};
use crate::cancel::CancellationToken;
use crate::client::CertCentralClient;
use crate::error::ConnectorError;
use crate::record::{
    CertificateDataReader, CertificateRecord, RecordSink, SyncInfo, ca_request_id,
    parse_ca_request_id, strip_pem_armor,
};
use crate::status::{Disposition, normalize_order_status, order_status};

/// The CA stamps status timestamps in mountain time; widening the window
/// by 7 hours covers the offset (and daylight saving), and the extra day
/// forward catches same-day CA-side updates.
const TIMEZONE_SKEW_HOURS: i64 = 7;
const FORWARD_WINDOW_DAYS: i64 = 1;

/// Formats a sync window bound the way the CA's status-changes filter
/// expects: unpadded date and time components joined with `+`.
pub fn format_sync_date(moment: NaiveDateTime) -> String {
    use chrono::{Datelike, Timelike};
    format!(
        "{}-{}-{}+{}:{}:{}",
        moment.year(),
        moment.month(),
        moment.day(),
        moment.hour(),
        moment.minute(),
        moment.second()
    )
}

/// Reconciles the CA's inventory into the host-provided sink.
pub fn synchronize(
    client: &CertCentralClient,
    reader: &dyn CertificateDataReader,
    sink: &dyn RecordSink,
    sync_info: &SyncInfo,
    cancel: &CancellationToken,
) -> Result<(), ConnectorError> {
    let worklist = if sync_info.full_sync {
        collect_full(client, cancel)?
    } else {
        collect_incremental(client, sync_info.last_sync, cancel)?
    };

    let mut records: Vec<CertificateRecord> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    for order in &worklist {
        cancel.check()?;

        let correlation = ca_request_id(order.order_id, order.certificate_id);
        if order.status.eq_ignore_ascii_case(order_status::REJECTED) {
            skipped.push(order.certificate_id.to_string());
            continue;
        }
        let actionable = [order_status::ISSUED, order_status::REVOKED, order_status::APPROVED]
            .iter()
            .any(|status| order.status.eq_ignore_ascii_case(status));
        if !actionable {
            continue;
        }

        let fetched = match get_single_record(client, &correlation) {
            Ok(record) => record,
            Err(err) => {
                skipped.push(order.certificate_id.to_string());
                warn!(
                    "[sync] An error occurred attempting to sync order '{}': {}. This order will be skipped.",
                    order.certificate_id, err
                );
                continue;
            }
        };

        let body = match fetched.certificate.as_deref().map(strip_pem_armor) {
            Some(Ok(body)) => Some(body),
            Some(Err(_)) | None => {
                skipped.push(order.certificate_id.to_string());
                warn!(
                    "[sync] An error occurred attempting to sync order '{}'. This order will be skipped.",
                    order.certificate_id
                );
                continue;
            }
        };

        // Update the existing host record in place when one exists,
        // otherwise hand over a fresh one.
        let mut record = reader
            .record_by_correlation(&correlation, "")
            .unwrap_or_else(|| CertificateRecord {
                ca_request_id: correlation.clone(),
                certificate: None,
                disposition: fetched.disposition,
                product_id: None,
                submission_date: None,
                resolution_date: None,
                revocation_date: None,
                revocation_reason: None,
            });
        record.certificate = body;
        record.disposition = fetched.disposition;
        record.product_id = fetched.product_id;
        record.submission_date = fetched.submission_date;
        record.resolution_date = fetched.resolution_date;
        record.revocation_date = fetched.revocation_date;
        record.revocation_reason = fetched.revocation_reason;
        records.push(record);
    }

    cancel.check()?;

    if !skipped.is_empty() {
        info!("[sync] Sync skipped the following orders: {}", skipped.join(","));
    }
    info!("[sync] Sync is returning {} certificates.", records.len());

    for record in records {
        cancel.check()?;
        sink.push(record)
            .map_err(|e| ConnectorError::Operation(e.to_string()))?;
    }
    Ok(())
}

/// Full enumeration: every order, plus reissues always and duplicates
/// when the order is flagged as having them.
fn collect_full(
    client: &CertCentralClient,
    cancel: &CancellationToken,
) -> Result<Vec<StatusOrder>, ConnectorError> {
    let listing = client.list_all_certificate_orders()?;
    if listing.is_error() {
        error!("[sync] Error in listing all certificate orders");
        return Err(ConnectorError::Operation(format!(
            "CA web service returned {} to retrieve all rows",
            listing
                .errors
                .first()
                .map(|e| format!("{} - {}", e.code, e.message))
                .unwrap_or_default()
        )));
    }

    let mut worklist = Vec::new();
    let orders = listing.payload().map(|p| p.orders.clone()).unwrap_or_default();
    for order in orders {
        cancel.check()?;

        worklist.push(StatusOrder {
            order_id: order.id,
            certificate_id: order.certificate.id,
            status: order.status.clone(),
        });
        match get_reissues(client, order.id) {
            Ok(reissues) => worklist.extend(reissues),
            Err(err) => error!(
                "[sync] Error retrieving reissues for order ID {}: {}. Continuing with sync, but reissued certificates from this order may be missing.",
                order.id, err
            ),
        }
        if order.has_duplicates {
            match get_duplicates(client, order.id) {
                Ok(duplicates) => worklist.extend(duplicates),
                Err(err) => error!(
                    "[sync] Error retrieving duplicates for order ID {}: {}. Continuing with sync, but duplicate certificates from this order may be missing.",
                    order.id, err
                ),
            }
        }
    }
    Ok(worklist)
}

/// Incremental pass over the status-changes feed, widened for the CA's
/// timezone skew.
fn collect_incremental(
    client: &CertCentralClient,
    last_sync: Option<NaiveDateTime>,
    cancel: &CancellationToken,
) -> Result<Vec<StatusOrder>, ConnectorError> {
    let from = last_sync
        .map(|t| t - ChronoDuration::hours(TIMEZONE_SKEW_HOURS))
        .unwrap_or_else(|| {
            // No prior sync: open the window at the epoch.
            NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .expect("epoch is a valid date")
        });
    let to = Utc::now().naive_utc() + ChronoDuration::days(FORWARD_WINDOW_DAYS);

    let request = StatusChangesRequest {
        from: format_sync_date(from),
        to: format_sync_date(to),
    };
    let feed = client.status_changes(&request)?;
    if feed.is_error() {
        error!("[sync] Error in grabbing certificates for partial sync");
        return Err(ConnectorError::Operation(format!(
            "CA web service returned {} to retrieve all rows",
            feed.errors
                .first()
                .map(|e| format!("{} - {}", e.code, e.message))
                .unwrap_or_default()
        )));
    }

    let changed = feed.payload().map(|p| p.orders.clone()).unwrap_or_default();
    let mut worklist = changed.clone();
    for order in &changed {
        cancel.check()?;

        match get_reissues(client, order.order_id) {
            Ok(reissues) => worklist.extend(reissues),
            Err(err) => error!(
                "[sync] Error retrieving reissues for order ID {}: {}. Continuing with sync, but reissued certificates from this order may be missing.",
                order.order_id, err
            ),
        }
        match get_duplicates(client, order.order_id) {
            Ok(duplicates) => worklist.extend(duplicates),
            Err(err) => error!(
                "[sync] Error retrieving duplicates for order ID {}: {}. Continuing with sync, but duplicate certificates from this order may be missing.",
                order.order_id, err
            ),
        }
    }
    Ok(worklist)
}

pub(crate) fn get_reissues(
    client: &CertCentralClient,
    order_id: i32,
) -> Result<Vec<StatusOrder>, ConnectorError> {
    debug!("[sync] Getting reissues for order {order_id}");
    let response = client.list_reissues(order_id)?;
    if response.is_error() {
        return Err(ConnectorError::Operation(format!(
            "CA web service returned {} retrieving reissues",
            response.first_error_message()
        )));
    }
    Ok(response
        .payload()
        .map(|list| {
            list.certificates
                .iter()
                .map(|cert| StatusOrder {
                    order_id,
                    certificate_id: cert.id,
                    status: cert.status.clone(),
                })
                .collect()
        })
        .unwrap_or_default())
}

pub(crate) fn get_duplicates(
    client: &CertCentralClient,
    order_id: i32,
) -> Result<Vec<StatusOrder>, ConnectorError> {
    debug!("[sync] Getting duplicates for order {order_id}");
    let response = client.list_duplicates(order_id)?;
    if response.is_error() {
        return Err(ConnectorError::Operation(format!(
            "CA web service returned {} retrieving duplicates",
            response.first_error_message()
        )));
    }
    Ok(response
        .payload()
        .map(|list| {
            list.certificates
                .iter()
                .map(|cert| StatusOrder {
                    order_id,
                    certificate_id: cert.id,
                    status: cert.status.clone(),
                })
                .collect()
        })
        .unwrap_or_default())
}

/// Retrieves one certificate record by its composite correlation id.
///
/// The requested certificate may be the order's primary certificate or
/// any of its reissues/duplicates, so all three sets are searched.
pub fn get_single_record(
    client: &CertCentralClient,
    ca_request_id_str: &str,
) -> Result<CertificateRecord, ConnectorError> {
    let (order_id, certificate_id) = parse_ca_request_id(ca_request_id_str)
        .map_err(|e| ConnectorError::NotFound(e.to_string()))?;

    let view = client.view_certificate_order(order_id)?;
    if view.is_error() {
        let message =
            format!("Request {order_id} was not found in the CA database or is not valid");
        info!("[sync] {message}");
        return Err(ConnectorError::NotFound(message));
    }
    let order = view
        .payload()
        .cloned()
        .ok_or_else(|| ConnectorError::NotFound(format!("order {order_id} view was empty")))?;

    // Reissue/duplicate enumeration failing must not block record
    // retrieval for the primary certificate.
    let reissues = get_reissues(client, order_id).unwrap_or_default();
    let duplicates = get_duplicates(client, order_id).unwrap_or_default();

    // The certificate-level status can lag; fall back to the order-level
    // status when it is missing.
    let primary_status = if order.certificate.status.is_empty() {
        order.status.clone()
    } else {
        order.certificate.status.clone()
    };
    let mut candidates = vec![StatusOrder {
        order_id,
        certificate_id: order.certificate.id,
        status: primary_status,
    }];
    candidates.extend(reissues);
    candidates.extend(duplicates);

    let target = candidates
        .into_iter()
        .find(|c| c.certificate_id == certificate_id)
        .ok_or_else(|| {
            ConnectorError::NotFound(format!(
                "Certificate {certificate_id} was not found on order {order_id}"
            ))
        })?;

    let disposition = normalize_order_status(&target.status, order_id);
    let mut certificate = None;
    if matches!(
        disposition,
        Disposition::Issued | Disposition::Revoked | Disposition::Unknown
    ) {
        // There may be a certificate to download; try the chain endpoint.
        let chain = client.certificate_chain(certificate_id)?;
        if chain.is_error() {
            warn!(
                "[sync] Unexpected error downloading certificate {} for order {}: {}",
                certificate_id,
                order_id,
                chain.first_error_message()
            );
        } else {
            certificate = chain
                .payload()
                .and_then(|c| c.intermediates.first())
                .map(|entry| entry.pem.clone());
        }
    }

    Ok(CertificateRecord {
        ca_request_id: ca_request_id_str.to_string(),
        certificate,
        disposition,
        product_id: if order.product.name_id.is_empty() {
            None
        } else {
            Some(order.product.name_id.clone())
        },
        submission_date: order.date_created,
        resolution_date: order.certificate.valid_from,
        revocation_date: revocation_date(&order, order_id),
        revocation_reason: None,
    })
}

/// The revocation date lives on the order's approved revoke request. A
/// revoked order without one is a CA-side data inconsistency, logged but
/// not fatal.
fn revocation_date(
    order: &crate::api::orders::ViewCertificateOrderResponse,
    order_id: i32,
) -> Option<NaiveDateTime> {
    let revoke_request = order.requests.iter().find(|r| {
        r.kind.eq_ignore_ascii_case("revoke") && r.status.eq_ignore_ascii_case(order_status::APPROVED)
    });
    match revoke_request {
        Some(request) => request.date,
        None => {
            if order.status.eq_ignore_ascii_case(order_status::REVOKED) {
                warn!(
                    "[sync] Order '{}' is revoked, but lacks a revoke request and revocation date. This may cause problems syncing.",
                    order_id
                );
            }
            None
        }
    }
}
