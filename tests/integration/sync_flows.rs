use std::sync::mpsc::sync_channel;

use certcentral_gateway::{
    CancellationToken, CertCentralClient, CertCentralConnector, CertificateDataReader,
    CertificateRecord, GatewayConfig, SyncInfo,
};
use chrono::NaiveDate;

use crate::fake_ca::{FakeCa, error_body, sample_pem, sample_pem_base64};

struct EmptyReader;

impl CertificateDataReader for EmptyReader {
    fn record_by_serial(&self, _serial: &[u8]) -> Option<CertificateRecord> {
        None
    }

    fn record_by_correlation(
        &self,
        _ca_request_id: &str,
        _filter: &str,
    ) -> Option<CertificateRecord> {
        None
    }
}

fn connector_for(fake: &FakeCa) -> CertCentralConnector {
    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    CertCentralConnector::initialize(config).expect("connector")
}

fn order_view_body(order_id: i32, certificate_id: i32, status: &str) -> String {
    serde_json::json!({
        "id": order_id,
        "status": status,
        "certificate": {
            "id": certificate_id,
            "status": status,
            "valid_from": "2024-01-02",
            "valid_till": "2025-01-02"
        },
        "product": {"name_id": "ssl_plus", "name": "Standard SSL", "type": "ssl_certificate"},
        "date_created": "2024-01-01 08:30:00",
        "requests": []
    })
    .to_string()
}

fn chain_body() -> String {
    serde_json::json!({
        "intermediates": [
            {"subject_common_name": "example.com", "pem": sample_pem()},
            {"subject_common_name": "Example Issuing CA", "pem": sample_pem()}
        ]
    })
    .to_string()
}

#[test]
fn full_listing_paginates_to_the_reported_total() {
    let fake = FakeCa::start(|request| {
        if request.url.starts_with("/services/v2/order/certificate?") {
            let offset: usize = request
                .url
                .split("offset=")
                .nth(1)
                .and_then(|s| s.split('&').next())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let remaining = 2500usize.saturating_sub(offset).min(1000);
            let orders: Vec<_> = (0..remaining)
                .map(|i| {
                    let id = (offset + i + 1) as i32;
                    serde_json::json!({
                        "id": id,
                        "certificate": {"id": id + 100_000},
                        "status": "issued",
                        "has_duplicates": false
                    })
                })
                .collect();
            return (
                200,
                serde_json::json!({"orders": orders, "page": {"total": 2500}}).to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    let client = CertCentralClient::from_config(&config);
    let listing = client.list_all_certificate_orders().expect("listing");
    assert!(!listing.is_error());
    assert_eq!(listing.payload().unwrap().orders.len(), 2500);

    let pages = fake.requests_matching("/services/v2/order/certificate?");
    assert_eq!(pages.len(), 3);
    assert!(pages[0].url.contains("offset=0"));
    assert!(pages[1].url.contains("offset=1000"));
    assert!(pages[2].url.contains("offset=2000"));
}

#[test]
fn full_sync_isolates_a_failing_order() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url.starts_with("/services/v2/order/certificate?") {
            let orders: Vec<_> = (1..=5)
                .map(|id| {
                    serde_json::json!({
                        "id": id,
                        "certificate": {"id": id + 100},
                        "status": "issued",
                        "has_duplicates": false
                    })
                })
                .collect();
            return (
                200,
                serde_json::json!({"orders": orders, "page": {"total": 5}}).to_string(),
            );
        }
        if url.ends_with("/reissue") || url.ends_with("/duplicate") {
            return (200, serde_json::json!({"certificates": []}).to_string());
        }
        if url == "/services/v2/order/certificate/3" {
            return (404, error_body("not_found", "order not found"));
        }
        if let Some(order_id) = url
            .strip_prefix("/services/v2/order/certificate/")
            .and_then(|rest| rest.parse::<i32>().ok())
        {
            return (200, order_view_body(order_id, order_id + 100, "issued"));
        }
        if url.contains("/chain") {
            return (200, chain_body());
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let (tx, rx) = sync_channel::<CertificateRecord>(100);
    let sync_info = SyncInfo {
        full_sync: true,
        last_sync: None,
    };
    connector
        .synchronize(&EmptyReader, &tx, &sync_info, &CancellationToken::new())
        .expect("sync must not fail because one order is malformed");
    drop(tx);

    let records: Vec<CertificateRecord> = rx.iter().collect();
    let ids: Vec<&str> = records.iter().map(|r| r.ca_request_id.as_str()).collect();
    assert_eq!(ids, vec!["1-101", "2-102", "4-104", "5-105"]);
    for record in &records {
        assert_eq!(record.certificate.as_deref(), Some(sample_pem_base64().as_str()));
        assert_eq!(record.product_id.as_deref(), Some("ssl_plus"));
        assert_eq!(
            record.resolution_date,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
    }
}

#[test]
fn incremental_sync_widens_the_window_with_unpadded_dates() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url.contains("status-changes") {
            return (200, serde_json::json!({"orders": []}).to_string());
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let (tx, _rx) = sync_channel::<CertificateRecord>(10);
    let last_sync = NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(16, 0, 1)
        .unwrap();
    let sync_info = SyncInfo {
        full_sync: false,
        last_sync: Some(last_sync),
    };
    connector
        .synchronize(&EmptyReader, &tx, &sync_info, &CancellationToken::new())
        .expect("incremental sync");

    let feed_requests = fake.requests_matching("status-changes");
    assert_eq!(feed_requests.len(), 1);
    // 16:00:01 minus the 7-hour skew, in the CA's unpadded format.
    assert!(
        feed_requests[0]
            .url
            .contains("filters%5Bstatus_last_updated%5D=2024-3-5+9:0:1...")
            || feed_requests[0]
                .url
                .contains("filters[status_last_updated]=2024-3-5+9:0:1..."),
        "unexpected feed URL: {}",
        feed_requests[0].url
    );
}

#[test]
fn rejected_orders_are_skipped_without_detail_fetches() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url.contains("status-changes") {
            return (
                200,
                serde_json::json!({
                    "orders": [
                        {"order_id": 9, "certificate_id": 90, "status": "rejected"}
                    ]
                })
                .to_string(),
            );
        }
        if url.ends_with("/reissue") || url.ends_with("/duplicate") {
            return (200, serde_json::json!({"certificates": []}).to_string());
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let (tx, rx) = sync_channel::<CertificateRecord>(10);
    let sync_info = SyncInfo {
        full_sync: false,
        last_sync: None,
    };
    connector
        .synchronize(&EmptyReader, &tx, &sync_info, &CancellationToken::new())
        .expect("sync");
    drop(tx);

    assert_eq!(rx.iter().count(), 0);
    assert!(fake.requests_matching("/services/v2/order/certificate/9").iter().all(|r| {
        r.url.ends_with("/reissue") || r.url.ends_with("/duplicate")
    }));
}

#[test]
fn cancellation_stops_the_batch() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url.starts_with("/services/v2/order/certificate?") {
            return (
                200,
                serde_json::json!({
                    "orders": [
                        {"id": 1, "certificate": {"id": 101}, "status": "issued", "has_duplicates": false}
                    ],
                    "page": {"total": 1}
                })
                .to_string(),
            );
        }
        (200, serde_json::json!({"certificates": []}).to_string())
    });

    let connector = connector_for(&fake);
    let (tx, _rx) = sync_channel::<CertificateRecord>(10);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let sync_info = SyncInfo {
        full_sync: true,
        last_sync: None,
    };
    let result = connector.synchronize(&EmptyReader, &tx, &sync_info, &cancel);
    assert!(matches!(
        result,
        Err(certcentral_gateway::ConnectorError::Cancelled)
    ));
}

#[test]
fn get_single_record_finds_reissued_certificates() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url == "/services/v2/order/certificate/7" {
            return (200, order_view_body(7, 70, "issued"));
        }
        if url.ends_with("/reissue") {
            return (
                200,
                serde_json::json!({
                    "certificates": [{"id": 71, "status": "issued"}]
                })
                .to_string(),
            );
        }
        if url.ends_with("/duplicate") {
            return (200, serde_json::json!({"certificates": []}).to_string());
        }
        if url.contains("/certificate/71/chain") {
            return (200, chain_body());
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let record = connector.get_single_record("7-71").expect("record");
    assert_eq!(record.ca_request_id, "7-71");
    assert!(record.certificate.is_some());
}

#[test]
fn get_single_record_fails_as_not_found_for_missing_orders() {
    let fake = FakeCa::start(|_| (404, error_body("not_found", "order not found")));
    let connector = connector_for(&fake);
    let result = connector.get_single_record("404-1");
    assert!(matches!(
        result,
        Err(certcentral_gateway::ConnectorError::NotFound(_))
    ));
}
