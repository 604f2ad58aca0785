use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use certcentral_gateway::CertCentralClient;
use certcentral_gateway::client::transport::{BackoffPolicy, HttpTransport, TransportError};
use certcentral_gateway::record::CertificateBodyTransform;

use crate::fake_ca::{FakeCa, error_body, sample_pem, sample_pem_base64};

fn client_with_fast_backoff(fake: &FakeCa, max_attempts: u32) -> CertCentralClient {
    let transport = HttpTransport::new(fake.endpoint(), "test-key".to_string(), None)
        .with_backoff(BackoffPolicy {
            initial_delay: Duration::ZERO,
            max_attempts,
        });
    CertCentralClient::with_transport(Box::new(transport))
}

#[test]
fn rate_limited_requests_are_retried_until_the_limit_lifts() {
    let hits = Mutex::new(0u32);
    let fake = FakeCa::start(move |request| {
        if request.url.starts_with("/services/v2/order/certificate/77/check-dcv") {
            let mut count = hits.lock().unwrap();
            *count += 1;
            if *count <= 2 {
                return (429, error_body("rate_limited", "slow down"));
            }
            return (
                200,
                serde_json::json!({"dcv_status": "complete", "order_status": "issued"}).to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_with_fast_backoff(&fake, 5);
    let response = client.check_dcv(77).expect("survives two 429s");
    assert!(!response.is_error());
    assert_eq!(response.payload().unwrap().dcv_status, "complete");
    assert_eq!(fake.requests_matching("check-dcv").len(), 3);
}

#[test]
fn sustained_rate_limiting_exhausts_the_retry_budget() {
    let fake = FakeCa::start(|_| (429, error_body("rate_limited", "slow down")));
    let client = client_with_fast_backoff(&fake, 3);
    let err = client.check_dcv(77).expect_err("429s past the cap");
    assert!(matches!(err, TransportError::RateLimited { attempts: 3 }));
    assert_eq!(fake.recorded().len(), 3);
}

#[test]
fn download_collapses_line_breaks_in_pem_bodies() {
    let fake = FakeCa::start(|request| {
        if request
            .url
            .contains("/certificate/31/download/format/pem_nointermediate")
        {
            let pem = sample_pem().replace('\n', "\r\n");
            return (200, pem);
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_with_fast_backoff(&fake, 1);
    let request =
        certcentral_gateway::api::certificate::DownloadCertificateRequest::new(31);
    let downloaded = client.download_certificate(&request).expect("download");
    assert!(!downloaded.is_error());
    let body = &downloaded.payload().unwrap().certificate;
    assert!(!body.contains("\r\n"));
    assert!(body.contains("BEGIN CERTIFICATE"));
}

/// Host-side stand-in that picks a fixed leaf out of a PKCS#7 blob.
struct FixedLeafTransform;

impl CertificateBodyTransform for FixedLeafTransform {
    fn newest_leaf_base64(&self, pkcs7_der: &[u8]) -> Result<String> {
        assert!(!pkcs7_der.is_empty());
        Ok(sample_pem_base64())
    }
}

#[test]
fn p7b_downloads_pass_through_the_host_transform() {
    let fake = FakeCa::start(|request| {
        if request.url.contains("/certificate/31/download/format/p7b") {
            let der = BASE64.encode([0x30u8, 0x80, 0x06, 0x09]);
            return (
                200,
                format!("-----BEGIN PKCS7-----\n{der}\n-----END PKCS7-----\n"),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_with_fast_backoff(&fake, 1);
    let downloaded = client
        .download_certificate_body(31, "p7b", &FixedLeafTransform)
        .expect("download");
    assert!(!downloaded.is_error());
    assert_eq!(
        downloaded.payload().unwrap().certificate,
        sample_pem_base64()
    );
}

#[test]
fn download_errors_surface_the_ca_error_envelope() {
    let fake = FakeCa::start(|_| (403, error_body("access_denied", "certificate not yours")));
    let client = client_with_fast_backoff(&fake, 1);
    let request =
        certcentral_gateway::api::certificate::DownloadCertificateRequest::new(31);
    let downloaded = client.download_certificate(&request).expect("transport ok");
    assert!(downloaded.is_error());
    assert_eq!(downloaded.errors[0].code, "access_denied");
}
