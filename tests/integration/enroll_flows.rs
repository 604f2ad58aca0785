use std::collections::HashMap;

use certcentral_gateway::{
    CertCentralConnector, CertificateDataReader, CertificateRecord, Disposition, EnrollmentType,
    GatewayConfig, ProductInfo,
};

use crate::fake_ca::{FakeCa, error_body, sample_pem};

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

/// Reader that knows one prior certificate, for renew/reissue flows.
struct PriorCertReader {
    ca_request_id: String,
}

impl CertificateDataReader for PriorCertReader {
    fn record_by_serial(&self, _serial: &[u8]) -> Option<CertificateRecord> {
        Some(CertificateRecord {
            ca_request_id: self.ca_request_id.clone(),
            certificate: None,
            disposition: Disposition::Issued,
            product_id: Some("ssl_plus".to_string()),
            submission_date: None,
            resolution_date: None,
            revocation_date: None,
            revocation_reason: None,
        })
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

fn product_routes(request: &crate::fake_ca::RecordedRequest, name_id: &str) -> Option<(u16, String)> {
    let url = request.url.as_str();
    if url == "/services/v2/product" {
        return Some((
            200,
            serde_json::json!({
                "products": [
                    {"group_name": "ssl", "name_id": name_id, "name": "Test SSL", "type": "ssl_certificate"}
                ]
            })
            .to_string(),
        ));
    }
    if url.starts_with(&format!("/services/v2/product/{name_id}")) {
        return Some((
            200,
            serde_json::json!({
                "name_id": name_id,
                "name": "Test SSL",
                "type": "ssl_certificate",
                "allowed_validity_years": [1, 2, 3],
                "signature_hash_types": {
                    "allowed_hash_types": [{"id": "sha256", "name": "SHA-256"}],
                    "default_hash_type_id": "sha256"
                },
                "additional_dns_names_allowed": true,
                "csr_required": true
            })
            .to_string(),
        ));
    }
    if url == "/services/v2/account/metadata" {
        return Some((200, serde_json::json!({"metadata": []}).to_string()));
    }
    None
}

#[test]
fn dv_enrollment_skips_organization_resolution() {
    let fake = FakeCa::start(|request| {
        if let Some(reply) = product_routes(request, "dv_ssl_certificate") {
            return reply;
        }
        let url = request.url.as_str();
        if url == "/services/v2/order/certificate/dv_ssl_certificate" {
            return (
                200,
                serde_json::json!({
                    "id": 112233,
                    "certificate_id": 998877,
                    "requests": [{"id": 1, "status": "approved"}],
                    "dcv_random_value": "a9b8c7"
                })
                .to_string(),
            );
        }
        if url == "/services/v2/order/certificate/112233" {
            return (
                200,
                serde_json::json!({
                    "id": 112233,
                    "status": "pending",
                    "certificate": {"id": 998877, "status": "pending"},
                    "product": {"name_id": "dv_ssl_certificate"},
                    "requests": []
                })
                .to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let product_info = ProductInfo {
        product_id: "dv_ssl_certificate".to_string(),
        parameters: HashMap::new(),
    };
    let outcome = connector
        .enroll(
            &EmptyReader,
            "CSRPEM",
            "CN=example.com",
            &HashMap::new(),
            &product_info,
            EnrollmentType::New,
        )
        .expect("enroll");

    assert_eq!(outcome.ca_request_id.as_deref(), Some("112233-998877"));
    assert_eq!(outcome.disposition, Disposition::ExternalValidation);
    assert!(outcome.certificate.is_none());

    // DV products carry no organization: no lookup, no field on the wire.
    assert!(fake.requests_matching("/services/v2/organization").is_empty());
    let order_posts = fake.requests_matching("/order/certificate/dv_ssl_certificate");
    assert_eq!(order_posts.len(), 1);
    assert!(!order_posts[0].body.contains("\"organization\""));
    assert!(order_posts[0].body.contains("\"dcv_method\":\"email\""));

    // The DCV random value was retained for later retrieval.
    assert_eq!(connector.dcv_token(112233).as_deref(), Some("a9b8c7"));
}

#[test]
fn immediately_issued_order_returns_the_matching_chain_entry() {
    let fake = FakeCa::start(|request| {
        if let Some(reply) = product_routes(request, "ssl_plus") {
            return reply;
        }
        let url = request.url.as_str();
        if url == "/services/v2/organization" || url.starts_with("/services/v2/organization?") {
            return (
                200,
                serde_json::json!({
                    "organizations": [
                        {"id": 515, "status": "active", "name": "Example Corp", "display_name": "Example Corp"}
                    ]
                })
                .to_string(),
            );
        }
        if url == "/services/v2/order/certificate/ssl_plus" {
            return (
                200,
                serde_json::json!({
                    "id": 5150,
                    "certificate_id": 6160,
                    "requests": [],
                    "certificate_chain": [
                        {"subject_common_name": "EXAMPLE.COM", "pem": sample_pem()},
                        {"subject_common_name": "Example Issuing CA", "pem": "ISSUER"}
                    ]
                })
                .to_string(),
            );
        }
        if url == "/services/v2/order/certificate/5150" {
            return (
                200,
                serde_json::json!({
                    "id": 5150,
                    "status": "issued",
                    "certificate": {"id": 6160, "status": "issued"},
                    "product": {"name_id": "ssl_plus"},
                    "requests": []
                })
                .to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let product_info = ProductInfo {
        product_id: "ssl_plus".to_string(),
        parameters: HashMap::new(),
    };
    let mut sans = HashMap::new();
    sans.insert("Dns".to_string(), vec!["example.com".to_string()]);
    let outcome = connector
        .enroll(
            &EmptyReader,
            "CSRPEM",
            "CN=example.com, O=Example Corp",
            &sans,
            &product_info,
            EnrollmentType::New,
        )
        .expect("enroll");

    assert_eq!(outcome.disposition, Disposition::Issued);
    assert_eq!(outcome.ca_request_id.as_deref(), Some("5150-6160"));
    // Case-insensitive common-name match selects the leaf, not the issuer.
    assert_eq!(outcome.certificate.as_deref(), Some(sample_pem().as_str()));

    let order_posts = fake.requests_matching("/order/certificate/ssl_plus");
    assert!(order_posts[0].body.contains("\"organization\":{\"id\":\"515\"}"));
}

#[test]
fn enrollment_error_envelope_maps_to_failed() {
    let fake = FakeCa::start(|request| {
        if let Some(reply) = product_routes(request, "dv_ssl_certificate") {
            return reply;
        }
        if request.url == "/services/v2/order/certificate/dv_ssl_certificate" {
            return (
                400,
                error_body("invalid_csr", "The CSR could not be parsed"),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let product_info = ProductInfo {
        product_id: "dv_ssl_certificate".to_string(),
        parameters: HashMap::new(),
    };
    let outcome = connector
        .enroll(
            &EmptyReader,
            "BADCSR",
            "CN=example.com",
            &HashMap::new(),
            &product_info,
            EnrollmentType::New,
        )
        .expect("enrollment errors are outcomes, not failures");

    assert_eq!(outcome.disposition, Disposition::Failed);
    assert_eq!(outcome.message.as_deref(), Some("The CSR could not be parsed"));
    assert!(outcome.ca_request_id.is_none());
}

#[test]
fn unknown_organization_fails_enrollment() {
    let fake = FakeCa::start(|request| {
        if let Some(reply) = product_routes(request, "ssl_plus") {
            return reply;
        }
        let url = request.url.as_str();
        if url.starts_with("/services/v2/organization") {
            return (200, serde_json::json!({"organizations": []}).to_string());
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let product_info = ProductInfo {
        product_id: "ssl_plus".to_string(),
        parameters: HashMap::new(),
    };
    let result = connector.enroll(
        &EmptyReader,
        "CSRPEM",
        "CN=example.com, O=Ghost Org",
        &HashMap::new(),
        &product_info,
        EnrollmentType::New,
    );
    let err = result.expect_err("unknown org must fail");
    assert!(err.to_string().contains("Ghost Org"));
}

#[test]
fn renew_with_remaining_validity_upgrades_to_reissue() {
    let fake = FakeCa::start(|request| {
        if let Some(reply) = product_routes(request, "ssl_plus") {
            return reply;
        }
        let url = request.url.as_str();
        if url.starts_with("/services/v2/organization") {
            return (
                200,
                serde_json::json!({
                    "organizations": [
                        {"id": 515, "status": "active", "name": "Example Corp", "display_name": "Example Corp"}
                    ]
                })
                .to_string(),
            );
        }
        if url == "/services/v2/order/certificate/9100" {
            // Order validity runs far past the 90-day renewal window.
            let far_future = chrono::Utc::now().date_naive() + chrono::Duration::days(400);
            return (
                200,
                serde_json::json!({
                    "id": 9100,
                    "status": "issued",
                    "certificate": {"id": 9200, "status": "issued"},
                    "order_valid_till": far_future.format("%Y-%m-%d").to_string(),
                    "product": {"name_id": "ssl_plus"},
                    "requests": []
                })
                .to_string(),
            );
        }
        if url == "/services/v2/order/certificate/9100/reissue" {
            return (
                200,
                serde_json::json!({
                    "id": 9100,
                    "certificate_id": 9300,
                    "requests": []
                })
                .to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });

    let connector = connector_for(&fake);
    let reader = PriorCertReader {
        ca_request_id: "9100-9200".to_string(),
    };
    let mut parameters = HashMap::new();
    parameters.insert("PriorCertSN".to_string(), "0a1b2c3d".to_string());
    let product_info = ProductInfo {
        product_id: "ssl_plus".to_string(),
        parameters,
    };
    let outcome = connector
        .enroll(
            &reader,
            "CSRPEM",
            "CN=example.com, O=Example Corp",
            &HashMap::new(),
            &product_info,
            EnrollmentType::Renew,
        )
        .expect("enroll");

    // The renewal was silently converted to a reissue.
    let reissues = fake.requests_matching("/9100/reissue");
    assert_eq!(reissues.len(), 1);
    assert!(reissues[0].body.contains("\"skip_approval\":true"));
    assert_eq!(outcome.ca_request_id.as_deref(), Some("9100-9300"));
}
