use std::collections::HashMap;

use certcentral_gateway::{
    CertCentralClient, CertCentralConnector, GatewayConfig, ProductCatalog, ProductInfo,
};

use crate::fake_ca::{FakeCa, error_body};

fn client_for(fake: &FakeCa) -> CertCentralClient {
    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    CertCentralClient::from_config(&config)
}

fn details_body(name_id: &str, name: &str) -> String {
    serde_json::json!({
        "name_id": name_id,
        "name": name,
        "type": "ssl_certificate",
        "allowed_validity_years": [1, 2],
        "signature_hash_types": {
            "allowed_hash_types": [{"id": "sha256", "name": "SHA-256"}],
            "default_hash_type_id": "sha256"
        },
        "additional_dns_names_allowed": true
    })
    .to_string()
}

#[test]
fn catalog_is_fetched_once_and_reused() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url == "/services/v2/product" {
            return (
                200,
                serde_json::json!({
                    "products": [
                        {"name_id": "ssl_plus", "name": "Standard SSL", "type": "ssl_certificate"}
                    ]
                })
                .to_string(),
            );
        }
        if url.starts_with("/services/v2/product/ssl_plus") {
            return (200, details_body("ssl_plus", "Standard SSL"));
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_for(&fake);
    let catalog = ProductCatalog::new();
    let first = catalog.all_types(&client, None).expect("first population");
    let second = catalog.all_types(&client, None).expect("cached read");
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].product_code, "ssl_plus");
    assert_eq!(second[0].signature_algorithm.as_deref(), Some("sha256"));

    // One list fetch and one detail fetch, despite two catalog reads.
    assert_eq!(fake.requests_matching("/services/v2/product").len(), 2);
}

#[test]
fn catalog_skips_products_whose_details_fail() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url == "/services/v2/product" {
            return (
                200,
                serde_json::json!({
                    "products": [
                        {"name_id": "ssl_plus", "name": "Standard SSL", "type": "ssl_certificate"},
                        {"name_id": "ssl_broken", "name": "Broken SSL", "type": "ssl_certificate"}
                    ]
                })
                .to_string(),
            );
        }
        if url.starts_with("/services/v2/product/ssl_plus") {
            return (200, details_body("ssl_plus", "Standard SSL"));
        }
        if url.starts_with("/services/v2/product/ssl_broken") {
            return (500, error_body("internal_error", "details unavailable"));
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_for(&fake);
    let catalog = ProductCatalog::new();
    let types = catalog.all_types(&client, None).expect("permissive build");
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].product_code, "ssl_plus");
}

#[test]
fn catalog_build_fails_when_the_product_list_fails() {
    let fake = FakeCa::start(|_| (401, error_body("unauthorized", "bad key")));
    let client = client_for(&fake);
    let catalog = ProductCatalog::new();
    assert!(catalog.all_types(&client, None).is_err());
}

#[test]
fn denylisted_products_are_marked_enrollment_unavailable() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url == "/services/v2/product" {
            return (
                200,
                serde_json::json!({
                    "products": [
                        {"name_id": "code_signing", "name": "Code Signing", "type": "code_signing_certificate"}
                    ]
                })
                .to_string(),
            );
        }
        if url.starts_with("/services/v2/product/code_signing") {
            return (200, details_body("code_signing", "Code Signing"));
        }
        (404, error_body("not_found", "no route"))
    });

    let client = client_for(&fake);
    let catalog = ProductCatalog::new();
    let types = catalog.all_types(&client, None).expect("build");
    assert!(types[0].enrollment_unavailable);
    assert_eq!(types[0].display_name, "Code Signing (Enrollment Unavailable)");
}

#[test]
fn validate_product_info_lists_known_ids_on_mismatch() {
    let fake = FakeCa::start(|request| {
        let url = request.url.as_str();
        if url == "/services/v2/product" {
            return (
                200,
                serde_json::json!({
                    "products": [
                        {"name_id": "ssl_plus", "name": "Standard SSL", "type": "ssl_certificate"},
                        {"name_id": "ssl_ev", "name": "EV SSL", "type": "ssl_certificate"}
                    ]
                })
                .to_string(),
            );
        }
        if url.starts_with("/services/v2/product/") {
            return (200, details_body("ssl_plus", "Standard SSL"));
        }
        (404, error_body("not_found", "no route"))
    });

    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    let connector = CertCentralConnector::initialize(config).expect("connector");

    let missing = ProductInfo {
        product_id: "no_such_product".to_string(),
        parameters: HashMap::new(),
    };
    let err = connector
        .validate_product_info(&missing, &HashMap::new())
        .expect_err("unknown product id");
    let message = err.to_string();
    assert!(message.contains("no_such_product"));
    assert!(message.contains("ssl_plus"));
    assert!(message.contains("ssl_ev"));

    let known = ProductInfo {
        product_id: "SSL_PLUS".to_string(),
        parameters: HashMap::new(),
    };
    connector
        .validate_product_info(&known, &HashMap::new())
        .expect("case-insensitive product match");
}

#[test]
fn connection_validation_collects_static_and_live_errors() {
    let fake = FakeCa::start(|_| (401, error_body("unauthorized", "bad key")));
    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    let connector = CertCentralConnector::initialize(config).expect("connector");

    let mut info = HashMap::new();
    info.insert("Region".to_string(), "MARS".to_string());
    let errors = connector.validate_connection_info(&info);
    assert!(errors.iter().any(|e| e.contains("API Key")));
    assert!(errors.iter().any(|e| e.contains("Region")));
    assert!(errors.iter().any(|e| e.contains("domains")));
}

#[test]
fn ping_surfaces_ca_errors() {
    let fake = FakeCa::start(|request| {
        if request.url.starts_with("/services/v2/domain") {
            return (401, error_body("unauthorized", "bad key"));
        }
        (404, error_body("not_found", "no route"))
    });
    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    let connector = CertCentralConnector::initialize(config).expect("connector");
    assert!(connector.ping().is_err());
}

#[test]
fn ping_succeeds_against_a_healthy_account() {
    let fake = FakeCa::start(|request| {
        if request.url.starts_with("/services/v2/domain") {
            return (
                200,
                serde_json::json!({"domains": [{"id": 1, "name": "example.com", "is_active": true}]})
                    .to_string(),
            );
        }
        (404, error_body("not_found", "no route"))
    });
    let config = GatewayConfig {
        api_key: "test-key".to_string(),
        endpoint: Some(fake.endpoint()),
        ..Default::default()
    };
    let connector = CertCentralConnector::initialize(config).expect("connector");
    connector.ping().expect("ping");
}
