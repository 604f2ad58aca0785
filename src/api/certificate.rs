//! Certificate retrieval: the chain endpoint and download-by-format.

use serde::Deserialize;

use super::CaOperation;
use super::orders::CertificateChainElement;
use crate::client::transport::Method;

#[derive(Debug, Clone)]
pub struct CertificateChainRequest {
    pub certificate_id: i32,
}

impl CaOperation for CertificateChainRequest {
    type Response = CertificateChainResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!("services/v2/certificate/{}/chain", self.certificate_id)
    }
}

/// The chain endpoint labels every entry an "intermediate"; index 0 is
/// the end-entity certificate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateChainResponse {
    #[serde(default, rename = "intermediates", alias = "Intermediates")]
    pub intermediates: Vec<CertificateChainElement>,
}

/// Download format for the raw certificate body endpoint.
pub const FORMAT_PEM_NOINTERMEDIATE: &str = "pem_nointermediate";
pub const FORMAT_P7B: &str = "p7b";

/// `GET certificate/{certificate_id}/download/format/{format_type}`.
/// The response is the raw certificate text, not JSON; the client handles
/// it outside the envelope machinery.
#[derive(Debug, Clone)]
pub struct DownloadCertificateRequest {
    pub certificate_id: i32,
    pub format_type: String,
}

impl DownloadCertificateRequest {
    pub fn new(certificate_id: i32) -> Self {
        Self {
            certificate_id,
            format_type: FORMAT_PEM_NOINTERMEDIATE.to_string(),
        }
    }

    pub fn with_format(certificate_id: i32, format_type: impl Into<String>) -> Self {
        Self {
            certificate_id,
            format_type: format_type.into(),
        }
    }

    pub fn resource(&self) -> String {
        format!(
            "services/v2/certificate/{}/download/format/{}",
            self.certificate_id, self.format_type
        )
    }
}

/// Normalized download result: the certificate body with line breaks
/// collapsed, as the host store expects.
#[derive(Debug, Clone, Default)]
pub struct DownloadedCertificate {
    pub certificate: String,
}
