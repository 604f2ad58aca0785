//! CertCentral CA gateway connector.
//!
//! Library a certificate-lifecycle host loads to issue, renew, reissue,
//! revoke, and synchronize certificates through a CertCentral-style REST
//! API. The host owns the process, the record store, and scheduling; this
//! crate owns the CA client, status normalization, the product catalog
//! cache, enrollment orchestration, and inventory sync.

pub mod api;
pub mod cancel;
pub mod catalog;
pub mod client;
pub mod config;
pub mod connector;
pub mod enroll;
pub mod error;
pub mod record;
pub mod status;
pub mod sync;

pub use cancel::CancellationToken;
pub use catalog::{ProductCatalog, ProductType};
pub use client::CertCentralClient;
pub use config::{DcvMethod, GatewayConfig, Region};
pub use connector::CertCentralConnector;
pub use error::ConnectorError;
pub use record::{
    CertificateBodyTransform, CertificateDataReader, CertificateRecord, EnrollmentOutcome,
    EnrollmentType, ProductInfo, RecordSink, SyncInfo,
};
pub use status::{Disposition, normalize_order_status};
