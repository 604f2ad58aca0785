//! Certificate order operations: placing, viewing, listing, reissuing,
//! revoking, and the status-changes feed used by incremental sync.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CaOperation, IdInformation, PageInfo, ProductRef, ca_date_opt, ca_datetime_opt};
use crate::client::transport::Method;

/// Certificate block of a new-order body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderCertificate {
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    pub csr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_units: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderContainer {
    pub id: i32,
}

/// Custom metadata value attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomFieldValue {
    pub metadata_id: i32,
    pub value: String,
}

/// Body of `POST order/certificate/{product_code}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderRequest {
    #[serde(skip)]
    pub product_code: String,
    pub certificate: OrderCertificate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<IdInformation>,
    pub validity_years: i32,
    #[serde(skip_serializing_if = "Option::is_none", with = "ca_date_opt")]
    pub custom_expiration_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub disable_renewal_notifications: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewal_of_order_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dcv_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<OrderContainer>,
    pub custom_fields: Vec<CustomFieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

impl OrderRequest {
    pub fn new(product_code: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            ..Default::default()
        }
    }

    pub fn set_organization(&mut self, organization_id: Option<i32>) {
        self.organization = organization_id.map(|id| IdInformation {
            id: id.to_string(),
            name: None,
        });
    }
}

impl CaOperation for OrderRequest {
    type Response = OrderResponse;

    fn method(&self) -> Method {
        Method::Post
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}", self.product_code)
    }

    fn body(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Sub-request attached to an order response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRequestRef {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateChainElement {
    #[serde(default)]
    pub subject_common_name: String,
    #[serde(default)]
    pub pem: String,
}

/// Response to both order and reissue calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderResponse {
    /// The order id.
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub requests: Vec<OrderRequestRef>,
    #[serde(default)]
    pub certificate_id: Option<i32>,
    /// Present when the certificate was issued immediately.
    #[serde(default)]
    pub certificate_chain: Option<Vec<CertificateChainElement>>,
    #[serde(default)]
    pub dcv_random_value: Option<String>,
}

/// Certificate block of a reissue body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReissueCertificate {
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    pub csr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_id: Option<String>,
}

/// Body of `POST order/certificate/{order_id}/reissue`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReissueRequest {
    #[serde(skip)]
    pub order_id: i32,
    pub certificate: ReissueCertificate,
    /// Without this the CA withholds the certificate id until a portal
    /// approval happens.
    pub skip_approval: bool,
}

impl CaOperation for ReissueRequest {
    type Response = OrderResponse;

    fn method(&self) -> Method {
        Method::Post
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}/reissue", self.order_id)
    }

    fn body(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[derive(Debug, Clone)]
pub struct ViewCertificateOrderRequest {
    pub order_id: i32,
}

impl CaOperation for ViewCertificateOrderRequest {
    type Response = ViewCertificateOrderResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}", self.order_id)
    }
}

/// Certificate details nested in order views, duplicate and reissue
/// listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateOrder {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub thumbprint: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default, with = "ca_datetime_opt")]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default, with = "ca_date_opt")]
    pub valid_from: Option<NaiveDate>,
    #[serde(default, with = "ca_date_opt")]
    pub valid_till: Option<NaiveDate>,
    #[serde(default)]
    pub organization_units: Vec<String>,
    #[serde(default)]
    pub signature_hash: Option<String>,
    #[serde(default)]
    pub key_size: Option<i32>,
}

/// Sub-request history entry on an order view (`type` is one of new,
/// reissue, revoke, duplicate).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSummary {
    #[serde(default)]
    pub id: i32,
    #[serde(default, with = "ca_datetime_opt")]
    pub date: Option<NaiveDateTime>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewCertificateOrderResponse {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub certificate: CertificateOrder,
    #[serde(default)]
    pub status: String,
    #[serde(default, with = "ca_datetime_opt")]
    pub date_created: Option<NaiveDateTime>,
    /// Order-level validity bound; outlives the current certificate on
    /// multi-year orders.
    #[serde(default, with = "ca_date_opt")]
    pub order_valid_till: Option<NaiveDate>,
    #[serde(default)]
    pub product: ProductRef,
    #[serde(default)]
    pub requests: Vec<RequestSummary>,
    #[serde(default)]
    pub dcv_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListCertificateOrdersRequest {
    pub limit: i32,
    pub offset: i32,
    /// Adds a `valid_till` filter so expired orders are not returned.
    pub ignore_expired: bool,
}

impl Default for ListCertificateOrdersRequest {
    fn default() -> Self {
        Self {
            limit: 1000,
            offset: 0,
            ignore_expired: false,
        }
    }
}

impl CaOperation for ListCertificateOrdersRequest {
    type Response = ListCertificateOrdersResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/order/certificate".to_string()
    }

    fn query(&self) -> Option<String> {
        let mut query = format!("limit={}&offset={}", self.limit, self.offset);
        if self.ignore_expired {
            let today = Utc::now().date_naive().format("%Y-%m-%d");
            query.push_str(&format!("&filters[valid_till]=>{today}"));
        }
        Some(query)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateSummary {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    #[serde(default)]
    pub signature_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub certificate: CertificateSummary,
    #[serde(default)]
    pub status: String,
    #[serde(default, with = "ca_datetime_opt")]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default)]
    pub product: Option<ProductRef>,
    #[serde(default)]
    pub has_duplicates: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCertificateOrdersResponse {
    #[serde(default)]
    pub orders: Vec<OrderSummary>,
    #[serde(default)]
    pub page: PageInfo,
}

/// Time-windowed feed of orders whose status changed; drives incremental
/// sync. The bounds use the CA's unpadded date format.
#[derive(Debug, Clone)]
pub struct StatusChangesRequest {
    pub from: String,
    pub to: String,
}

impl CaOperation for StatusChangesRequest {
    type Response = StatusChangesResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!(
            "services/v2/order/certificate/status-changes?filters[status_last_updated]={}...{}",
            self.from, self.to
        )
    }
}

/// One `(order, certificate, status)` tuple from the feed; also the sync
/// engine's working record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusOrder {
    #[serde(default)]
    pub order_id: i32,
    #[serde(default)]
    pub certificate_id: i32,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusChangesResponse {
    #[serde(default)]
    pub orders: Vec<StatusOrder>,
}

#[derive(Debug, Clone)]
pub struct ListDuplicatesRequest {
    pub order_id: i32,
}

impl CaOperation for ListDuplicatesRequest {
    type Response = CertificateListResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}/duplicate", self.order_id)
    }
}

#[derive(Debug, Clone)]
pub struct ListReissuesRequest {
    pub order_id: i32,
}

impl CaOperation for ListReissuesRequest {
    type Response = CertificateListResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}/reissue", self.order_id)
    }
}

/// Shared response shape of the duplicate and reissue listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateListResponse {
    #[serde(default)]
    pub certificates: Vec<CertificateOrder>,
}

/// `PUT certificate/{certificate_id}/revoke`; revokes one certificate.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevokeCertificateRequest {
    #[serde(skip)]
    pub certificate_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl CaOperation for RevokeCertificateRequest {
    type Response = RevokeResponse;

    fn method(&self) -> Method {
        Method::Put
    }

    fn resource(&self) -> String {
        format!("services/v2/certificate/{}/revoke", self.certificate_id)
    }

    fn body(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// `PUT order/certificate/{order_id}/revoke`; revokes every certificate
/// on the order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RevokeOrderRequest {
    #[serde(skip)]
    pub order_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl CaOperation for RevokeOrderRequest {
    type Response = RevokeResponse;

    fn method(&self) -> Method {
        Method::Put
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}/revoke", self.order_id)
    }

    fn body(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

/// Revocation produces a request record that still needs approval; `id`
/// is that request's id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeResponse {
    #[serde(default)]
    pub id: i32,
    #[serde(default, with = "ca_datetime_opt")]
    pub date: Option<NaiveDateTime>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub comments: Option<String>,
}

/// `PUT request/{request_id}/status`; success is 204 No Content.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateRequestStatusRequest {
    #[serde(skip)]
    pub request_id: i32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_comment: Option<String>,
}

impl UpdateRequestStatusRequest {
    pub fn new(request_id: i32, status: impl Into<String>) -> Self {
        Self {
            request_id,
            status: status.into(),
            processor_comment: None,
        }
    }
}

impl CaOperation for UpdateRequestStatusRequest {
    type Response = UpdateRequestStatusResponse;

    fn method(&self) -> Method {
        Method::Put
    }

    fn resource(&self) -> String {
        format!("services/v2/request/{}/status", self.request_id)
    }

    fn body(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequestStatusResponse {}

#[derive(Debug, Clone)]
pub struct CheckDcvRequest {
    pub order_id: i32,
}

impl CaOperation for CheckDcvRequest {
    type Response = CheckDcvResponse;

    fn method(&self) -> Method {
        Method::Put
    }

    fn resource(&self) -> String {
        format!("services/v2/order/certificate/{}/check-dcv", self.order_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckDcvResponse {
    #[serde(default)]
    pub dcv_status: String,
    #[serde(default)]
    pub order_status: String,
}
