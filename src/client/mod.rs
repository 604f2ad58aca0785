//! Thin typed client over the CA transport. One method per API
//! operation; each returns the deserialized payload wrapped in its
//! envelope classification so callers choose how to treat CA errors.

pub mod transport;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, warn};

use crate::api::account::{
    ListContainersRequest, ListContainersResponse, ListDomainsRequest, ListDomainsResponse,
    ListMetadataRequest, ListMetadataResponse, ListOrganizationsRequest,
    ListOrganizationsResponse, ListRequestsRequest, ListRequestsResponse,
};
use crate::api::certificate::{
    CertificateChainRequest, CertificateChainResponse, DownloadCertificateRequest,
    DownloadedCertificate, FORMAT_P7B,
};
use crate::api::orders::{
    CertificateListResponse, CheckDcvRequest, CheckDcvResponse, ListCertificateOrdersRequest,
    ListCertificateOrdersResponse, ListDuplicatesRequest, ListReissuesRequest, OrderRequest,
    OrderResponse, OrderSummary, ReissueRequest, RevokeCertificateRequest, RevokeOrderRequest,
    RevokeResponse, StatusChangesRequest, StatusChangesResponse, UpdateRequestStatusRequest,
    UpdateRequestStatusResponse, ViewCertificateOrderRequest, ViewCertificateOrderResponse,
};
use crate::api::products::{
    ProductDetailsRequest, ProductDetailsResponse, ProductListRequest, ProductListResponse,
};
use crate::api::{CaOperation, Envelope, PageInfo};
use crate::config::GatewayConfig;
use crate::record::{CertificateBodyTransform, strip_pem_armor};
use transport::{ApiRequest, Credential, HttpTransport, Method, Transport, TransportError};

pub struct CertCentralClient {
    transport: Box<dyn Transport>,
}

impl CertCentralClient {
    /// Builds a client over the live HTTP transport for the configured
    /// endpoint and credentials.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let transport = HttpTransport::new(
            config.endpoint(),
            config.api_key.clone(),
            config.api_requestor_key.clone(),
        );
        Self {
            transport: Box::new(transport),
        }
    }

    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    fn call<O: CaOperation>(
        &self,
        operation: &O,
        credential: Credential,
    ) -> Result<Envelope<O::Response>, TransportError> {
        let raw = self.transport.send(&operation.api_request(credential))?;
        Ok(Envelope::from_raw(&raw))
    }

    pub fn list_organizations(
        &self,
        request: &ListOrganizationsRequest,
    ) -> Result<Envelope<ListOrganizationsResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn list_domains(
        &self,
        request: &ListDomainsRequest,
    ) -> Result<Envelope<ListDomainsResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn list_containers(
        &self,
        request: &ListContainersRequest,
    ) -> Result<Envelope<ListContainersResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn list_metadata(
        &self,
        request: &ListMetadataRequest,
    ) -> Result<Envelope<ListMetadataResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn list_requests(
        &self,
        request: &ListRequestsRequest,
    ) -> Result<Envelope<ListRequestsResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn product_list(&self) -> Result<Envelope<ProductListResponse>, TransportError> {
        self.call(&ProductListRequest, Credential::Admin)
    }

    pub fn product_details(
        &self,
        request: &ProductDetailsRequest,
    ) -> Result<Envelope<ProductDetailsResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn order_certificate(
        &self,
        request: &OrderRequest,
        admin: bool,
    ) -> Result<Envelope<OrderResponse>, TransportError> {
        let credential = if admin {
            Credential::Admin
        } else {
            Credential::Requestor
        };
        self.call(request, credential)
    }

    pub fn reissue_certificate(
        &self,
        request: &ReissueRequest,
        admin: bool,
    ) -> Result<Envelope<OrderResponse>, TransportError> {
        let credential = if admin {
            Credential::Admin
        } else {
            Credential::Requestor
        };
        self.call(request, credential)
    }

    pub fn view_certificate_order(
        &self,
        order_id: i32,
    ) -> Result<Envelope<ViewCertificateOrderResponse>, TransportError> {
        self.call(&ViewCertificateOrderRequest { order_id }, Credential::Admin)
    }

    pub fn list_duplicates(
        &self,
        order_id: i32,
    ) -> Result<Envelope<CertificateListResponse>, TransportError> {
        self.call(&ListDuplicatesRequest { order_id }, Credential::Admin)
    }

    pub fn list_reissues(
        &self,
        order_id: i32,
    ) -> Result<Envelope<CertificateListResponse>, TransportError> {
        self.call(&ListReissuesRequest { order_id }, Credential::Admin)
    }

    pub fn status_changes(
        &self,
        request: &StatusChangesRequest,
    ) -> Result<Envelope<StatusChangesResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn revoke_certificate(
        &self,
        request: &RevokeCertificateRequest,
    ) -> Result<Envelope<RevokeResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn revoke_order(
        &self,
        request: &RevokeOrderRequest,
    ) -> Result<Envelope<RevokeResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn update_request_status(
        &self,
        request: &UpdateRequestStatusRequest,
    ) -> Result<Envelope<UpdateRequestStatusResponse>, TransportError> {
        self.call(request, Credential::Admin)
    }

    pub fn check_dcv(
        &self,
        order_id: i32,
    ) -> Result<Envelope<CheckDcvResponse>, TransportError> {
        self.call(&CheckDcvRequest { order_id }, Credential::Admin)
    }

    pub fn certificate_chain(
        &self,
        certificate_id: i32,
    ) -> Result<Envelope<CertificateChainResponse>, TransportError> {
        self.call(
            &CertificateChainRequest { certificate_id },
            Credential::Admin,
        )
    }

    /// Downloads a certificate body in the requested format. The response
    /// is raw text rather than JSON; `p7b` bodies are returned verbatim
    /// for the caller's byte transform.
    pub fn download_certificate(
        &self,
        request: &DownloadCertificateRequest,
    ) -> Result<Envelope<DownloadedCertificate>, TransportError> {
        let raw = self.transport.send(&ApiRequest {
            method: Method::Get,
            resource: request.resource(),
            query: None,
            body: None,
            credential: Credential::Admin,
        })?;
        if !raw.success || raw.body.contains("errors") {
            return Ok(crate::api::error_envelope(&raw));
        }
        Ok(Envelope::success(DownloadedCertificate {
            certificate: raw.body.replace("\r\n", ""),
        }))
    }

    /// Downloads a certificate body and normalizes it per format: PEM
    /// formats come back with line breaks collapsed, while `p7b` bundles
    /// are handed to the host's byte transform to extract the newest leaf.
    pub fn download_certificate_body(
        &self,
        certificate_id: i32,
        format_type: &str,
        transform: &dyn CertificateBodyTransform,
    ) -> Result<Envelope<DownloadedCertificate>, TransportError> {
        let request = DownloadCertificateRequest::with_format(certificate_id, format_type);
        let downloaded = self.download_certificate(&request)?;
        if downloaded.is_error() || format_type != FORMAT_P7B {
            return Ok(downloaded);
        }

        let body = downloaded
            .payload()
            .map(|d| d.certificate.clone())
            .unwrap_or_default();
        let unwrapped = strip_pem_armor(&body)
            .and_then(|bare| {
                let der = BASE64.decode(bare.as_bytes())?;
                transform.newest_leaf_base64(&der)
            })
            .map_err(|err| {
                warn!(
                    "[ca-client] Unable to unwrap p7b body for certificate {certificate_id}: {err}"
                );
                err
            });
        match unwrapped {
            Ok(leaf) => Ok(Envelope::success(DownloadedCertificate { certificate: leaf })),
            Err(err) => Ok(Envelope::error("p7b_unwrap", err.to_string())),
        }
    }

    /// Enumerates every certificate order, following pagination until the
    /// accumulated count reaches the server-reported total. An error
    /// envelope on any page aborts and is returned as-is.
    pub fn list_all_certificate_orders(
        &self,
    ) -> Result<Envelope<ListCertificateOrdersResponse>, TransportError> {
        const BATCH: i32 = 1000;
        let mut orders: Vec<OrderSummary> = Vec::new();
        let mut total;

        loop {
            let request = ListCertificateOrdersRequest {
                limit: BATCH,
                offset: orders.len() as i32,
                ignore_expired: false,
            };
            let envelope = self.call(&request, Credential::Admin)?;
            if envelope.is_error() {
                return Ok(envelope);
            }
            let page = envelope
                .payload()
                .cloned()
                .unwrap_or_default();
            total = page.page.total;
            // An empty page with rows still outstanding means the server's
            // total is wrong; bail out rather than spin on the same offset.
            if page.orders.is_empty() {
                break;
            }
            orders.extend(page.orders);
            debug!(
                "[ca-client] Listed {} of {} certificate orders",
                orders.len(),
                total
            );
            if orders.len() as i32 >= total {
                break;
            }
        }

        Ok(Envelope::success(ListCertificateOrdersResponse {
            orders,
            page: PageInfo {
                total,
                ..PageInfo::default()
            },
        }))
    }
}
