//! Account-scoped lookups: organizations, domains, containers, custom
//! metadata fields, and the account-wide request feed.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{CaOperation, IdInformation, ProductRef, ca_datetime_opt};
use crate::client::transport::Method;

#[derive(Debug, Clone)]
pub struct ListOrganizationsRequest {
    pub container_id: Option<i32>,
    pub include_validation: bool,
    /// Restrict the listing to active organizations; on by default.
    pub active_only: bool,
}

impl Default for ListOrganizationsRequest {
    fn default() -> Self {
        Self {
            container_id: None,
            include_validation: false,
            active_only: true,
        }
    }
}

impl CaOperation for ListOrganizationsRequest {
    type Response = ListOrganizationsResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/organization".to_string()
    }

    fn query(&self) -> Option<String> {
        let mut query = format!("include_validation={}", self.include_validation);
        if let Some(container_id) = self.container_id {
            query.push_str(&format!("&container_id={container_id}"));
        }
        if self.active_only {
            query.push_str("&filters[status]=active");
        }
        Some(query)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgContainer {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub parent_id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Organization {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub container: Option<OrgContainer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrganizationsResponse {
    #[serde(default)]
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Clone, Default)]
pub struct ListDomainsRequest {
    pub container_id: Option<i32>,
    pub include_validation: bool,
}

impl CaOperation for ListDomainsRequest {
    type Response = ListDomainsResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/domain".to_string()
    }

    fn query(&self) -> Option<String> {
        let mut query = format!("include_validation={}", self.include_validation);
        if let Some(container_id) = self.container_id {
            query.push_str(&format!("&container_id={container_id}"));
        }
        Some(query)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainOrganization {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainDetails {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "ca_datetime_opt")]
    pub date_created: Option<NaiveDateTime>,
    #[serde(default)]
    pub organization: Option<DomainOrganization>,
    #[serde(default)]
    pub container: Option<IdInformation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDomainsResponse {
    #[serde(default)]
    pub domains: Vec<DomainDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct ListContainersRequest;

impl CaOperation for ListContainersRequest {
    type Response = ListContainersResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/container".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub parent_id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListContainersResponse {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default)]
pub struct ListMetadataRequest;

impl CaOperation for ListMetadataRequest {
    type Response = ListMetadataResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/account/metadata".to_string()
    }
}

/// One account-defined custom metadata field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataField {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "is_required")]
    pub required: bool,
    #[serde(default, rename = "is_active")]
    pub active: bool,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMetadataResponse {
    #[serde(default, rename = "metadata")]
    pub metadata_fields: Vec<MetadataField>,
}

/// Account-wide request feed, optionally filtered by status
/// (`pending`, `approved`, `rejected`).
#[derive(Debug, Clone, Default)]
pub struct ListRequestsRequest {
    pub status: Option<String>,
}

impl CaOperation for ListRequestsRequest {
    type Response = ListRequestsResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/request".to_string()
    }

    fn query(&self) -> Option<String> {
        self.status
            .as_ref()
            .filter(|status| !status.is_empty())
            .map(|status| format!("status={status}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPerson {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOrderRef {
    #[serde(default)]
    pub id: i32,
    #[serde(default)]
    pub product: Option<ProductRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRequest {
    #[serde(default)]
    pub id: i32,
    #[serde(default, with = "ca_datetime_opt")]
    pub date: Option<NaiveDateTime>,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub requester: Option<RequestPerson>,
    #[serde(default)]
    pub processor: Option<RequestPerson>,
    #[serde(default)]
    pub order: Option<RequestOrderRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRequestsResponse {
    #[serde(default)]
    pub requests: Vec<AccountRequest>,
}
