//! Product catalog operations: the account's product list and per-product
//! constraint details.

use serde::{Deserialize, Serialize};

use super::CaOperation;
use crate::client::transport::Method;

#[derive(Debug, Clone, Default)]
pub struct ProductListRequest;

impl CaOperation for ProductListRequest {
    type Response = ProductListResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        "services/v2/product".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductSummary {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub name_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListResponse {
    #[serde(default)]
    pub products: Vec<ProductSummary>,
}

#[derive(Debug, Clone)]
pub struct ProductDetailsRequest {
    pub name_id: String,
    /// Scopes the lookup when the account uses per-division product
    /// settings.
    pub container_id: Option<i32>,
}

impl ProductDetailsRequest {
    pub fn new(name_id: impl Into<String>, container_id: Option<i32>) -> Self {
        Self {
            name_id: name_id.into(),
            container_id,
        }
    }
}

impl CaOperation for ProductDetailsRequest {
    type Response = ProductDetailsResponse;

    fn method(&self) -> Method {
        Method::Get
    }

    fn resource(&self) -> String {
        format!("services/v2/product/{}", self.name_id)
    }

    fn query(&self) -> Option<String> {
        self.container_id.map(|id| format!("container_id={id}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowedHashType {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureHashTypes {
    #[serde(default)]
    pub allowed_hash_types: Vec<AllowedHashType>,
    #[serde(default)]
    pub default_hash_type_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductDetailsResponse {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub name_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub duplicates_allowed: bool,
    #[serde(default)]
    pub allowed_validity_years: Vec<i32>,
    #[serde(default)]
    pub signature_hash_types: SignatureHashTypes,
    #[serde(default)]
    pub additional_dns_names_allowed: bool,
    #[serde(default)]
    pub custom_expiration_date_allowed: bool,
    #[serde(default)]
    pub csr_required: bool,
}
