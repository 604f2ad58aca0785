//! Typed request/response shapes for the CA's REST API.
//!
//! Every operation is a (request, response) pair. Requests know their
//! method, resource path, and how to serialize themselves; responses
//! deserialize from the raw body after envelope classification.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::transport::{ApiRequest, Credential, Method, RawResponse};
use crate::error::ConnectorError;

pub mod account;
pub mod certificate;
pub mod orders;
pub mod products;

/// Classified outcome of a CA response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
    Warning,
}

/// One structured error from the CA's error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// A CA API operation: knows its own wire shape and names its response
/// type. The client sends any `CaOperation` generically.
pub trait CaOperation {
    type Response: DeserializeOwned + Default;

    fn method(&self) -> Method;
    fn resource(&self) -> String;
    fn query(&self) -> Option<String> {
        None
    }
    fn body(&self) -> Option<String> {
        None
    }

    fn api_request(&self, credential: Credential) -> ApiRequest {
        ApiRequest {
            method: self.method(),
            resource: self.resource(),
            query: self.query(),
            body: self.body(),
            credential,
        }
    }
}

/// A deserialized response plus its envelope classification. Callers
/// decide per operation whether an error envelope is fatal or recoverable.
#[derive(Debug)]
pub struct Envelope<T> {
    pub status: ResponseStatus,
    pub errors: Vec<ApiError>,
    payload: Option<T>,
}

/// Builds an error envelope from a raw response, without requiring the
/// success payload type to be deserializable.
pub(crate) fn error_envelope<T>(raw: &RawResponse) -> Envelope<T> {
    let errors = match serde_json::from_str::<ErrorPayload>(&raw.body) {
        Ok(payload) if !payload.errors.is_empty() => payload.errors,
        _ => vec![ApiError {
            code: format!("http_{}", raw.status),
            message: raw.body.clone(),
        }],
    };
    Envelope {
        status: ResponseStatus::Error,
        errors,
        payload: None,
    }
}

impl<T: DeserializeOwned + Default> Envelope<T> {
    /// Classifies and deserializes a raw response.
    ///
    /// A body containing the substring `"errors"` is treated as an error
    /// payload; this matches the CA's observed behavior but would
    /// misclassify a success payload that mentions the word in free text.
    /// A non-2xx HTTP status also forces error classification.
    pub fn from_raw(raw: &RawResponse) -> Envelope<T> {
        if !raw.success || raw.body.contains("errors") {
            return error_envelope(raw);
        }

        // 204 No Content responses have nothing to deserialize.
        if raw.body.trim().is_empty() {
            return Envelope {
                status: ResponseStatus::Success,
                errors: Vec::new(),
                payload: Some(T::default()),
            };
        }

        match serde_json::from_str::<T>(&raw.body) {
            Ok(payload) => Envelope {
                status: ResponseStatus::Success,
                errors: Vec::new(),
                payload: Some(payload),
            },
            Err(err) => Envelope {
                status: ResponseStatus::Error,
                errors: vec![ApiError {
                    code: "invalid_response".to_string(),
                    message: err.to_string(),
                }],
                payload: None,
            },
        }
    }
}

impl<T> Envelope<T> {
    pub fn success(payload: T) -> Envelope<T> {
        Envelope {
            status: ResponseStatus::Success,
            errors: Vec::new(),
            payload: Some(payload),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Envelope<T> {
        Envelope {
            status: ResponseStatus::Error,
            errors: vec![ApiError {
                code: code.into(),
                message: message.into(),
            }],
            payload: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn first_error_message(&self) -> String {
        self.errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_default()
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Treats an error envelope as fatal, yielding the payload otherwise.
    pub fn into_payload(self, context: &str) -> Result<T, ConnectorError> {
        if self.is_error() {
            let detail = self
                .errors
                .iter()
                .map(|e| format!("{} - {}", e.code, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConnectorError::Operation(format!("{context}: {detail}")));
        }
        self.payload
            .ok_or_else(|| ConnectorError::Operation(format!("{context}: empty response")))
    }
}

/// `{id, name}` pair used across several operations. Ids are strings on
/// the wire even when numeric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdInformation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Pagination block on list responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub total: i32,
    #[serde(default)]
    pub page: i32,
    #[serde(default)]
    pub offset: i32,
}

/// Product reference embedded in order payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub name_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// The CA emits timestamps as `2021-01-05 12:34:56` (no timezone); some
/// newer endpoints use RFC 3339. Accept both, emit the space-separated
/// form.
pub(crate) mod ca_datetime_opt {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.format(WIRE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else { return Ok(None) };
        if raw.is_empty() {
            return Ok(None);
        }
        parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized CA timestamp '{raw}'")))
    }

    pub(crate) fn parse(raw: &str) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, WIRE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|_| {
                chrono::DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc())
            })
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}

/// Plain `YYYY-MM-DD` dates (order validity bounds, custom expirations).
pub(crate) mod ca_date_opt {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const WIRE_FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer.serialize_str(&date.format(WIRE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        let Some(raw) = raw else { return Ok(None) };
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(&raw, WIRE_FORMAT)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("unrecognized CA date '{raw}'")))
    }
}
