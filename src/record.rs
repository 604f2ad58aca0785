//! Host-facing record model and the collaborator seams the core talks
//! through: the host's certificate store (read side), the sync record
//! sink (write side), and the opaque PKCS#7 body transform.

use std::collections::HashMap;
use std::sync::mpsc::SyncSender;

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::status::Disposition;

/// Builds the composite correlation id tying a host record to a CA
/// order/certificate pair.
pub fn ca_request_id(order_id: i32, certificate_id: i32) -> String {
    format!("{order_id}-{certificate_id}")
}

/// Splits a correlation id back into `(order_id, certificate_id)`.
pub fn parse_ca_request_id(ca_request_id: &str) -> Result<(i32, i32)> {
    let (order, certificate) = ca_request_id
        .split_once('-')
        .ok_or_else(|| anyhow!("malformed CA request id '{ca_request_id}'"))?;
    let order_id = order
        .parse::<i32>()
        .with_context(|| format!("bad order id in CA request id '{ca_request_id}'"))?;
    let certificate_id = certificate
        .parse::<i32>()
        .with_context(|| format!("bad certificate id in CA request id '{ca_request_id}'"))?;
    Ok((order_id, certificate_id))
}

/// A certificate record as the host persists it. The host store owns
/// these; the core only reads and writes them through the collaborator
/// interfaces below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Composite `{order_id}-{certificate_id}` correlation id.
    pub ca_request_id: String,
    /// Certificate body, raw base64 without PEM armor.
    pub certificate: Option<String>,
    pub disposition: Disposition,
    pub product_id: Option<String>,
    pub submission_date: Option<NaiveDateTime>,
    pub resolution_date: Option<NaiveDate>,
    pub revocation_date: Option<NaiveDateTime>,
    pub revocation_reason: Option<u32>,
}

/// What the host learns from one enrollment call.
#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub ca_request_id: Option<String>,
    pub certificate: Option<String>,
    pub disposition: Disposition,
    pub message: Option<String>,
}

/// Product selection plus the free-form template parameters the host
/// passes with an enrollment.
#[derive(Debug, Clone, Default)]
pub struct ProductInfo {
    pub product_id: String,
    pub parameters: HashMap<String, String>,
}

/// Which enrollment workflow the host asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentType {
    New,
    Renew,
    Reissue,
}

/// What the host knows about the last sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncInfo {
    pub full_sync: bool,
    pub last_sync: Option<NaiveDateTime>,
}

/// Read access to the host's certificate store.
pub trait CertificateDataReader {
    fn record_by_serial(&self, serial: &[u8]) -> Option<CertificateRecord>;
    fn record_by_correlation(&self, ca_request_id: &str, filter: &str)
    -> Option<CertificateRecord>;
}

/// Bounded hand-off for synchronized records. Pushing beyond capacity
/// blocks the sync engine against the host's ingestion rate.
pub trait RecordSink {
    fn push(&self, record: CertificateRecord) -> Result<()>;
}

impl RecordSink for SyncSender<CertificateRecord> {
    fn push(&self, record: CertificateRecord) -> Result<()> {
        self.send(record)
            .map_err(|_| anyhow!("record sink disconnected"))
    }
}

/// Opaque transform that extracts the newest leaf certificate from a
/// PKCS#7 download as raw base64. Supplied by the host; the gateway never
/// parses PKCS#7 itself.
pub trait CertificateBodyTransform {
    fn newest_leaf_base64(&self, pkcs7_der: &[u8]) -> Result<String>;
}

/// Maps a host revocation reason code onto the CA's comment strings.
pub fn revoke_reason_comment(reason_code: u32) -> &'static str {
    match reason_code {
        1 => "Key compromise",
        2 => "CA compromise",
        3 => "Affiliation changed",
        4 => "Superseded",
        5 => "Cessation of operation",
        6 => "Certificate hold",
        8 => "Remove from CRL",
        _ => "Unspecified",
    }
}

/// Reduces a certificate body to raw base64 with no armor or line breaks.
/// Accepts PEM-armored text or an already-bare base64 body.
pub fn strip_pem_armor(body: &str) -> Result<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("certificate body is empty"));
    }
    if trimmed.contains("-----") {
        let block = pem::parse(trimmed).context("certificate body is not valid PEM")?;
        return Ok(BASE64.encode(block.contents()));
    }
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(&compact)
        .context("certificate body is neither PEM nor base64")?;
    Ok(compact)
}

/// Decodes a hex serial number string into bytes.
pub fn hex_serial_to_bytes(serial: &str) -> Result<Vec<u8>> {
    let cleaned = serial.trim().trim_start_matches("0x");
    hex::decode(cleaned).with_context(|| format!("invalid hex serial number '{serial}'"))
}
