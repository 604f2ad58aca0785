use log::warn;
use serde::{Deserialize, Serialize};

/// Order/request status strings as the CA reports them.
pub mod order_status {
    pub const ISSUED: &str = "issued";
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const REVOKED: &str = "revoked";
    pub const NEEDS_APPROVAL: &str = "needs_approval";
}

/// Normalized outcome of an order or enrollment, as the host understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Issued,
    ExternalValidation,
    Denied,
    Revoked,
    Failed,
    Unknown,
}

/// Maps a CA order status onto a host disposition. Total: anything the
/// table does not cover degrades to `Unknown` instead of failing the
/// caller.
pub fn normalize_order_status(status: &str, order_id: i32) -> Disposition {
    match status {
        "issued" | "approved" | "expired" => Disposition::Issued,
        // Pending means the CA will issue once validation completes.
        "processing" | "reissue_pending" | "pending" => Disposition::ExternalValidation,
        "denied" => Disposition::Denied,
        "revoked" => Disposition::Revoked,
        // Approval through the CA portal, which indicates a misconfiguration.
        "needs_approval" => {
            warn!(
                "[status] Order {} needs to be approved in the CA portal prior to issuance",
                order_id
            );
            Disposition::ExternalValidation
        }
        other => {
            warn!("[status] Order {} has unexpected status {}", order_id, other);
            Disposition::Unknown
        }
    }
}
