//! Short-lived capability tickets for the gated print views.
//!
//! A ticket grants its bearer permission to view exactly one document for a
//! few minutes, without identifying the bearer. It is signed with
//! HMAC-SHA256 over a fixed-order canonical tuple, so verification needs no
//! shared mutable state: the render-view endpoint is hit by an independent
//! HTTP client (the headless engine) that carries no session context and
//! must verify synchronously.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::SigningSecret;
use crate::domain::documents::DocumentKind;

type HmacSha256 = Hmac<Sha256>;

/// Ticket validity window. Fixed by design, not configurable per request.
pub const TICKET_TTL_SECONDS: i64 = 300;

const SIGNATURE_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("ticket expired")]
    Expired,
    #[error("ticket signature mismatch")]
    InvalidSignature,
    #[error("malformed ticket: {0}")]
    Malformed(&'static str),
}

/// A minted capability ticket. Value object, never persisted: it is created
/// at export time, travels as a URL query string, and is checked once by the
/// render gate inside its validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTicket {
    pub kind: DocumentKind,
    pub document_id: String,
    pub expires_at_unix: i64,
    pub watermark: bool,
    pub signature: String,
}

impl ExportTicket {
    /// Renders the ticket as the query string consumed by the render gate.
    pub fn query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("documentId", &self.document_id)
            .append_pair("exp", &self.expires_at_unix.to_string())
            .append_pair("wm", if self.watermark { "1" } else { "0" })
            .append_pair("sig", &self.signature)
            .finish()
    }
}

/// Mints and verifies export tickets against the process-wide signing secret.
#[derive(Clone)]
pub struct TicketCodec {
    secret: SigningSecret,
}

impl TicketCodec {
    pub fn new(secret: SigningSecret) -> Self {
        Self { secret }
    }

    pub fn mint(
        &self,
        kind: DocumentKind,
        document_id: &str,
        ttl_seconds: i64,
        watermark: bool,
    ) -> Result<ExportTicket, TicketError> {
        self.mint_at(OffsetDateTime::now_utc(), kind, document_id, ttl_seconds, watermark)
    }

    pub fn mint_at(
        &self,
        now: OffsetDateTime,
        kind: DocumentKind,
        document_id: &str,
        ttl_seconds: i64,
        watermark: bool,
    ) -> Result<ExportTicket, TicketError> {
        if document_id.trim().is_empty() {
            return Err(TicketError::Malformed("document id is empty"));
        }
        let expires_at_unix = now.unix_timestamp() + ttl_seconds;
        let signature = self.sign(kind, document_id, expires_at_unix, watermark);
        Ok(ExportTicket {
            kind,
            document_id: document_id.to_string(),
            expires_at_unix,
            watermark,
            signature,
        })
    }

    pub fn verify(
        &self,
        kind: DocumentKind,
        document_id: &str,
        expires_at_unix: i64,
        watermark: bool,
        signature: &str,
    ) -> Result<(), TicketError> {
        self.verify_at(
            OffsetDateTime::now_utc(),
            kind,
            document_id,
            expires_at_unix,
            watermark,
            signature,
        )
    }

    /// Verification order is deliberate: a tampered expiry must fail as
    /// `InvalidSignature`, not `Expired`, so the signature check runs first.
    pub fn verify_at(
        &self,
        now: OffsetDateTime,
        kind: DocumentKind,
        document_id: &str,
        expires_at_unix: i64,
        watermark: bool,
        signature: &str,
    ) -> Result<(), TicketError> {
        if document_id.trim().is_empty() {
            return Err(TicketError::Malformed("document id is empty"));
        }
        let presented: [u8; SIGNATURE_BYTES] = hex::decode(signature)
            .map_err(|_| TicketError::Malformed("signature is not hex"))?
            .try_into()
            .map_err(|_| TicketError::Malformed("signature has wrong length"))?;

        let expected = self.mac(kind, document_id, expires_at_unix, watermark);
        if expected.ct_eq(&presented).unwrap_u8() == 0 {
            return Err(TicketError::InvalidSignature);
        }

        if now.unix_timestamp() > expires_at_unix {
            return Err(TicketError::Expired);
        }

        Ok(())
    }

    fn sign(
        &self,
        kind: DocumentKind,
        document_id: &str,
        expires_at_unix: i64,
        watermark: bool,
    ) -> String {
        hex::encode(self.mac(kind, document_id, expires_at_unix, watermark))
    }

    fn mac(
        &self,
        kind: DocumentKind,
        document_id: &str,
        expires_at_unix: i64,
        watermark: bool,
    ) -> [u8; SIGNATURE_BYTES] {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical_tuple(kind, document_id, expires_at_unix, watermark).as_bytes());
        mac.finalize().into_bytes().into()
    }
}

/// Fixed field order, newline delimiter. Document ids cannot contain
/// newlines in practice, and the other fields are structurally
/// newline-free, so the canonicalization is collision resistant.
fn canonical_tuple(
    kind: DocumentKind,
    document_id: &str,
    expires_at_unix: i64,
    watermark: bool,
) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        kind.as_str(),
        document_id,
        expires_at_unix,
        u8::from(watermark)
    )
}
