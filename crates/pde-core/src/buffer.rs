//! Buffer protection with printable tokens.
//!
//! A token is the standard base64 text of whatever the provider returned
//! from `protect_buffer`. Nothing else is added, so a token produced by the
//! platform service can be pasted into any other tool using the same API.

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::error::{PdeError, Result};
use crate::level::{BufferUnprotectResult, ProtectionLevel};
use crate::service::ProtectionService;

pub fn encode_token(protected: &[u8]) -> String {
    general_purpose::STANDARD.encode(protected)
}

pub fn decode_token(token: &str) -> Result<Vec<u8>> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Err(PdeError::InvalidToken("token is empty".into()));
    }
    let bytes = general_purpose::STANDARD.decode(trimmed)?;
    if bytes.is_empty() {
        return Err(PdeError::InvalidToken("token decodes to nothing".into()));
    }
    Ok(bytes)
}

/// Protects `data` and returns its token. Empty input never reaches the
/// service and yields `None`.
pub async fn protect_to_token(
    service: &dyn ProtectionService,
    data: &[u8],
    level: ProtectionLevel,
) -> Result<Option<String>> {
    if data.is_empty() {
        debug!("skipping protection of empty buffer");
        return Ok(None);
    }
    let protected = service.protect_buffer(data, level).await?;
    Ok(Some(encode_token(&protected)))
}

/// Decodes `token` and asks the service to unprotect it. A token the service
/// does not recognise is reported as [`PdeError::InvalidToken`].
pub async fn unprotect_token(
    service: &dyn ProtectionService,
    token: &str,
) -> Result<BufferUnprotectResult> {
    let bytes = decode_token(token)?;
    match service.unprotect_buffer(&bytes).await {
        Err(PdeError::MalformedBuffer(detail)) => Err(PdeError::InvalidToken(detail)),
        other => other,
    }
}
