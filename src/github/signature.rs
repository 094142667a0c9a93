//! Webhook signature verification (`X-Hub-Signature-256`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{Result, StagingError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

fn mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| StagingError::Environment(format!("invalid webhook secret: {}", e)))
}

/// The header value GitHub would send for `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = mac(secret)?;
    mac.update(payload);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check `header` against the HMAC-SHA256 of `payload`. The comparison is
/// constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], header: Option<&str>) -> Result<()> {
    let header = header
        .ok_or_else(|| StagingError::Validation(format!("missing {} header", SIGNATURE_HEADER)))?;
    let digest = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| StagingError::Validation("signature is not sha256".to_string()))?;
    let provided = hex::decode(digest)
        .map_err(|_| StagingError::Validation("signature is not hex".to_string()))?;

    let mut mac = mac(secret)?;
    mac.update(payload);
    mac.verify_slice(&provided)
        .map_err(|_| StagingError::Validation("signature does not match payload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const PAYLOAD: &[u8] = b"Hello, World!";

    #[test]
    fn test_known_vector() {
        // Published example from GitHub's webhook documentation.
        assert_eq!(
            sign(SECRET, PAYLOAD).unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_valid_signature_passes() {
        let header = sign(SECRET, PAYLOAD).unwrap();
        assert!(verify_signature(SECRET, PAYLOAD, Some(header.as_str())).is_ok());
    }

    #[test]
    fn test_rejections() {
        let header = sign(SECRET, PAYLOAD).unwrap();
        let cases: [(&str, &[u8], Option<&str>); 5] = [
            ("wrong secret", PAYLOAD, Some(header.as_str())),
            (SECRET, b"Hello, World?", Some(header.as_str())),
            (SECRET, PAYLOAD, None),
            (SECRET, PAYLOAD, Some("sha1=abcdef")),
            (SECRET, PAYLOAD, Some("sha256=zz")),
        ];
        for (secret, payload, header) in cases {
            assert!(
                matches!(
                    verify_signature(secret, payload, header),
                    Err(StagingError::Validation(_))
                ),
                "accepted {header:?} with secret {secret:?}"
            );
        }
    }
}
