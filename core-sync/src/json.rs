//! Field extraction from provider JSON responses.

use crate::error::{Result, SyncError};
use core_async::io::{AsyncRead, AsyncReadExt};
use serde_json::Value;

/// Top-level string field `name` of the JSON object in `body`.
///
/// ```
/// let body = br#"{"access_token":"ya29.a0","expires_in":3599}"#;
/// assert_eq!(core_sync::json::string_field(body, "access_token").unwrap(), "ya29.a0");
/// assert!(core_sync::json::string_field(body, "expires_in").is_err());
/// ```
pub fn string_field(body: &[u8], name: &str) -> Result<String> {
    let value: Value = serde_json::from_slice(body)?;
    let object = value
        .as_object()
        .ok_or_else(|| SyncError::Provider("response is not a JSON object".to_string()))?;

    match object.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SyncError::Provider(format!("field '{}' is not a string", name))),
        None => Err(SyncError::Provider(format!("field '{}' is missing", name))),
    }
}

/// Reads `reader` to the end and extracts field `name` from it.
pub async fn read_string_field<R>(mut reader: R, name: &str) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut body = Vec::new();
    reader.read_to_end(&mut body).await?;
    string_field(&body, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_wrong_type() {
        let body = br#"{"id":"root","size":12,"name":null}"#;
        assert_eq!(string_field(body, "id").unwrap(), "root");
        assert!(matches!(string_field(body, "size"), Err(SyncError::Provider(_))));
        assert!(matches!(string_field(body, "name"), Err(SyncError::Provider(_))));
        assert!(matches!(string_field(body, "etag"), Err(SyncError::Provider(_))));
    }

    #[test]
    fn test_non_object_and_invalid_json() {
        assert!(matches!(string_field(b"[1,2]", "id"), Err(SyncError::Provider(_))));
        assert!(matches!(string_field(b"{oops", "id"), Err(SyncError::Json(_))));
    }

    #[tokio::test]
    async fn test_read_from_stream() {
        let body: &[u8] = br#"{"uploadUrl":"https://up.example.com/s/1"}"#;
        assert_eq!(
            read_string_field(body, "uploadUrl").await.unwrap(),
            "https://up.example.com/s/1"
        );
    }
}
