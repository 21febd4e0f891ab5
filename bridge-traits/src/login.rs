//! Interactive Login Abstraction
//!
//! The host owns the user-facing part of an authorization-code login: it
//! shows the provider's consent page and watches redirects for the one that
//! carries the code.

use async_trait::async_trait;

use crate::error::Result;

/// Login flow trait
///
/// Given the provider authorization URL and a redirect marker (for example
/// `"code="`), the host drives the user through the consent page and returns
/// the value that followed the marker in the final redirect.
///
/// # Platform Support
///
/// - **Desktop**: embedded web view or system browser with a loopback listener
/// - **Mobile**: `ASWebAuthenticationSession` / Custom Tabs
///
/// # Returns
///
/// `Ok(None)` or `Ok(Some(""))` when the user closed the page without
/// authorizing. Both are treated as an aborted login.
#[async_trait]
pub trait LoginFlow: Send + Sync {
    async fn authorize(&self, authorization_url: &str, redirect_marker: &str)
        -> Result<Option<String>>;
}

/// Extracts the value that follows `marker` in a redirect URL.
///
/// The value ends at the next `&` or `#`. Returns `None` when the marker is
/// absent or the value is empty.
///
/// ```
/// use bridge_traits::login::extract_after_marker;
///
/// let redirect = "https://localhost/cb?code=M.123&state=x";
/// assert_eq!(extract_after_marker(redirect, "code="), Some("M.123".to_string()));
/// ```
pub fn extract_after_marker(redirect_url: &str, marker: &str) -> Option<String> {
    let start = redirect_url.find(marker)? + marker.len();
    let rest = &redirect_url[start..];
    let end = rest.find(|c: char| c == '&' || c == '#').unwrap_or(rest.len());
    let value = &rest[..end];

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_at_end() {
        assert_eq!(
            extract_after_marker("https://localhost/cb?code=abc", "code="),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_extract_stops_at_fragment() {
        assert_eq!(
            extract_after_marker("https://localhost/cb?code=abc#_", "code="),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_extract_missing_or_empty() {
        assert_eq!(
            extract_after_marker("https://localhost/cb?error=access_denied", "code="),
            None
        );
        assert_eq!(
            extract_after_marker("https://localhost/cb?code=&state=1", "code="),
            None
        );
    }
}
