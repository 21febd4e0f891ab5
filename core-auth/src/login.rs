//! Authorization-code login.
//!
//! Builds the provider consent URL from a [`ProviderConfig`] and asks the
//! host [`LoginFlow`] to obtain the authorization code. Exchanging the code
//! for a credential is provider specific and happens in the caller.

use crate::error::{AuthError, Result};
use bridge_traits::LoginFlow;
use core_runtime::config::ProviderConfig;
use tracing::{debug, info, instrument};
use url::Url;

/// The authorization code follows this marker in the redirect URL.
pub const REDIRECT_MARKER: &str = "code=";

/// Consent page URL: `login_url` followed by `client_id`, `scope`,
/// `response_type=code` and `redirect_uri`, in that order, form-encoded.
///
/// ```
/// use core_auth::login::build_login_url;
/// use core_runtime::config::ProviderConfig;
///
/// let config = ProviderConfig {
///     client_id: "abc".to_string(),
///     client_secret: "s".to_string(),
///     login_url: "https://accounts.example.com/auth?".to_string(),
///     redirect_uri: "http://localhost".to_string(),
///     scope: "files".to_string(),
/// };
///
/// assert_eq!(
///     build_login_url(&config).unwrap(),
///     "https://accounts.example.com/auth?client_id=abc&scope=files\
///      &response_type=code&redirect_uri=http%3A%2F%2Flocalhost"
/// );
/// ```
pub fn build_login_url(config: &ProviderConfig) -> Result<String> {
    let mut url = Url::parse(&config.login_url)
        .map_err(|e| AuthError::InvalidLoginUrl(format!("{}: {}", config.login_url, e)))?;

    // A base that already ends in a separator would otherwise gain a second one.
    if let Some(query) = url.query().filter(|q| q.ends_with('&')) {
        let trimmed = query.trim_end_matches('&').to_string();
        url.set_query(Some(&trimmed));
    }

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("scope", &config.scope)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri);

    Ok(url.into())
}

/// Shows the consent page and returns the authorization code.
///
/// `Ok(None)` means the user aborted or the redirect carried an empty code;
/// callers treat that as a no-op rather than an error.
#[instrument(skip(flow, config), fields(client_id = %config.client_id))]
pub async fn request_authorization_code(
    flow: &dyn LoginFlow,
    config: &ProviderConfig,
) -> Result<Option<String>> {
    let url = build_login_url(config)?;
    debug!("Opening consent page");

    let code = flow
        .authorize(&url, REDIRECT_MARKER)
        .await
        .map_err(AuthError::LoginFlowFailed)?;

    match code {
        Some(code) if !code.trim().is_empty() => {
            info!("Authorization code received");
            Ok(Some(code))
        }
        _ => {
            info!("Login aborted, no authorization code");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::BridgeError;
    use mockall::mock;

    mock! {
        Flow {}

        #[async_trait]
        impl LoginFlow for Flow {
            async fn authorize(
                &self,
                authorization_url: &str,
                redirect_marker: &str,
            ) -> BridgeResult<Option<String>>;
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            client_id: "client 1".to_string(),
            client_secret: "secret".to_string(),
            login_url: "https://login.example.com/oauth20_authorize.srf?".to_string(),
            redirect_uri: "https://login.example.com/oauth20_desktop.srf".to_string(),
            scope: "onedrive.readwrite offline_access".to_string(),
        }
    }

    #[test]
    fn test_login_url_parameter_order() {
        let url = build_login_url(&config()).unwrap();
        let query = url.split_once('?').unwrap().1;
        let names: Vec<&str> = query
            .split('&')
            .map(|pair| pair.split_once('=').unwrap().0)
            .collect();

        assert_eq!(names, ["client_id", "scope", "response_type", "redirect_uri"]);
        assert!(query.contains("client_id=client+1"));
        assert!(query.contains("response_type=code"));
    }

    #[test]
    fn test_login_url_keeps_existing_query_without_double_separator() {
        let mut config = config();
        config.login_url = "https://login.example.com/authorize?prompt=consent&".to_string();

        let url = build_login_url(&config).unwrap();
        assert!(url.starts_with(
            "https://login.example.com/authorize?prompt=consent&client_id=client+1&scope="
        ));
        assert!(!url.contains("&&"));
    }

    #[test]
    fn test_login_url_rejects_relative_base() {
        let mut config = config();
        config.login_url = "not a url".to_string();
        assert!(matches!(
            build_login_url(&config),
            Err(AuthError::InvalidLoginUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_request_code_passes_url_and_marker() {
        let expected_url = build_login_url(&config()).unwrap();
        let mut flow = MockFlow::new();
        flow.expect_authorize()
            .withf(move |url, marker| url == expected_url && marker == "code=")
            .times(1)
            .returning(|_, _| Ok(Some("4/0Ab".to_string())));

        let code = request_authorization_code(&flow, &config()).await.unwrap();
        assert_eq!(code.as_deref(), Some("4/0Ab"));
    }

    #[tokio::test]
    async fn test_aborted_and_empty_codes_are_none() {
        let mut flow = MockFlow::new();
        flow.expect_authorize().times(1).returning(|_, _| Ok(None));
        assert_eq!(request_authorization_code(&flow, &config()).await.unwrap(), None);

        let mut flow = MockFlow::new();
        flow.expect_authorize()
            .times(1)
            .returning(|_, _| Ok(Some(String::new())));
        assert_eq!(request_authorization_code(&flow, &config()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flow_failure_propagates() {
        let mut flow = MockFlow::new();
        flow.expect_authorize()
            .returning(|_, _| Err(BridgeError::NotAvailable("no browser".to_string())));

        let result = request_authorization_code(&flow, &config()).await;
        assert!(matches!(result, Err(AuthError::LoginFlowFailed(_))));
    }
}
