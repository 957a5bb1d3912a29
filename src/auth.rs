//! OAuth2 authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::future::Future;
use std::io::IsTerminal;
use std::path::Path;
use std::pin::Pin;
use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::ApplicationSecret;

use crate::error::{MailError, Result};
use crate::session::{secure_file, SessionStore};

/// Read/write access to mail, labels and sending. No permanent deletion.
pub const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

pub const REQUIRED_SCOPES: &[&str] = &[GMAIL_SCOPE];

/// Tag placed in delegate errors so callers can tell "consent needed" apart
/// from other authenticator failures
pub const CHALLENGE_MARKER: &str = "consent-challenge-required";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// What to do when the provider asks for an interactive consent step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMode {
    /// Show the consent URL and ask for the code (used by `login`)
    Prompt,
    /// Fail with `AuthChallengeRequired` (every other command)
    Refuse,
}

/// Presents the consent URL and collects the authorization code
struct ConsentDelegate {
    mode: ChallengeMode,
}

impl InstalledFlowDelegate for ConsentDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        need_code: bool,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            if self.mode == ChallengeMode::Refuse {
                tracing::debug!("Consent requested outside of login; refusing");
                return Err(format!("{}: run `gmail login`", CHALLENGE_MARKER));
            }

            eprintln!("Open this URL in your browser to authorize gmail-cli:\n\n  {}\n", url);
            if !need_code {
                // Redirect flow: the local listener receives the code
                return Ok(String::new());
            }

            if !std::io::stdin().is_terminal() {
                return Err(format!(
                    "{}: a terminal is needed to enter the authorization code",
                    CHALLENGE_MARKER
                ));
            }

            tokio::task::spawn_blocking(|| {
                inquire::Text::new("Authorization code:")
                    .prompt()
                    .map(|code| code.trim().to_string())
                    .map_err(|e| format!("{}: {}", CHALLENGE_MARKER, e))
            })
            .await
            .map_err(|e| format!("prompt task failed: {}", e))?
        })
    }
}

/// Map an authenticator failure onto the error taxonomy
fn classify_token_error(error: impl std::fmt::Display) -> MailError {
    let message = error.to_string();
    if message.contains(CHALLENGE_MARKER) {
        MailError::AuthChallengeRequired(
            "a consent code is needed to obtain a new token".to_string(),
        )
    } else {
        MailError::AuthError(format!("Failed to obtain token: {}", message))
    }
}

/// Load the OAuth2 client secret.
///
/// `GMAIL_CLIENT_ID`/`GMAIL_CLIENT_SECRET` take precedence over the file so
/// the secret never has to live on disk.
pub async fn load_application_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if env::var("GMAIL_CLIENT_ID").is_ok() {
        tracing::debug!("Using OAuth client from environment");
        return load_credentials_from_env();
    }

    if !credentials_path.exists() {
        return Err(MailError::ConfigError(format!(
            "OAuth client secret not found at {:?}. Download it from Google Cloud Console \
             or set GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
            credentials_path
        )));
    }

    yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| MailError::AuthError(format!("Failed to read credentials: {}", e)))
}

/// Load OAuth2 credentials from environment variables
///
/// # Environment Variables
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| MailError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| MailError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("GMAIL_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// TLS connector used by the hub (HTTP/1, native roots)
pub fn https_connector(
) -> Result<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>> {
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| MailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
        .https_or_http()
        .enable_http1()
        .build())
}

/// Build an authenticated Gmail hub backed by the session's token cache.
///
/// Tokens are refreshed transparently. If no usable token exists the consent
/// flow runs; `mode` decides whether it may prompt.
pub async fn connect(
    secret: ApplicationSecret,
    store: &SessionStore,
    mode: ChallengeMode,
    open_browser: bool,
) -> Result<GmailHub> {
    let method = if open_browser {
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect
    } else {
        yup_oauth2::InstalledFlowReturnMethod::Interactive
    };

    // yup-oauth2 creates the token cache with default permissions; keep it in
    // an owner-only directory from the first write
    store.prepare_dirs().await?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(secret, method)
        .persist_tokens_to_disk(store.token_cache_path().to_path_buf())
        .flow_delegate(Box::new(ConsentDelegate { mode }))
        .build()
        .await
        .map_err(|e| MailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Fetch (or refresh) the token now so auth problems surface before any API call
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(classify_token_error)?;

    if store.token_cache_path().exists() {
        secure_file(store.token_cache_path()).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(https_connector()?);
    Ok(Gmail::new(client, auth))
}
