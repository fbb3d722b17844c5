//! Small shared helpers.

use std::sync::OnceLock;

use tracing::debug;

/// Install the aws-lc-rs crypto provider for every rustls user in the process.
///
/// Both the HTTP client and the WebSocket transport build rustls configs from
/// the process default, so this must run before either connects.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(existing) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(?existing, "rustls CryptoProvider already installed");
        }
    });
}
