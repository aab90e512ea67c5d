//! Local request signing, for exercising a running server by hand.

use std::path::Path;

use shopgate_server::auth::proxy::{SIGNATURE_PARAM, proxy_message, sign};
use shopgate_server::auth::webhook;

/// The signature and the full signed query string for `query`.
fn signed_query(secret: &str, query: &str) -> (String, String) {
    let query = query.trim_start_matches('?');
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| k != SIGNATURE_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let signature = sign(secret.as_bytes(), &proxy_message(pairs.iter().cloned()));

    let signed = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&pairs)
        .append_pair(SIGNATURE_PARAM, &signature)
        .finish();

    (signature, signed)
}

/// Print the proxy signature for `query` and the signed query string.
pub fn proxy(secret: &str, query: &str) {
    let (signature, signed) = signed_query(secret, query);

    #[allow(clippy::print_stdout)]
    {
        println!("signature: {signature}");
        println!("query:     {signed}");
    }
}

/// Print the webhook HMAC header value for the bytes of `file`.
pub fn webhook(secret: &str, file: &Path) -> std::io::Result<()> {
    let body = std::fs::read(file)?;

    #[allow(clippy::print_stdout)]
    {
        println!("X-Shopify-Hmac-Sha256: {}", webhook::sign(secret.as_bytes(), &body));
    }
    Ok(())
}
