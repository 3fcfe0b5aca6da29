//! URL layout of the identity provider.

use url::Url;

/// Appends path segments to `base`, percent-encoding each one.
///
/// A trailing slash on `base` is ignored, so `http://host/` and `http://host`
/// produce the same result.
pub(crate) fn join(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| format!("'{base}' cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `<base>/realms/<realm>/protocol/openid-connect/token`
pub(crate) fn token_endpoint(base: &Url, realm: &str) -> Result<Url, String> {
    join(
        base,
        &["realms", realm, "protocol", "openid-connect", "token"],
    )
}

/// `<base>/realms/<realm>`
pub(crate) fn realm(base: &Url, realm: &str) -> Result<Url, String> {
    join(base, &["realms", realm])
}

/// `<base>/admin/realms/<realm>/<segments...>`
pub(crate) fn admin(base: &Url, realm: &str, segments: &[&str]) -> Result<Url, String> {
    let mut all = vec!["admin", "realms", realm];
    all.extend_from_slice(segments);
    join(base, &all)
}
