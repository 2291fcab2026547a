//! URL helpers for the portal and its federated servers

use std::borrow::Cow;

const ONLINE_DOMAIN: &str = ".arcgis.com";

/// The deployment environment of the public cloud portal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OnlineEnvironment {
    /// `devext.arcgis.com` and other `dev` hosts
    Dev,
    /// `qaext.arcgis.com` and other `qa` hosts
    Qa,
    /// Everything else
    Production,
}

impl OnlineEnvironment {
    /// The canonical sharing URL for this environment
    pub const fn portal_url(self) -> &'static str {
        match self {
            Self::Dev => "https://devext.arcgis.com/sharing/rest",
            Self::Qa => "https://qaext.arcgis.com/sharing/rest",
            Self::Production => "https://www.arcgis.com/sharing/rest",
        }
    }
}

/// Trims whitespace and a single trailing slash
pub fn clean_url(url: &str) -> &str {
    let url = url.trim();
    url.strip_suffix('/').unwrap_or(url)
}

fn strip_scheme(url: &str) -> Option<&str> {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
}

/// The host labels preceding `.arcgis.com`, when `url` is on the public cloud
fn online_subdomain(url: &str) -> Option<&str> {
    let rest = strip_scheme(url)?;
    rest.match_indices(ONLINE_DOMAIN)
        .map(|(idx, _)| idx)
        .filter(|&idx| idx > 0 && idx + ONLINE_DOMAIN.len() < rest.len())
        .filter(|&idx| !rest[..idx].contains(char::is_whitespace))
        .last()
        .map(|idx| &rest[..idx])
}

/// Whether `url` is on the public cloud domain
pub fn is_online(url: &str) -> bool {
    online_subdomain(url).is_some()
}

/// The public cloud environment that `url` belongs to
///
/// The environment is taken from the last subdomain label: labels containing
/// `dev` are development, labels containing `qa` are QA.
pub fn online_environment(url: &str) -> Option<OnlineEnvironment> {
    let subdomain = online_subdomain(url)?;
    let label = subdomain.rsplit('.').next().unwrap_or(subdomain);
    Some(if label.contains("dev") {
        OnlineEnvironment::Dev
    } else if label.contains("qa") {
        OnlineEnvironment::Qa
    } else {
        OnlineEnvironment::Production
    })
}

/// Maps any public cloud URL onto its environment's canonical portal URL
///
/// Other URLs are returned unchanged.
pub fn normalize_online_portal_url(portal: &str) -> Cow<'_, str> {
    match online_environment(portal) {
        Some(env) => Cow::Borrowed(env.portal_url()),
        None => Cow::Borrowed(portal),
    }
}

/// Whether a token for `portal` can be used for `request_url`
///
/// Both must be on the public cloud and in the same environment.
pub fn can_use_online_token(portal: &str, request_url: &str) -> bool {
    match (online_environment(portal), online_environment(request_url)) {
        (Some(p), Some(r)) => p == r,
        _ => false,
    }
}

/// Whether a server owned by `owning_system_url` is federated with `portal`
///
/// Matching is a case-insensitive substring test of the owning system URL
/// against the portal URL, both without a scheme.
pub fn is_federated(owning_system_url: &str, portal: &str) -> bool {
    let portal = normalize_online_portal_url(portal);
    let portal = clean_url(&portal);
    let portal = strip_scheme(portal).unwrap_or(portal).to_lowercase();

    let owner = clean_url(owning_system_url);
    let owner = strip_scheme(owner).unwrap_or(owner).to_lowercase();

    portal.contains(&owner)
}

/// Whether `url` addresses the portal itself
pub(crate) fn is_portal_url(portal: &str, url: &str) -> bool {
    url.to_lowercase().contains(&portal.to_lowercase())
}

fn services_index(url: &str) -> Option<usize> {
    url.match_indices("/rest/").map(|(idx, _)| idx).find(|&idx| {
        let after = &url[idx + "/rest/".len()..];
        let after = after.strip_prefix("admin/").unwrap_or(after);
        match after.strip_prefix("services") {
            Some(tail) => tail.is_empty() || tail.starts_with(['/', '#', '?']),
            None => false,
        }
    })
}

/// Reduces a service URL to the root of the server hosting it
///
/// Everything from `/rest/services` or `/rest/admin/services` onward is
/// dropped and the host is lower-cased. The path keeps its case.
///
/// ```
/// use fedauth::urls::server_root_url;
///
/// assert_eq!(
///     server_root_url("https://Services.Example.com/ArcGIS/rest/services/Parcels/FeatureServer/0"),
///     "https://services.example.com/ArcGIS"
/// );
/// ```
pub fn server_root_url(url: &str) -> String {
    let url = clean_url(url);
    let root = match services_index(url) {
        Some(idx) => &url[..idx],
        None => url,
    };

    let Some(scheme_idx) = root.find("://") else {
        return root.to_owned();
    };
    let (scheme, rest) = root.split_at(scheme_idx + 3);
    match rest.split_once('/') {
        Some((domain, path)) => format!("{}{}/{}", scheme, domain.to_lowercase(), path),
        None => format!("{}{}/", scheme, rest.to_lowercase()),
    }
}
