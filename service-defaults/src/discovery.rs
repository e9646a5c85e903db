//! Configuration-based service discovery.
//!
//! A logical URL such as `https+http://catalog/items` names a service rather
//! than a host. Endpoints are looked up under `services.<name>.<scheme>`, as a
//! single string or a list of which the first entry is used:
//!
//! ```json
//! { "Services": { "catalog": { "http": ["http://10.0.0.12:8080"] } } }
//! ```
//!
//! A composite scheme such as `https+http` tries each scheme in order.

use tracing::{debug, warn};
use url::{Host, Url};

use crate::configuration::Configuration;
use crate::error::HttpClientError;

const SERVICES_SECTION: &str = "services";

#[derive(Clone, Debug)]
pub struct ServiceEndpointResolver {
    configuration: Configuration,
}

impl ServiceEndpointResolver {
    pub fn new(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// Rewrites a logical URL onto the endpoint configured for its service.
    /// Physical hosts pass through unchanged, and so do logical names with no
    /// endpoint, unless the scheme is composite and leaves no usable scheme.
    pub fn resolve(&self, url: &Url) -> Result<Url, HttpClientError> {
        let service = match url.host() {
            Some(Host::Domain(host)) if is_logical_name(host) => host.to_lowercase(),
            _ => return Ok(url.clone()),
        };

        let schemes: Vec<&str> = url.scheme().split('+').collect();
        for scheme in &schemes {
            if let Some(endpoint) = self.endpoint(&service, scheme) {
                debug!(%service, %endpoint, "resolved service endpoint");
                return Ok(rebase(url, &endpoint));
            }
        }

        if schemes.len() > 1 {
            return Err(HttpClientError::Discovery { service });
        }
        debug!(%service, "no endpoint configured, using the host as is");
        Ok(url.clone())
    }

    fn endpoint(&self, service: &str, scheme: &str) -> Option<Url> {
        let key = format!("{SERVICES_SECTION}.{service}.{scheme}");
        let endpoint = self.configuration.get_strings(&key).into_iter().next()?;

        // Allow bare `host:port` entries
        let endpoint = match endpoint.contains("://") {
            true => endpoint,
            false => format!("{scheme}://{endpoint}"),
        };

        match Url::parse(&endpoint) {
            Ok(url) => Some(url),
            Err(error) => {
                warn!(%service, %endpoint, %error, "ignoring invalid service endpoint");
                None
            }
        }
    }
}

fn is_logical_name(host: &str) -> bool {
    !host.eq_ignore_ascii_case("localhost") && !host.contains('.')
}

/// Moves the path, query and fragment of `url` onto `endpoint`, keeping any
/// path prefix the endpoint has.
pub fn rebase(url: &Url, endpoint: &Url) -> Url {
    let mut rebased = endpoint.clone();
    let prefix = endpoint.path().trim_end_matches('/');
    rebased.set_path(&format!("{prefix}{}", url.path()));
    rebased.set_query(url.query());
    rebased.set_fragment(url.fragment());
    rebased
}
