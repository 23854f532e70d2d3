//! Origin descriptors and the prioritized origin list.
//!
//! Origins are parsed once at startup from the configured base URLs and are
//! read-only afterwards. The list order is the fallback order: index 0 is
//! always tried first.

use anyhow::{Context as _, anyhow};
use http::Uri;
use tracing::{debug, warn};

/// A configured upstream server that resources may be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// `http` or `https`
    pub scheme: String,
    /// Host with optional port, e.g. `mirror.example:8080`
    pub host: String,
    /// Path prefix without a trailing slash; empty when the URL has no path
    pub base_path: String,
}

impl Origin {
    /// Parses an absolute base URL into an origin descriptor.
    ///
    /// The URL must carry an `http` or `https` scheme and a host. Any query
    /// component is ignored, and a trailing `/` on the path is dropped so that
    /// `http://a.example/x/` and `http://a.example/x` compose the same targets.
    ///
    /// # Arguments
    ///
    /// * `raw` - The base URL as given on the command line or in the config file
    ///
    /// # Returns
    ///
    /// Returns the parsed `Origin`, or an error describing why `raw` is unusable.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let uri = raw
            .parse::<Uri>()
            .with_context(|| format!("invalid origin URL {raw:?}"))?;

        let scheme = match uri.scheme_str() {
            Some(scheme @ ("http" | "https")) => scheme.to_owned(),
            Some(other) => {
                return Err(anyhow!(
                    "unsupported scheme {other:?} in origin URL {raw:?}"
                ));
            }
            None => return Err(anyhow!("origin URL {raw:?} is not absolute")),
        };

        let host = match uri.host() {
            Some(host) if !host.is_empty() => match uri.port_u16() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_owned(),
            },
            _ => return Err(anyhow!("origin URL {raw:?} has no host")),
        };

        Ok(Self {
            scheme,
            host,
            base_path: uri.path().trim_end_matches('/').to_owned(),
        })
    }

    /// Composes the URL this origin serves `request_path` from.
    pub fn target_url(&self, request_path: &str) -> String {
        format!(
            "{}://{}{}{}",
            self.scheme, self.host, self.base_path, request_path
        )
    }
}

/// Ordered origins, tried first to last.
///
/// The list is immutable once created and is shared read-only between all
/// request handlers.
#[derive(Debug, Clone, Default)]
pub struct OriginList {
    origins: Vec<Origin>,
}

impl OriginList {
    pub fn new(origins: Vec<Origin>) -> Self {
        Self { origins }
    }

    /// Iterates the origins in priority order.
    pub fn iter(&self) -> std::slice::Iter<'_, Origin> {
        self.origins.iter()
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

impl<'a> IntoIterator for &'a OriginList {
    type Item = &'a Origin;
    type IntoIter = std::slice::Iter<'a, Origin>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Resolves configured base URLs into an origin list.
///
/// Entries that fail to parse are skipped and reported at warn level, so a
/// single typo never takes the gateway down. The relative order of the valid
/// entries is preserved.
pub fn resolve<S: AsRef<str>>(raw_urls: &[S]) -> OriginList {
    let mut origins = Vec::with_capacity(raw_urls.len());
    for (i, raw) in raw_urls.iter().enumerate() {
        match Origin::parse(raw.as_ref()) {
            Ok(origin) => {
                debug!("Origin {} resolved to {:?}", i, origin);
                origins.push(origin);
            }
            Err(e) => warn!("Skipping origin {}: {:#}", i, e),
        }
    }
    OriginList::new(origins)
}

/// Resolves configured base URLs, rejecting the whole configuration if any
/// entry is invalid.
pub fn resolve_strict<S: AsRef<str>>(raw_urls: &[S]) -> anyhow::Result<OriginList> {
    let origins = raw_urls
        .iter()
        .enumerate()
        .map(|(i, raw)| Origin::parse(raw.as_ref()).with_context(|| format!("origin {i}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(OriginList::new(origins))
}
