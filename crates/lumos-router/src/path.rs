//! Path-prefix routing
//!
//! Exported instances are addressed as `/<instance>/<rest>`; the first
//! path segment selects the route table entry and the remainder is
//! forwarded to the instance unchanged.

/// Instance route extracted from a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRoute<'a> {
    /// Instance name (first path segment)
    pub instance: &'a str,
    /// Remainder of the path, without its leading slash
    pub rest: &'a str,
}

impl<'a> PathRoute<'a> {
    /// Split `/<instance>/<rest>` into its parts
    ///
    /// Returns `None` for `/` or paths without a leading slash.
    pub fn parse(path: &'a str) -> Option<Self> {
        let trimmed = path.strip_prefix('/')?;
        let (instance, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

        if instance.is_empty() {
            return None;
        }

        Some(Self { instance, rest })
    }

    /// Full upstream URL for this route against an instance base URL
    pub fn upstream_url(&self, base_url: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", base_url.trim_end_matches('/'), self.rest);

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }

        url
    }
}
