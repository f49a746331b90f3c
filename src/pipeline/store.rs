//! URL construction for raw files served by a forge content store.

use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid content store URL {root}: {source}")]
    Parse {
        root: String,
        #[source]
        source: url::ParseError,
    },
    #[error("content store URL must be http or https: {0}")]
    Scheme(String),
}

/// A repository on the forge that serves raw files over HTTP.
///
/// Files are addressed as `<root>/raw/branch/<branch>/<path>`, the layout used
/// by Gitea and Forgejo for raw file access.  Every path segment is
/// percent-encoded, so branch names carrying `#`, `%` or `?` stay inside
/// their segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStore {
    root: String,
    base: Url,
}

impl ContentStore {
    pub fn new(root: &str, branch: &str) -> Result<Self, StoreError> {
        let root = root.trim_end_matches('/');
        let mut base = Url::parse(root).map_err(|source| StoreError::Parse {
            root: root.to_owned(),
            source,
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(StoreError::Scheme(root.to_owned()));
        }
        base.path_segments_mut()
            .map_err(|()| StoreError::Scheme(root.to_owned()))?
            .pop_if_empty()
            .extend(["raw", "branch", branch]);

        Ok(Self {
            root: root.to_owned(),
            base,
        })
    }

    /// Repository root URL (no trailing slash).
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Build the raw-file URL for the path made of `segments`.
    pub fn url<I, S>(&self, segments: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut url = self.base.clone();
        // http(s) URLs always have path segments; checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url.into()
    }
}
