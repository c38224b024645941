//! Absolute `scheme://host/path` URLs and relative-path resolution.
//!
//! The content commands accept either absolute URLs or paths relative to
//! the current base URL (see `cd`, `push`, `pop`). [`Uri`] wraps a
//! [`url::Url`] and resolves references with [`Url::join`], so `.` and `..`
//! segments, percent-encoding and absolute references follow the WHATWG
//! URL rules.
//!
//! A `Uri` names an item on a server, never a view of it: the host is
//! lowercased and any query or fragment is dropped, which makes equal
//! items compare equal as map keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SampleError;

/// A parsed absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri(Url);

impl Uri {
    /// Parses an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if the text is not an
    /// absolute, hierarchical URL.
    pub fn parse(text: &str) -> Result<Self, SampleError> {
        let url = Url::parse(text)
            .map_err(|e| SampleError::InvalidArgument(format!("invalid URL {text}: {e}")))?;
        Self::from_url(url)
    }

    /// Creates the root URL `scheme://host/`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if the scheme or host is
    /// not valid in a URL.
    pub fn root(scheme: &str, host: &str) -> Result<Self, SampleError> {
        Self::parse(&format!("{scheme}://{host}/"))
    }

    fn from_url(mut url: Url) -> Result<Self, SampleError> {
        if url.cannot_be_a_base() {
            return Err(SampleError::InvalidArgument(format!(
                "not a hierarchical URL: {url}"
            )));
        }
        if let Some(host) = url.host_str().filter(|h| h.bytes().any(|b| b.is_ascii_uppercase())) {
            let lower = host.to_ascii_lowercase();
            url.set_host(Some(&lower))
                .map_err(|e| SampleError::InvalidArgument(format!("invalid host {lower}: {e}")))?;
        }
        url.set_query(None);
        url.set_fragment(None);
        if url.path().is_empty() {
            url.set_path("/");
        }
        Ok(Self(url))
    }

    /// Resolves `reference` against this URL.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if the reference does not
    /// resolve to a hierarchical URL.
    pub fn join(&self, reference: &str) -> Result<Self, SampleError> {
        let url = self.0.join(reference).map_err(|e| {
            SampleError::InvalidArgument(format!("cannot resolve {reference} against {self}: {e}"))
        })?;
        Self::from_url(url)
    }

    /// Returns this URL with a trailing `/`, so it names a folder.
    #[must_use]
    pub fn as_folder(&self) -> Self {
        let mut folder = self.clone();
        if !folder.is_folder() {
            let path = format!("{}/", folder.0.path());
            folder.0.set_path(&path);
        }
        folder
    }

    /// Returns this URL without a trailing `/`, so it names a document.
    /// The server root stays as is.
    #[must_use]
    pub fn as_file(&self) -> Self {
        let mut file = self.clone();
        let trimmed = self.path().trim_end_matches('/');
        if !trimmed.is_empty() {
            file.0.set_path(trimmed);
        }
        file
    }

    /// The root `scheme://host/` of the server holding this URL.
    #[must_use]
    pub fn server_root(&self) -> Self {
        let mut root = self.clone();
        root.0.set_path("/");
        root
    }

    /// Returns `true` if the path ends with `/`.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.0.path().ends_with('/')
    }

    /// URL scheme, lowercased.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Host component, lowercased (empty for e.g. `file:///tmp`).
    #[must_use]
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Percent-encoded absolute path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Last non-empty path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    /// The wrapped [`Url`].
    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }

    /// Returns `true` if `other` lives underneath this folder URL.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        let folder = self.as_folder();
        folder.scheme() == other.scheme()
            && folder.host() == other.host()
            && folder.0.port() == other.0.port()
            && other.path().starts_with(folder.path())
            && other.path() != folder.path()
    }

    /// Path of `other` relative to this folder, when [`Uri::contains`].
    #[must_use]
    pub fn relative_path<'a>(&self, other: &'a Self) -> Option<&'a str> {
        if !self.contains(other) {
            return None;
        }
        let prefix_len = self.as_folder().path().len();
        other.path().get(prefix_len..)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<String> for Uri {
    type Error = SampleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.0.into()
    }
}
