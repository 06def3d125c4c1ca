//! Raw source retrieval -- local files and HTTP(S) URLs.

use std::fs::File;
use std::io::Read;
use std::time::Duration;

use crate::error::{ReadError, Result};

/// A readable calendar byte stream. Dropping it releases the underlying handle.
pub type SourceStream = Box<dyn Read + Send>;

/// Trait that needs to be implemented by a source of raw calendar bytes.
pub trait SourceReader: Send + Sync {
    /// Opens the resource at `location`.
    ///
    /// # Errors
    /// Returns `ReadError::RetrievalFailure` when the resource cannot be opened.
    fn open(&self, location: &str) -> Result<SourceStream>;
}

impl<T> SourceReader for Box<T>
where
    T: SourceReader + ?Sized,
{
    fn open(&self, location: &str) -> Result<SourceStream> {
        (**self).open(location)
    }
}

impl<T> SourceReader for &T
where
    T: SourceReader + ?Sized,
{
    fn open(&self, location: &str) -> Result<SourceStream> {
        (**self).open(location)
    }
}

/// Reads calendars from the local filesystem. Accepts plain paths and `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl SourceReader for FileSource {
    fn open(&self, location: &str) -> Result<SourceStream> {
        let path = location.strip_prefix("file://").unwrap_or(location);
        let file = File::open(path).map_err(|e| ReadError::retrieval(location, e))?;
        Ok(Box::new(file))
    }
}

/// Reads calendars over HTTP(S) with a blocking client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

/// Default timeout for a whole HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpSource {
    /// # Errors
    /// Returns `ReadError::Config` if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// # Errors
    /// Returns `ReadError::Config` if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ReadError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(HttpSource { client })
    }
}

impl SourceReader for HttpSource {
    fn open(&self, location: &str) -> Result<SourceStream> {
        let url = match location.strip_prefix("webcal://") {
            Some(rest) => format!("https://{rest}"),
            None => location.to_string(),
        };
        let response = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReadError::retrieval(location, e))?;
        Ok(Box::new(response))
    }
}

/// Dispatches on the location: URLs go to [`HttpSource`], everything else to [`FileSource`].
#[derive(Debug, Clone)]
pub struct AnySource {
    file: FileSource,
    http: HttpSource,
}

impl AnySource {
    /// # Errors
    /// Returns `ReadError::Config` if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(AnySource {
            file: FileSource,
            http: HttpSource::new()?,
        })
    }

    pub fn with_http(http: HttpSource) -> Self {
        AnySource {
            file: FileSource,
            http,
        }
    }
}

fn is_url(location: &str) -> bool {
    let lower = location.get(..10).unwrap_or(location).to_ascii_lowercase();
    ["http://", "https://", "webcal://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

impl SourceReader for AnySource {
    fn open(&self, location: &str) -> Result<SourceStream> {
        if is_url(location) {
            self.http.open(location)
        } else {
            self.file.open(location)
        }
    }
}
