/// Errors produced while parsing an `s3://bucket/path` address.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{address:?} is not a valid address: {reason}")]
    Malformed { address: String, reason: String },
    #[error("{address:?} uses unsupported scheme {scheme:?}, expected s3://")]
    UnsupportedScheme { address: String, scheme: String },
}

pub const SCHEME: &str = "s3";

/// A bucket plus a key (or key prefix) in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    bucket: String,
    path: String,
}

impl Location {
    /// Parses `s3://bucket/path`. The path is percent-decoded and stored without its leading `/`.
    pub fn parse(address: &str) -> Result<Self, Error> {
        let malformed = |reason: String| Error::Malformed {
            address: address.to_string(),
            reason,
        };
        let url = url::Url::parse(address).map_err(|err| malformed(err.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(Error::UnsupportedScheme {
                address: address.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        let bucket = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(malformed("missing bucket name".to_string())),
        };
        let path = urlencoding::decode(url.path())
            .map_err(|err| malformed(format!("path is not valid UTF-8: {err}")))?;
        Ok(Self {
            bucket,
            path: path.trim_start_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The object key named by this location (may be empty).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.path
    }

    /// The path with any trailing `/` removed, used as the destination prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        self.path.trim_end_matches('/')
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}://{}/{}", SCHEME, self.bucket, self.path)
    }
}
