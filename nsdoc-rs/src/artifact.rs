//! Contains the immutable result of rendering the documentation of a namespace.
//!
//! An [Artifact](Artifact) is created by [Fetcher::fetch_and_render](crate::fetch::Fetcher::fetch_and_render)
//! and never changed afterwards. When the background refresh detects new contents, the cached
//! artifact is replaced as a whole.
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Represents the rendered documentation of a namespace along with its creation timestamp.
///
/// The payload is kept as [Bytes] so that handing it out to concurrent requests is just a
/// reference count increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    payload: Bytes,
    created_at: DateTime<Utc>,
}

impl Artifact {
    /// Creates a new artifact for the given payload which is timestamped "now".
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Artifact::with_timestamp(payload, Utc::now())
    }

    /// Creates a new artifact using an explicit creation timestamp.
    pub fn with_timestamp(payload: impl Into<Bytes>, created_at: DateTime<Utc>) -> Self {
        Artifact {
            payload: payload.into(),
            created_at,
        }
    }

    /// Returns the rendered output.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns the point in time when this artifact was rendered.
    ///
    /// This is exposed as **Last-Modified** to HTTP clients.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Determines if the given artifact carries exactly the same payload as this one.
    pub fn same_contents(&self, other: &Artifact) -> bool {
        self.payload == other.payload
    }
}

#[cfg(test)]
mod tests {
    use crate::artifact::Artifact;
    use chrono::{Duration, Utc};

    #[test]
    fn same_contents_ignores_timestamps() {
        let now = Utc::now();
        let first = Artifact::with_timestamp("<p>x</p>", now);
        let second = Artifact::with_timestamp("<p>x</p>", now + Duration::seconds(10));
        let third = Artifact::with_timestamp("<p>y</p>", now);

        assert!(first.same_contents(&second));
        assert!(!first.same_contents(&third));
        assert_ne!(first, second);
    }
}
