//! Resources passed through the analysis pipeline.
//!
//! A [`Resource`] is the unit of work the services move around: an identity,
//! a logical location, optional pixel content, and the metadata an algorithm
//! attached to it. Each processing stage produces a new `Resource` value
//! rather than mutating in place, so resources are never shared mutably
//! between workers.
//!
//! Algorithm failures travel through the same type: an *error-resource*
//! carries the sentinel uri [`ERROR_URI`] and the failure message as its id,
//! so a failed analysis flows through the normal completion path instead of
//! unwinding across the worker boundary.

mod bounding_box;
mod image;

pub use bounding_box::BoundingBox;
pub use self::image::{content_fingerprint, crop_region};

use ::image::RgbaImage;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Sentinel uri marking a resource that represents an algorithm failure.
pub const ERROR_URI: &str = "error";

/// Content-derived identity used as the deduplication key for a resource.
///
/// Two resources with equal pixel content (and equal load state) compare
/// equal regardless of their ids.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Returns the fingerprint as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars are enough to tell fingerprints apart in logs.
        write!(f, "Fingerprint({}..)", &self.0[..8.min(self.0.len())])
    }
}

/// A unit of work flowing through the analysis services.
#[derive(Clone, Debug, Default)]
pub struct Resource {
    id: String,
    uri: String,
    metadata: Option<Value>,
    content: Option<RgbaImage>,
}

impl Resource {
    /// Creates an unloaded resource pointing at a logical location.
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            metadata: None,
            content: None,
        }
    }

    /// Creates a loaded resource from pixel content.
    pub fn from_content(id: impl Into<String>, uri: impl Into<String>, content: RgbaImage) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            metadata: None,
            content: Some(content),
        }
    }

    /// Creates an error-resource carrying a failure message as its id.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            id: message.into(),
            uri: ERROR_URI.to_string(),
            metadata: None,
            content: None,
        }
    }

    /// Attaches algorithm output metadata, returning the updated resource.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the algorithm output payload, present only after processing.
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Returns the pixel content when the resource is loaded.
    pub fn content(&self) -> Option<&RgbaImage> {
        self.content.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.content.is_some()
    }

    /// Returns true when this resource represents an algorithm failure.
    pub fn is_error(&self) -> bool {
        self.uri == ERROR_URI
    }

    /// Returns the (width, height) of the pixel content, if loaded.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.content.as_ref().map(|c| (c.width(), c.height()))
    }

    /// Computes the content fingerprint used as the deduplication key.
    ///
    /// Loaded resources hash their raw pixel bytes and dimensions, so the
    /// fingerprint is stable for identical content regardless of id. An
    /// unloaded resource falls back to an identity-derived value over its
    /// uri.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.content {
            Some(content) => content_fingerprint(content),
            None => {
                let mut hasher = Sha256::new();
                hasher.update(b"uri:");
                hasher.update(self.uri.as_bytes());
                Fingerprint(format!("{:x}", hasher.finalize()))
            }
        }
    }

    /// Crops a region out of this resource's content, producing a derived
    /// loaded resource under the given id.
    ///
    /// The region is clamped to the image bounds before cropping. Returns
    /// `None` when the resource is unloaded.
    pub fn crop(&self, region: &BoundingBox, id: impl Into<String>) -> Option<Resource> {
        let content = self.content.as_ref()?;
        let cropped = crop_region(content, region);
        let id = id.into();
        let uri = format!("{}#{}", self.uri, id);
        Some(Resource::from_content(id, uri, cropped))
    }
}
