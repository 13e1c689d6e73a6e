use serde::{Deserialize, Serialize};

use crate::ids::{BucketName, FileId, Principal};

/// MIME type assumed when the stream adapter reports none.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// One logical upload as declared by the caller.
///
/// Immutable once accepted: the pipeline only ever reads it. The declared size
/// is what the caller claims and is used for the quota check alone; the
/// stored size comes from verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    declared_size: u64,
    principal: Principal,
    bucket: BucketName,
}

impl UploadRequest {
    pub fn new(declared_size: u64, principal: Principal, bucket: BucketName) -> Self {
        Self {
            declared_size,
            principal,
            bucket,
        }
    }

    /// Caller-declared content length in bytes.
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    /// Origin tag for a file part of this request: `<username>-<file name>`.
    ///
    /// Carried in logs, alerts, and failure outcomes so an operator can tie
    /// them back to a single part.
    pub fn origin_for(&self, file_name: &str) -> String {
        format!("{}-{}", self.principal.username, file_name)
    }
}

/// Record of an uploaded file.
///
/// Created with size zero before the transfer starts; the size is set only
/// from a successful verification round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: FileId,
    pub name: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
}

impl FileDescriptor {
    /// A descriptor for a file whose bytes have not been stored yet.
    pub fn incomplete(name: impl Into<String>, mime: impl Into<String>) -> Self {
        let mime = mime.into();
        Self {
            id: FileId::new(),
            name: name.into(),
            mime: if mime.is_empty() { DEFAULT_MIME.to_string() } else { mime },
            size: 0,
        }
    }

    /// Consume the descriptor and return it with the verified size applied.
    pub fn with_verified_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Returns `true` while no verified size has been applied.
    pub fn is_incomplete(&self) -> bool {
        self.size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UploadRequest {
        UploadRequest::new(1024, Principal::new("u-1", "alice"), BucketName::default())
    }

    #[test]
    fn request_accessors() {
        let r = request();
        assert_eq!(r.declared_size(), 1024);
        assert_eq!(r.principal().username, "alice");
        assert_eq!(r.bucket().as_str(), "data");
    }

    #[test]
    fn origin_joins_username_and_file() {
        assert_eq!(request().origin_for("cat.png"), "alice-cat.png");
    }

    #[test]
    fn incomplete_descriptor_has_zero_size() {
        let d = FileDescriptor::incomplete("cat.png", "image/png");
        assert!(d.is_incomplete());
        assert_eq!(d.mime, "image/png");
    }

    #[test]
    fn empty_mime_falls_back() {
        let d = FileDescriptor::incomplete("blob", "");
        assert_eq!(d.mime, DEFAULT_MIME);
    }

    #[test]
    fn verified_size_keeps_identity() {
        let d = FileDescriptor::incomplete("cat.png", "image/png");
        let id = d.id;
        let d = d.with_verified_size(4096);
        assert_eq!(d.size, 4096);
        assert_eq!(d.id, id);
        assert!(!d.is_incomplete());
    }

    #[test]
    fn descriptor_serializes_mime_as_type() {
        let d = FileDescriptor::incomplete("a.txt", "text/plain");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["type"], "text/plain");
        assert_eq!(json["size"], 0);
    }
}
