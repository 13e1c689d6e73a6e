use std::fmt;

use serde::Serialize;
use serde_json::json;
use sluice_quota::QuotaDenial;
use sluice_types::{ContentPath, Decorator, FileDescriptor};

/// Failure taxonomy of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureKind {
    /// Declared size over the hard limit or over the remaining capacity.
    QuotaExceeded(QuotaDenial),
    /// The usage query failed.
    QuotaCheckFailed,
    /// The principal has no bucket handle.
    NoBackend,
    /// I/O error while transferring, or the stream ended without a push.
    StreamFailure,
    /// The request was cancelled or timed out before it completed.
    Aborted,
    /// No fresh backend handle could be acquired to verify the write.
    RefreshFailed,
    /// The write completed but could not be confirmed.
    VerifyFailure,
}

impl FailureKind {
    pub fn decorator(&self) -> Decorator {
        match self {
            Self::QuotaExceeded(QuotaDenial::SizeTooLarge { .. }) => Decorator::UploadSizeTooLarge,
            Self::QuotaExceeded(QuotaDenial::NotEnoughSpace { .. }) => {
                Decorator::UploadNotEnoughSpaceRemains
            }
            Self::QuotaCheckFailed => Decorator::UploadBucketCheckFailed,
            Self::NoBackend => Decorator::UploadNoBuckets,
            Self::StreamFailure | Self::Aborted | Self::RefreshFailed => Decorator::UploadFailure,
            Self::VerifyFailure => Decorator::UploadVerifyFailure,
        }
    }

    /// Whether this kind is reported to the alert sink.
    pub fn alerts(&self) -> bool {
        matches!(self, Self::StreamFailure | Self::VerifyFailure)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QuotaExceeded(_) => "quota exceeded",
            Self::QuotaCheckFailed => "quota check failed",
            Self::NoBackend => "no backend",
            Self::StreamFailure => "stream failure",
            Self::Aborted => "aborted",
            Self::RefreshFailed => "refresh failed",
            Self::VerifyFailure => "verify failure",
        };
        f.write_str(name)
    }
}

/// A failed upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
    /// `<user>-<file name>` once a part was seen, otherwise the username.
    pub origin: String,
}

/// Result of the stream phase: the pushed content path, not yet verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamCompletion {
    pub descriptor: FileDescriptor,
    pub path: ContentPath,
}

impl StreamCompletion {
    pub fn decorator(&self) -> Decorator {
        Decorator::UploadStreamSuccess
    }
}

/// Final result of one upload. Exactly one per request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Success {
        /// Descriptor whose size came from verification.
        descriptor: FileDescriptor,
        content: ContentPath,
    },
    Failure(UploadFailure),
}

impl UploadOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self::Failure(UploadFailure {
            kind,
            message: message.into(),
            origin: origin.into(),
        })
    }

    pub fn decorator(&self) -> Decorator {
        match self {
            Self::Success { .. } => Decorator::UploadSuccess,
            Self::Failure(failure) => failure.kind.decorator(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Whether the inbound connection may be reused. Never after a failure.
    pub fn keep_alive(&self) -> bool {
        self.is_success()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    /// Response body for callers: `{decorator, data, ipfs}` on success,
    /// `{decorator, error, message, id}` on failure.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Success {
                descriptor,
                content,
            } => json!({
                "decorator": self.decorator(),
                "data": descriptor,
                "ipfs": content,
            }),
            Self::Failure(failure) => json!({
                "decorator": self.decorator(),
                "error": true,
                "message": failure.message,
                "id": failure.origin,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decorator_mapping() {
        let cases = [
            (
                FailureKind::QuotaExceeded(QuotaDenial::SizeTooLarge { declared: 2, limit: 1 }),
                "UPLOAD_SIZE_TOO_LARGE",
            ),
            (
                FailureKind::QuotaExceeded(QuotaDenial::NotEnoughSpace {
                    declared: 2,
                    remaining: 1,
                }),
                "UPLOAD_NOT_ENOUGH_SPACE_REMAINS",
            ),
            (FailureKind::QuotaCheckFailed, "UPLOAD_BUCKET_CHECK_FAILED"),
            (FailureKind::NoBackend, "UPLOAD_NO_BUCKETS"),
            (FailureKind::StreamFailure, "UPLOAD_FAILURE"),
            (FailureKind::Aborted, "UPLOAD_FAILURE"),
            (FailureKind::RefreshFailed, "UPLOAD_FAILURE"),
            (FailureKind::VerifyFailure, "UPLOAD_VERIFY_FAILURE"),
        ];
        for (kind, tag) in cases {
            assert_eq!(kind.decorator().as_str(), tag, "{kind}");
        }
    }

    #[test]
    fn only_stream_and_verify_alert() {
        assert!(FailureKind::StreamFailure.alerts());
        assert!(FailureKind::VerifyFailure.alerts());
        assert!(!FailureKind::Aborted.alerts());
        assert!(!FailureKind::QuotaCheckFailed.alerts());
        assert!(!FailureKind::NoBackend.alerts());
        assert!(!FailureKind::RefreshFailed.alerts());
    }

    #[test]
    fn success_json_shape() {
        let descriptor = FileDescriptor::incomplete("a.txt", "text/plain").with_verified_size(4096);
        let content = ContentPath::parse("/ipfs/bafyabc").unwrap();
        let outcome = UploadOutcome::Success {
            descriptor,
            content,
        };
        assert!(outcome.keep_alive());
        let body = outcome.to_json();
        assert_eq!(body["decorator"], "UPLOAD_SUCCESS");
        assert_eq!(body["ipfs"], "/ipfs/bafyabc");
        assert_eq!(body["data"]["size"], 4096);
        assert_eq!(body["data"]["type"], "text/plain");
    }

    #[test]
    fn failure_json_shape() {
        let outcome = UploadOutcome::failure(FailureKind::StreamFailure, "reset", "alice-a.txt");
        assert!(!outcome.keep_alive());
        assert_eq!(outcome.failure_kind(), Some(FailureKind::StreamFailure));
        let body = outcome.to_json();
        assert_eq!(body["decorator"], "UPLOAD_FAILURE");
        assert_eq!(body["error"], true);
        assert_eq!(body["id"], "alice-a.txt");
    }

    #[test]
    fn stream_completion_tag() {
        let completion = StreamCompletion {
            descriptor: FileDescriptor::incomplete("a", ""),
            path: ContentPath::parse("/ipfs/x1").unwrap(),
        };
        assert_eq!(completion.decorator(), Decorator::UploadStreamSuccess);
    }
}
