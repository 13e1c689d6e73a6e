use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Stable string tag attached to every upload outcome.
///
/// These strings are a public contract for any HTTP layer built on top of the
/// pipeline and must never change spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decorator {
    UploadSizeTooLarge,
    UploadNoBuckets,
    UploadBucketCheckFailed,
    UploadNotEnoughSpaceRemains,
    UploadFailure,
    UploadStreamSuccess,
    UploadVerifyFailure,
    UploadSuccess,
}

impl Decorator {
    pub const ALL: [Decorator; 8] = [
        Self::UploadSizeTooLarge,
        Self::UploadNoBuckets,
        Self::UploadBucketCheckFailed,
        Self::UploadNotEnoughSpaceRemains,
        Self::UploadFailure,
        Self::UploadStreamSuccess,
        Self::UploadVerifyFailure,
        Self::UploadSuccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadSizeTooLarge => "UPLOAD_SIZE_TOO_LARGE",
            Self::UploadNoBuckets => "UPLOAD_NO_BUCKETS",
            Self::UploadBucketCheckFailed => "UPLOAD_BUCKET_CHECK_FAILED",
            Self::UploadNotEnoughSpaceRemains => "UPLOAD_NOT_ENOUGH_SPACE_REMAINS",
            Self::UploadFailure => "UPLOAD_FAILURE",
            Self::UploadStreamSuccess => "UPLOAD_STREAM_SUCCESS",
            Self::UploadVerifyFailure => "UPLOAD_VERIFY_FAILURE",
            Self::UploadSuccess => "UPLOAD_SUCCESS",
        }
    }

    /// Returns `true` for tags that mark a failed upload.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::UploadStreamSuccess | Self::UploadSuccess)
    }
}

impl fmt::Display for Decorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decorator {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TypeError::UnknownDecorator(s.to_string()))
    }
}
