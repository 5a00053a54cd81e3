//! Upstream status classification.
//!
//! Maps the status code of a commit probe to an authentication verdict.  The
//! mapping is a closed table of status ranges; adding an explicit rejection
//! is a one-line edit to [`REJECTIONS`].  Nothing here logs or performs I/O.

use std::fmt;
use std::ops::RangeInclusive;

use reqwest::StatusCode;
use serde::Deserialize;

/// Why the upstream response counts as a rejected credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Redirect,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    ServerError,
    /// Only produced under [`StatusPolicy::AllowList`].
    Unrecognized,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::ServerError => "server error",
            Self::Unrecognized => "unrecognized status",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses that always reject the credential, regardless of policy.
///
/// Redirects are rejected rather than followed: the API answers directly for
/// a valid credential.
pub const REJECTIONS: &[(RangeInclusive<u16>, RejectReason)] = &[
    (301..=302, RejectReason::Redirect),
    (400..=400, RejectReason::BadRequest),
    (401..=401, RejectReason::Unauthorized),
    (403..=403, RejectReason::Forbidden),
    (404..=404, RejectReason::NotFound),
    (500..=999, RejectReason::ServerError),
];

/// Statuses accepted under [`StatusPolicy::AllowList`].  422 is what the
/// provider answers for a repeated status write with a valid credential.
pub const ALLOWED: &[RangeInclusive<u16>] = &[200..=299, 422..=422];

/// Treatment of statuses that are not in [`REJECTIONS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusPolicy {
    /// Anything not explicitly rejected authenticates.
    #[default]
    FailOpen,
    /// Only statuses in [`ALLOWED`] authenticate.
    AllowList,
}

/// Verdict for one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Authenticated,
    Rejected(RejectReason),
}

/// Classify an upstream status under `policy`.
pub fn classify(status: StatusCode, policy: StatusPolicy) -> Classification {
    let code = status.as_u16();

    if let Some((_, reason)) = REJECTIONS.iter().find(|(range, _)| range.contains(&code)) {
        return Classification::Rejected(*reason);
    }

    match policy {
        StatusPolicy::FailOpen => Classification::Authenticated,
        StatusPolicy::AllowList if ALLOWED.iter().any(|range| range.contains(&code)) => {
            Classification::Authenticated
        }
        StatusPolicy::AllowList => Classification::Rejected(RejectReason::Unrecognized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    fn fail_open(code: u16) -> Classification {
        classify(status(code), StatusPolicy::FailOpen)
    }

    #[test]
    fn explicit_rejections() {
        assert_eq!(fail_open(400), Classification::Rejected(RejectReason::BadRequest));
        assert_eq!(fail_open(401), Classification::Rejected(RejectReason::Unauthorized));
        assert_eq!(fail_open(403), Classification::Rejected(RejectReason::Forbidden));
        assert_eq!(fail_open(404), Classification::Rejected(RejectReason::NotFound));
    }

    #[test]
    fn every_5xx_rejects() {
        for code in [500, 502, 503, 504, 599] {
            assert_eq!(fail_open(code), Classification::Rejected(RejectReason::ServerError));
        }
    }

    #[test]
    fn moved_and_found_reject_as_redirect() {
        assert_eq!(fail_open(301), Classification::Rejected(RejectReason::Redirect));
        assert_eq!(fail_open(302), Classification::Rejected(RejectReason::Redirect));
    }

    #[test]
    fn fail_open_accepts_everything_else() {
        for code in [100, 103, 200, 201, 204, 304, 307, 308, 405, 409, 422, 429] {
            assert_eq!(fail_open(code), Classification::Authenticated, "status {code}");
        }
    }

    #[test]
    fn allow_list_accepts_success_and_unprocessable() {
        for code in [200, 201, 204, 422] {
            assert_eq!(
                classify(status(code), StatusPolicy::AllowList),
                Classification::Authenticated,
                "status {code}"
            );
        }
    }

    #[test]
    fn allow_list_rejects_unlisted_statuses() {
        for code in [304, 307, 409, 429] {
            assert_eq!(
                classify(status(code), StatusPolicy::AllowList),
                Classification::Rejected(RejectReason::Unrecognized),
                "status {code}"
            );
        }
    }

    #[test]
    fn explicit_rejections_win_under_allow_list() {
        assert_eq!(
            classify(status(401), StatusPolicy::AllowList),
            Classification::Rejected(RejectReason::Unauthorized)
        );
    }

    #[test]
    fn reject_reason_display() {
        assert_eq!(RejectReason::Redirect.to_string(), "redirect");
        assert_eq!(RejectReason::ServerError.to_string(), "server error");
    }
}
