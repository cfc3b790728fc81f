//! Per-request caller identity.
//!
//! The identity middleware builds a `RequestContext` from the `X-User-ID`
//! header and stores it in request extensions. Handlers pull the caller out
//! with [`RequestContext::user_id`], which fails with `Unauthorized` before
//! any authorization check runs.

use crate::errors::EnclaveError;
use common::UserId;

/// Header carrying the authenticated caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestContext {
    user_id: Option<UserId>,
}

impl RequestContext {
    /// Context for an identified caller.
    pub fn authenticated(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    /// Context for a request without a usable identity.
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    /// Parse a raw header value. Non-positive or non-numeric ids are absent.
    pub fn from_header_value(value: Option<&str>) -> Self {
        let user_id = value
            .map(str::trim)
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(UserId);
        Self { user_id }
    }

    /// The caller, or `Unauthorized` when no identity was supplied.
    pub fn user_id(&self) -> Result<UserId, EnclaveError> {
        self.user_id.ok_or(EnclaveError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_numeric_header() {
        let ctx = RequestContext::from_header_value(Some(" 42 "));
        assert!(matches!(ctx.user_id(), Ok(UserId(42))));
    }

    #[test]
    fn test_missing_or_malformed_header_is_unauthorized() {
        for value in [None, Some(""), Some("abc"), Some("0"), Some("-3")] {
            let ctx = RequestContext::from_header_value(value);
            assert!(matches!(ctx.user_id(), Err(EnclaveError::Unauthorized)));
        }
    }

    #[test]
    fn test_constructors() {
        assert!(RequestContext::authenticated(UserId(1)).user_id().is_ok());
        assert!(RequestContext::anonymous().user_id().is_err());
    }
}
