//! Device trust based on the client user-agent string.

use axum::http::{HeaderMap, header::USER_AGENT};

use super::storage::AccountRecord;

/// Fingerprint for clients that send no user-agent header.
pub const UNKNOWN_AGENT: &str = "unknown";

/// Canonical client fingerprint for the request: the trimmed user-agent.
#[must_use]
pub fn fingerprint(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_AGENT)
        .to_string()
}

/// Exact-match membership in the account's trusted set.
#[must_use]
pub fn is_trusted(account: &AccountRecord, fingerprint: &str) -> bool {
    account
        .trusted_agents
        .iter()
        .any(|agent| agent == fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::storage::Role;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn account_with_agents(agents: Vec<String>) -> AccountRecord {
        AccountRecord {
            id: Uuid::nil(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            phone: None,
            bio: None,
            photo: None,
            role: Role::Regular,
            verified: false,
            trusted_agents: agents,
        }
    }

    #[test]
    fn fingerprint_trims_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(" UA-X "));
        assert_eq!(fingerprint(&headers), "UA-X");
    }

    #[test]
    fn fingerprint_defaults_when_missing_or_empty() {
        assert_eq!(fingerprint(&HeaderMap::new()), UNKNOWN_AGENT);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("  "));
        assert_eq!(fingerprint(&headers), UNKNOWN_AGENT);
    }

    #[test]
    fn trusted_requires_exact_match() {
        let account = account_with_agents(vec!["UA-X".to_string(), "UA-Y".to_string()]);
        assert!(is_trusted(&account, "UA-X"));
        assert!(is_trusted(&account, "UA-Y"));
        assert!(!is_trusted(&account, "UA-Z"));
        assert!(!is_trusted(&account, "ua-x"));
    }

    #[test]
    fn empty_set_trusts_nothing() {
        let account = account_with_agents(Vec::new());
        assert!(!is_trusted(&account, UNKNOWN_AGENT));
    }
}
