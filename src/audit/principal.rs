//! Who issued an operation and where the request came from.

use async_trait::async_trait;
use serde::Serialize;

/// Request URLs longer than this are cut before being recorded.
pub const URL_LIMIT: usize = 500;

pub const ADMIN_ROLE: &str = "ADMIN";

/// The authenticated user behind an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: i64,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
    }
}

/// Resolves a user id (asserted by the upstream auth layer) to an identity.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    async fn resolve(&self, user_id: i64) -> anyhow::Result<Option<Principal>>;
}

/// Transport details of the request that triggered an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub method: Option<String>,
    pub url: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Provenance {
    pub fn new(
        method: impl Into<String>,
        url: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            method: Some(method.into()),
            url: Some(url.chars().take(URL_LIMIT).collect()),
            ip,
            user_agent,
        }
    }
}
