use async_trait::async_trait;
use axum::http::HeaderMap;

use herbtrace_types::OrgId;

use crate::error::{ServerError, ServerResult};

/// Request header carrying the caller's organization credential.
pub const CREDENTIAL_HEADER: &str = "x-org-credential";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Org(String),
    Anonymous,
}

impl Credentials {
    /// Read the credential header; absent or blank means anonymous.
    pub fn from_headers(headers: &HeaderMap) -> ServerResult<Self> {
        let Some(value) = headers.get(CREDENTIAL_HEADER) else {
            return Ok(Self::Anonymous);
        };
        let value = value
            .to_str()
            .map_err(|_| ServerError::AuthFailed(format!("{CREDENTIAL_HEADER} is not valid text")))?
            .trim();
        if value.is_empty() {
            Ok(Self::Anonymous)
        } else {
            Ok(Self::Org(value.to_string()))
        }
    }
}

/// Who the ledger will see as the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub org: Option<OrgId>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self { org: None }
    }

    pub fn org(id: impl Into<String>) -> Self {
        Self {
            org: Some(OrgId::new(id)),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.org.is_none()
    }

    /// Credential string handed to the ledger; empty for anonymous callers.
    pub fn credential(&self) -> &str {
        self.org.as_ref().map_or("", OrgId::as_str)
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
}

/// Trusts the credential header as-is. Which org may do what is decided by
/// the ledger.
pub struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Org(org) => Ok(Identity::org(org.clone())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }
}

/// Accepts only the listed organizations.
pub struct KnownOrgsAuth {
    orgs: Vec<OrgId>,
}

impl KnownOrgsAuth {
    pub fn new(orgs: impl IntoIterator<Item = OrgId>) -> Self {
        Self {
            orgs: orgs.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AuthProvider for KnownOrgsAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Org(org) if self.orgs.iter().any(|known| known.matches(org)) => {
                Ok(Identity::org(org.clone()))
            }
            Credentials::Org(org) => Err(ServerError::AuthFailed(format!(
                "unknown organization {org}"
            ))),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn credentials_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(Credentials::from_headers(&headers).unwrap(), Credentials::Anonymous);

        headers.insert(CREDENTIAL_HEADER, HeaderValue::from_static("  "));
        assert_eq!(Credentials::from_headers(&headers).unwrap(), Credentials::Anonymous);

        headers.insert(CREDENTIAL_HEADER, HeaderValue::from_static("Org1MSP"));
        assert_eq!(
            Credentials::from_headers(&headers).unwrap(),
            Credentials::Org("Org1MSP".into())
        );
    }

    #[test]
    fn identity_credential() {
        assert_eq!(Identity::anonymous().credential(), "");
        assert!(Identity::anonymous().is_anonymous());
        assert_eq!(Identity::org("Org2MSP").credential(), "Org2MSP");
    }

    #[tokio::test]
    async fn header_auth_passes_through() {
        let id = HeaderAuth
            .authenticate(&Credentials::Org("Org9MSP".into()))
            .await
            .unwrap();
        assert_eq!(id, Identity::org("Org9MSP"));
    }

    #[tokio::test]
    async fn known_orgs_auth_rejects_strangers() {
        let auth = KnownOrgsAuth::new([OrgId::new("Org1MSP"), OrgId::new("Org2MSP")]);
        assert!(auth
            .authenticate(&Credentials::Org("Org2MSP".into()))
            .await
            .is_ok());
        assert!(matches!(
            auth.authenticate(&Credentials::Org("Org3MSP".into())).await,
            Err(ServerError::AuthFailed(_))
        ));
        assert!(auth
            .authenticate(&Credentials::Anonymous)
            .await
            .unwrap()
            .is_anonymous());
    }
}
