use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::Tenant;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Clinic scope is issued by the auth service inside `app_metadata`.
    pub fn tenant_ids(&self) -> (Option<Uuid>, Option<Uuid>) {
        let lookup = |key: &str| {
            self.app_metadata
                .as_ref()
                .and_then(|meta| meta.get(key))
                .and_then(|value| value.as_str())
                .and_then(|raw| Uuid::parse_str(raw).ok())
        };

        (lookup("organization_id"), lookup("location_id"))
    }
}

/// The authenticated actor of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    pub fn is_doctor(&self) -> bool {
        self.has_role("doctor")
    }

    pub fn is_admin(&self) -> bool {
        self.has_role("admin")
    }

    /// Compares as UUIDs so the casing of the token's `sub` does not matter.
    pub fn is(&self, id: Uuid) -> bool {
        Uuid::parse_str(&self.id).map_or(false, |own| own == id)
    }

    pub fn tenant(&self) -> Option<Tenant> {
        match (self.organization_id, self.location_id) {
            (Some(organization_id), Some(location_id)) => Some(Tenant { organization_id, location_id }),
            _ => None,
        }
    }

    /// True when the actor is scoped to exactly this clinic.
    pub fn belongs_to(&self, tenant: Tenant) -> bool {
        self.tenant() == Some(tenant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tenant_ids_are_read_from_app_metadata() {
        let org = Uuid::new_v4();
        let loc = Uuid::new_v4();
        let claims = JwtClaims {
            sub: "user".to_string(),
            exp: None,
            email: None,
            role: Some("doctor".to_string()),
            app_metadata: Some(json!({ "organization_id": org, "location_id": loc })),
            user_metadata: None,
            aud: None,
            iat: None,
        };

        assert_eq!(claims.tenant_ids(), (Some(org), Some(loc)));
    }

    #[test]
    fn identity_check_ignores_uuid_casing() {
        let id = Uuid::new_v4();
        let user = User {
            id: id.to_string().to_uppercase(),
            email: None,
            role: Some("doctor".to_string()),
            organization_id: None,
            location_id: None,
            metadata: None,
            created_at: None,
        };

        assert!(user.is(id));
        assert!(!user.is(Uuid::new_v4()));
    }

    #[test]
    fn user_without_location_has_no_tenant() {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: Some("admin".to_string()),
            organization_id: Some(Uuid::new_v4()),
            location_id: None,
            metadata: None,
            created_at: None,
        };

        assert!(user.is_admin());
        assert!(!user.is_doctor());
        assert!(user.tenant().is_none());
        assert!(!user.belongs_to(Tenant {
            organization_id: user.organization_id.unwrap(),
            location_id: Uuid::new_v4(),
        }));
    }
}
