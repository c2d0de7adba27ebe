use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The (organization, location) scope isolating one clinic's data from another's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub organization_id: Uuid,
    pub location_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub consultation_fee: Option<Decimal>,
    pub organization_id: Uuid,
    pub location_id: Uuid,
}

impl Doctor {
    pub fn tenant(&self) -> Tenant {
        Tenant { organization_id: self.organization_id, location_id: self.location_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub balance: Decimal,
    pub organization_id: Uuid,
    pub location_id: Uuid,
}

impl Patient {
    pub fn tenant(&self) -> Tenant {
        Tenant { organization_id: self.organization_id, location_id: self.location_id }
    }
}
