use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, ClinicSettings};
use shared_database::InMemoryClinicStore;
use shared_models::auth::User;
use shared_models::{Doctor, Patient, Tenant};

use crate::clock::FixedClock;
use crate::state::AppState;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_role_key: "test-service-role-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_role_key: self.supabase_service_role_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            seed_file: None,
            port: 0,
            clinic: ClinicSettings::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant: Tenant,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "receptionist", random_tenant())
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str, tenant: Tenant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            tenant,
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor", random_tenant())
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin", random_tenant())
    }

    /// A doctor account whose user id is the doctor's directory id.
    pub fn for_doctor(doctor: &Doctor) -> Self {
        Self {
            id: doctor.id.to_string(),
            email: "doctor@clinic.test".to_string(),
            role: "doctor".to_string(),
            tenant: doctor.tenant(),
        }
    }

    pub fn staff(tenant: Tenant) -> Self {
        Self::new("front-desk@clinic.test", "receptionist", tenant)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            organization_id: Some(self.tenant.organization_id),
            location_id: Some(self.tenant.location_id),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub fn random_tenant() -> Tenant {
    Tenant {
        organization_id: Uuid::new_v4(),
        location_id: Uuid::new_v4(),
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "app_metadata": {
                "organization_id": user.tenant.organization_id,
                "location_id": user.tenant.location_id,
            },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, Some(1)))
    }
}

/// A single clinic with one doctor and one patient on an in-memory store, with the
/// clock pinned to 2024-01-10 08:00 UTC.
pub struct ClinicFixture {
    pub tenant: Tenant,
    pub doctor: Doctor,
    pub patient: Patient,
    pub store: Arc<InMemoryClinicStore>,
    pub clock: Arc<FixedClock>,
    pub config: TestConfig,
}

impl ClinicFixture {
    pub fn new() -> Self {
        Self::with_consultation_fee(Some(Decimal::new(50000, 2)))
    }

    pub fn with_consultation_fee(fee: Option<Decimal>) -> Self {
        let tenant = random_tenant();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Amara Okafor".to_string(),
            consultation_fee: fee,
            organization_id: tenant.organization_id,
            location_id: tenant.location_id,
        };
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: "Jonas Lindqvist".to_string(),
            balance: Decimal::ZERO,
            organization_id: tenant.organization_id,
            location_id: tenant.location_id,
        };

        let store = Arc::new(InMemoryClinicStore::with_directory(
            vec![doctor.clone()],
            vec![patient.clone()],
        ));

        Self {
            tenant,
            doctor,
            patient,
            store,
            clock: Arc::new(FixedClock::new(Self::start_instant())),
            config: TestConfig::default(),
        }
    }

    pub fn start_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn staff(&self) -> User {
        TestUser::staff(self.tenant).to_user()
    }

    pub fn doctor_user(&self) -> User {
        TestUser::for_doctor(&self.doctor).to_user()
    }

    /// A patient registered at the same clinic.
    pub async fn add_patient(&self, full_name: &str) -> Patient {
        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            balance: Decimal::ZERO,
            organization_id: self.tenant.organization_id,
            location_id: self.tenant.location_id,
        };
        self.store.insert_patient(patient.clone()).await;
        patient
    }

    /// A doctor at a different clinic.
    pub async fn add_foreign_doctor(&self) -> Doctor {
        let tenant = random_tenant();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            full_name: "Dr. Elsewhere".to_string(),
            consultation_fee: None,
            organization_id: tenant.organization_id,
            location_id: tenant.location_id,
        };
        self.store.insert_doctor(doctor.clone()).await;
        doctor
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(
            self.config.to_arc(),
            self.store.clone(),
            self.clock.clone(),
        ))
    }

    pub fn bearer_for(&self, user: &TestUser) -> String {
        JwtTestUtils::bearer(user, &self.config.jwt_secret)
    }
}

impl Default for ClinicFixture {
    fn default() -> Self {
        Self::new()
    }
}
