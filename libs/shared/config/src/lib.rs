use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use rust_decimal::Decimal;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub seed_file: Option<String>,
    pub port: u16,
    pub clinic: ClinicSettings,
}

/// Clinic-wide business parameters. These are deployment parameters rather than
/// per-tenant configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicSettings {
    pub tax_rate: Decimal,
    pub working_hours_start: NaiveTime,
    pub working_hours_end: NaiveTime,
    pub slot_interval_minutes: u32,
    pub utc_offset_minutes: i32,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(10, 2),
            working_hours_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            working_hours_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_interval_minutes: 30,
            utc_offset_minutes: 0,
        }
    }
}

impl ClinicSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            tax_rate: parse_var("CLINIC_TAX_RATE", defaults.tax_rate, |v| Decimal::from_str(v).ok()),
            working_hours_start: parse_var("CLINIC_WORKING_HOURS_START", defaults.working_hours_start, |v| {
                NaiveTime::parse_from_str(v, "%H:%M").ok()
            }),
            working_hours_end: parse_var("CLINIC_WORKING_HOURS_END", defaults.working_hours_end, |v| {
                NaiveTime::parse_from_str(v, "%H:%M").ok()
            }),
            slot_interval_minutes: parse_var("CLINIC_SLOT_INTERVAL_MINUTES", defaults.slot_interval_minutes, |v| {
                v.parse::<u32>().ok().filter(|minutes| *minutes > 0)
            }),
            utc_offset_minutes: parse_var("CLINIC_UTC_OFFSET_MINUTES", defaults.utc_offset_minutes, |v| {
                v.parse::<i32>().ok().filter(|minutes| minutes.abs() < 24 * 60)
            }),
        }
    }

    /// Offset of the clinic's wall clock; dates and times entered by staff are read in it.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn parse_var<T: Clone>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match env::var(name) {
        Ok(raw) => parse(raw.trim()).unwrap_or_else(|| {
            warn!("{} has an invalid value '{}', using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            seed_file: env::var("CLINIC_SEED_FILE").ok(),
            port: parse_var("PORT", 3000, |v| v.parse().ok()),
            clinic: ClinicSettings::from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - falling back to the in-memory clinic store");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_role_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}
