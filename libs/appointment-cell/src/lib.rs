pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use services::booking::{AppointmentBookingGuard, SlotBooking};
pub use services::follow_up::{FollowUpScheduler, FOLLOW_UP_REASON};
pub use services::slots::SlotAvailabilityEngine;
