pub mod booking;
pub mod follow_up;
pub mod lifecycle;
pub mod slots;
