pub mod memory;
pub mod store;
pub mod supabase;
pub mod supabase_store;

pub use memory::InMemoryClinicStore;
pub use store::*;
pub use supabase_store::SupabaseClinicStore;
