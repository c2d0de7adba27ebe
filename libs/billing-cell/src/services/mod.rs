pub mod amounts;
pub mod cascade;
pub mod ledger;
