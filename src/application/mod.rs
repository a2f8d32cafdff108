pub mod engine;
pub mod entitlements;
pub mod error;
pub mod export;
pub mod gate;
pub mod identity;
pub mod repos;
pub mod ticket;
pub mod usage;
