pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod medication;
pub mod notify;
pub mod reconciler;
pub mod store;
