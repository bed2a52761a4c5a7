//! One module per top-level subcommand.

pub mod completions;
pub mod keygen;
pub mod med;
pub mod notifications;
pub mod reconcile;
pub mod run;
pub mod user;
