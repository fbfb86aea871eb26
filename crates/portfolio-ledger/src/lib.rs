pub mod accounts;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;

pub use accounts::AccountManager;
pub use db::LedgerDb;
pub use error::LedgerError;
pub use ledger::{Ledger, LedgerConfig};
pub use models::*;
