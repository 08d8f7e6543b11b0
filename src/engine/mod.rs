pub mod history;
pub mod ledger;
pub mod lifecycle;
pub mod retry;
pub mod tracker;
