pub mod account;
pub mod assignment;
pub mod event;
pub mod history;
pub mod location;
pub mod shipment;
