pub mod backup_exchange;
pub mod catalog;
pub mod core;
pub mod curriculum;
pub mod editor;
pub mod library;
pub mod setup;
