pub mod backup_result;
pub mod backup_state;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod manifest;
