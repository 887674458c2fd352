pub mod backup;
pub mod dump;
pub mod retention;
