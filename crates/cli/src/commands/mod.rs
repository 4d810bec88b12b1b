pub mod backup;
pub mod cleanup;
pub mod connection;
pub mod history;
pub mod restore;
pub mod verify;
