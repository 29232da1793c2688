pub mod event;
pub mod health;
pub mod job;
pub mod settings;
pub mod snapshot;
