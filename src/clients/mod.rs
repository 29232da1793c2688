pub mod bus;
pub mod email;
pub mod queue;
pub mod render;
pub mod store;
pub mod twilio;
