pub mod api;
pub mod job;
pub mod messages;
pub mod result;
