pub mod catalog;
pub mod chat;
pub mod events;
pub mod outfit;
pub mod summary;
