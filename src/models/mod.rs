pub mod chat;
pub mod club;
pub mod reply;
