pub mod manifest;
pub mod sheets;
pub mod telegram;
pub mod transfer;
