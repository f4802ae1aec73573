pub mod event;
pub mod identity;
