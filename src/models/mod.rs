pub mod actor;
pub mod driver;
pub mod earnings;
pub mod event;
pub mod notification;
pub mod order;
