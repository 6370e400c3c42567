pub mod deployments;
pub mod health;
pub mod npm;
pub mod setup;
pub mod usage;
pub mod users;
