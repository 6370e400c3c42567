pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod deployments;
pub mod npm;
pub mod retry;
pub mod sanitize;
pub mod sync;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
