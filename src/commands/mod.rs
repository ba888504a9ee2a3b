pub mod bridge;
pub mod catalog;
pub mod config;
pub mod logs;
pub mod session;
pub mod strategy;
