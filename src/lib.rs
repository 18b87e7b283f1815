pub mod api;
pub mod chain;
pub mod config;
pub mod humanize;
pub mod mirror;
pub mod model;
pub mod observability;
pub mod reconcile;
