pub mod alerts;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod devices;
pub mod sensors;
pub mod users;
