pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod elo;
pub mod error;
pub mod ffa;
pub mod latest;
pub mod metrics;
pub mod recorder;
pub mod replay;
pub mod saga;
pub mod skill;
pub mod standings;
pub mod store;
