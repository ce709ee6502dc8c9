pub mod config;
pub mod fingerprint;
