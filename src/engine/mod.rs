pub mod alerts;
pub mod fingerprint;
pub mod incidents;
pub mod nplusone;
pub mod percentile;
pub mod types;
