pub mod alerting;
pub mod ingest;
pub mod notifier;
