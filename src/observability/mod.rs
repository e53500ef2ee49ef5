// Observability: metrics recorded during normalization runs

pub mod metrics;
