pub mod config;
pub mod context;
pub mod observability;
pub mod scheduler;
pub mod shutdown;
pub mod synth;
pub mod transport;
pub mod workload;

#[cfg(test)]
mod tests;
