pub mod engine;
pub mod filter;
pub mod refresher;
pub mod stats;
pub mod subscriptions;

#[cfg(test)]
pub mod testing;
