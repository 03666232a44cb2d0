pub mod chart;
pub mod orderbook;
pub mod persistence;
pub mod poller;
pub mod registry;
pub mod stockbit;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
