pub mod health;
pub mod trackers;
