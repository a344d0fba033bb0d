pub mod models;
pub mod station;
