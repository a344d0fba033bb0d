pub mod api;
pub mod db;
pub mod recharge_api;
pub mod recharge_http;
