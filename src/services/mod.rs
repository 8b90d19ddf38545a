pub mod activity;
pub mod allocator;
pub mod approval;
pub mod costing;
pub mod forecast;
pub mod kitchen;
pub mod production;
pub mod receipt;
pub mod recipes;
pub mod stock_count;
pub mod sufficiency;
