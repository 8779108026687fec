pub mod price_service;
pub mod rebalance_service;
pub mod refresher;
pub mod valuation_service;
