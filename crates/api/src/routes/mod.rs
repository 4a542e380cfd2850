pub mod checkout;
pub mod health;
pub mod maintenance;
pub mod metrics;
