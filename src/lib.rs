// Library for tests to access modules

pub mod aggregator;
pub mod config;
pub mod data_log;
pub mod models;
pub mod probe;
pub mod publisher;
pub mod routes;
pub mod scheduler;
pub mod series;
pub mod version;
pub mod warm_start;
