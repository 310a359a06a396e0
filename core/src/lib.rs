pub mod audit;
pub mod auth;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod prediction;
pub mod reconcile;
pub mod session;
