/// Commerce API handlers module
pub mod carts;

// Re-export route builders
pub use carts::carts_routes;
