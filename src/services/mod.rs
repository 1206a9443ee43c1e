// Core services
pub mod orders;

// Simple status helpers that work directly with entities
pub mod order_status;

// Inventory management services
pub mod inventory_ledger;

// Commerce
pub mod commerce;
