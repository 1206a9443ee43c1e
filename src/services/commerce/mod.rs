/// Commerce services module - carts, checkout and catalog
pub mod cart_merge_service;
pub mod cart_service;
pub mod checkout_service;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_merge_service::CartMergeService;
pub use cart_service::{AddToCartInput, CartLineView, CartService, CartView};
pub use checkout_service::{CheckoutService, CheckoutSettings, CreateOrderFromCartRequest};
pub use product_catalog_service::{CreateProductInput, CreateVariantInput, ProductCatalogService};
