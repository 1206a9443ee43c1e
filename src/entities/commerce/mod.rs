/// Commerce entities module
pub mod cart;
pub mod cart_item;
pub mod product_variant;

// Re-export entities
pub use super::product::{Entity as Product, Model as ProductModel};
pub use cart::{CartOwner, CartOwnerKind, Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
