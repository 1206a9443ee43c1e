use crate::{
    entities::commerce::{product_variant, ProductModel, ProductVariant, ProductVariantModel},
    entities::product,
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Product catalog service for managing products and variants
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new product
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            sales_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!("Created product: {}", product.id);
        Ok(product)
    }

    /// Create a purchasable variant under an existing product
    #[instrument(skip(self))]
    pub async fn create_variant(
        &self,
        input: CreateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        input.validate()?;

        product::Entity::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(input.product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price_cents: Set(input.price_cents),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(variant_id = %variant.id, sku = %variant.sku, "Created variant");
        Ok(variant)
    }

    /// Change the live price. Existing orders keep the price they captured.
    #[instrument(skip(self))]
    pub async fn set_variant_price(
        &self,
        variant_id: Uuid,
        price_cents: i64,
    ) -> Result<ProductVariantModel, ServiceError> {
        if price_cents < 0 {
            return Err(ServiceError::ValidationError(
                "Price must not be negative".to_string(),
            ));
        }

        let variant = self.get_variant(variant_id).await?;
        let mut active: product_variant::ActiveModel = variant.into();
        active.price_cents = Set(price_cents);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn get_variant(&self, variant_id: Uuid) -> Result<ProductVariantModel, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::VariantNotFound(variant_id))
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Variants of a product ordered by SKU
    pub async fn list_variants(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ProductVariantModel>, ServiceError> {
        Ok(ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::Sku)
            .all(&*self.db)
            .await?)
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

/// Input for creating a variant
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateVariantInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(range(min = 0))]
    pub price_cents: i64,
    #[validate(range(min = 0))]
    pub stock: i32,
}
