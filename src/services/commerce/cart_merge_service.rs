use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbBackend, EntityTrait, QueryFilter, QuerySelect,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::cart_service::{
    checked_line_quantity, ensure_cart, load_cart_view, touch_cart, CartView,
};
use crate::db::locks::{advisory_xact_lock, begin_write, KeyedLocks};
use crate::entities::commerce::{
    cart::{self, CartOwner},
    cart_item,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Folds a guest cart into the cart of the account that just authenticated.
#[derive(Clone)]
pub struct CartMergeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    user_locks: KeyedLocks<Uuid>,
}

impl CartMergeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db,
            event_sender,
            user_locks: KeyedLocks::new(),
        }
    }

    /// Merges the session cart identified by `old_session_id` into the user's
    /// cart and returns the result.
    ///
    /// Lines for the same variant are coalesced by summing quantities and the
    /// guest cart is deleted. A coalesced line above the per-line limit fails
    /// the whole merge and leaves both carts untouched. A missing or already
    /// merged session cart leaves the user cart as it is, so repeating a merge
    /// is harmless. Merges for the same user run one at a time.
    #[instrument(skip(self))]
    pub async fn merge(
        &self,
        old_session_id: Option<&str>,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let _guard = self.user_locks.lock(user_id).await;

        let txn = begin_write(&*self.db).await?;
        advisory_xact_lock(&txn, "cart_merge", &user_id.to_string()).await?;

        let user_owner = CartOwner::User(user_id);
        let user_cart = ensure_cart(&txn, &user_owner).await?;

        let session_cart = match old_session_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(token) => find_session_cart_for_update(&txn, token).await?,
            None => None,
        };

        let Some(session_cart) = session_cart else {
            debug!(%user_id, "no guest cart to merge");
            let view = load_cart_view(&txn, user_cart).await?;
            txn.commit().await?;
            return Ok(view);
        };

        let merged_items = fold_items(&txn, session_cart.id, user_cart.id).await?;

        cart::Entity::delete_by_id(session_cart.id)
            .exec(&txn)
            .await?;
        touch_cart(&txn, user_cart.id).await?;

        let view = load_cart_view(&txn, user_cart).await?;
        txn.commit().await?;

        info!(
            %user_id,
            user_cart_id = %view.id,
            guest_cart_id = %session_cart.id,
            merged_items,
            "Guest cart merged into user cart"
        );
        counter!("storefront.carts.merged", 1);
        self.event_sender.send_or_log(Event::CartsMerged {
            user_id,
            user_cart_id: view.id,
            merged_items,
        });

        Ok(view)
    }
}

async fn find_session_cart_for_update(
    txn: &DatabaseTransaction,
    token: &str,
) -> Result<Option<cart::Model>, ServiceError> {
    let owner = CartOwner::Session(token.to_string());
    let mut query = cart::Entity::find().filter(owner.filter());
    if txn.get_database_backend() == DbBackend::Postgres {
        query = query.lock_exclusive();
    }
    Ok(query.one(txn).await?)
}

/// Moves every line of `from_cart` under `into_cart`, returning how many
/// guest lines were folded.
async fn fold_items(
    txn: &DatabaseTransaction,
    from_cart: Uuid,
    into_cart: Uuid,
) -> Result<usize, ServiceError> {
    let guest_items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(from_cart))
        .all(txn)
        .await?;

    let now = Utc::now();
    let count = guest_items.len();
    for item in guest_items {
        let existing = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(into_cart))
            .filter(cart_item::Column::VariantId.eq(item.variant_id))
            .one(txn)
            .await?;

        match existing {
            Some(target) => {
                let quantity = checked_line_quantity(target.quantity, item.quantity)?;
                let mut active: cart_item::ActiveModel = target.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(txn).await?;
                cart_item::Entity::delete_by_id(item.id).exec(txn).await?;
            }
            None => {
                let mut active: cart_item::ActiveModel = item.into();
                active.cart_id = Set(into_cart);
                active.updated_at = Set(now);
                active.update(txn).await?;
            }
        }
    }
    Ok(count)
}
