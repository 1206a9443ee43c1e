use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Shopping cart entity. Ownership is stored as a (kind, key) pair with a
/// unique index; application code goes through [`CartOwner`].
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_kind: CartOwnerKind,
    pub owner_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Decodes the stored ownership pair
    pub fn owner(&self) -> Option<CartOwner> {
        match self.owner_kind {
            CartOwnerKind::Session => Some(CartOwner::Session(self.owner_key.clone())),
            CartOwnerKind::User => Uuid::parse_str(&self.owner_key).ok().map(CartOwner::User),
        }
    }

    pub fn is_owned_by(&self, owner: &CartOwner) -> bool {
        self.owner_kind == owner.kind() && self.owner_key == owner.key()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Cart owner discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CartOwnerKind {
    #[sea_orm(string_value = "session")]
    Session,
    #[sea_orm(string_value = "user")]
    User,
}

/// Who a cart belongs to. A cart is owned by exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// Anonymous visitor identified by a session token
    Session(String),
    /// Authenticated account
    User(Uuid),
}

impl CartOwner {
    pub fn kind(&self) -> CartOwnerKind {
        match self {
            CartOwner::Session(_) => CartOwnerKind::Session,
            CartOwner::User(_) => CartOwnerKind::User,
        }
    }

    pub fn key(&self) -> String {
        match self {
            CartOwner::Session(token) => token.clone(),
            CartOwner::User(id) => id.to_string(),
        }
    }

    pub fn filter(&self) -> sea_orm::Condition {
        sea_orm::Condition::all()
            .add(Column::OwnerKind.eq(self.kind()))
            .add(Column::OwnerKey.eq(self.key()))
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartOwner::Session(token) => write!(f, "session:{}", token),
            CartOwner::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart_for(owner: &CartOwner) -> Model {
        Model {
            id: Uuid::new_v4(),
            owner_kind: owner.kind(),
            owner_key: owner.key(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_round_trips_through_storage_pair() {
        let user = CartOwner::User(Uuid::new_v4());
        let session = CartOwner::Session("sess-abc".into());
        assert_eq!(cart_for(&user).owner(), Some(user.clone()));
        assert_eq!(cart_for(&session).owner(), Some(session.clone()));
        assert!(cart_for(&user).is_owned_by(&user));
        assert!(!cart_for(&user).is_owned_by(&session));
    }

    #[test]
    fn session_token_that_looks_like_a_uuid_is_not_a_user() {
        let id = Uuid::new_v4();
        let session_cart = cart_for(&CartOwner::Session(id.to_string()));
        assert!(!session_cart.is_owned_by(&CartOwner::User(id)));
    }
}
