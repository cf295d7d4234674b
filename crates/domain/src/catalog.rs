//! Identity and catalog lookups consumed by the marketplace core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, Role, RoleSet, UserId, has_any_role};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::MarketError;

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub roles: RoleSet,
}

impl Actor {
    pub fn new(id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(Role::Admin)
    }

    /// Fails with `Forbidden` unless the actor holds one of `required`.
    pub fn require(&self, required: &[Role], action: &'static str) -> Result<(), MarketError> {
        if has_any_role(&self.roles, required) {
            Ok(())
        } else {
            Err(MarketError::Forbidden { action })
        }
    }
}

/// A user as seen by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub roles: RoleSet,
}

impl UserProfile {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            roles: self.roles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Price in minor currency units.
    pub unit_price: i64,
}

/// Read-only lookup of users and products.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fails with `NotFound` if the user does not exist.
    async fn get_user(&self, id: UserId) -> Result<UserProfile, MarketError>;

    /// Fails with `NotFound` if the product does not exist.
    async fn get_product(&self, id: ProductId) -> Result<Product, MarketError>;
}

/// Initial catalog contents, usually loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Default)]
struct CatalogState {
    users: HashMap<UserId, UserProfile>,
    products: HashMap<ProductId, Product>,
}

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let state = CatalogState {
            users: seed.users.into_iter().map(|u| (u.id, u)).collect(),
            products: seed.products.into_iter().map(|p| (p.id, p)).collect(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_seed(serde_json::from_str(json)?))
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn add_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_user(&self, id: UserId) -> Result<UserProfile, MarketError> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("User", id))
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, MarketError> {
        self.state
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| MarketError::not_found("Product", id))
    }
}
