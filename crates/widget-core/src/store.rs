//! Storage Gateway Ports
//!
//! The storage engine owns durability and isolation. Callers own only the
//! ordering of their writes, so every port method is a single independent
//! operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    NewCustomer, NewOrder, NewTransaction, NewUser, OrderDetail, OrderStatus, Page, PageRequest,
    StoredToken, User, UserUpdate, Widget,
};

/// Widgets, customers, transactions and orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_widget(&self, id: i64) -> Result<Widget>;

    /// Returns the new customer id
    async fn insert_customer(&self, customer: NewCustomer) -> Result<i64>;

    /// Returns the new transaction id
    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<i64>;

    /// Returns the new order id; the referenced transaction must exist
    async fn insert_order(&self, order: NewOrder) -> Result<i64>;

    async fn get_order(&self, id: i64) -> Result<OrderDetail>;

    async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<()>;

    /// One-off sales, newest first
    async fn all_orders(&self, page: PageRequest) -> Result<Page<OrderDetail>>;

    /// Orders for recurring widgets, newest first
    async fn all_subscriptions(&self, page: PageRequest) -> Result<Page<OrderDetail>>;
}

/// Operator accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<User>;

    async fn get_user_by_email(&self, email: &str) -> Result<User>;

    async fn all_users(&self) -> Result<Vec<User>>;

    async fn add_user(&self, user: NewUser, password_hash: &str) -> Result<i64>;

    async fn edit_user(&self, user: UserUpdate) -> Result<()>;

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<()>;

    /// Removes the user and any token they own
    async fn delete_user(&self, id: i64) -> Result<()>;
}

/// Bearer token hashes
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store `token`, deleting any prior token for the same user
    async fn insert_token(&self, token: StoredToken) -> Result<()>;

    /// Owner of an unexpired token with exactly this hash, if the owner still exists
    async fn get_user_for_token(&self, hash: &[u8; 32], now: DateTime<Utc>) -> Result<Option<User>>;
}
