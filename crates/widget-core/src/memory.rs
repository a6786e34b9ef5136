//! In-memory storage gateway (for development and tests)

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::model::{
    Customer, NewCustomer, NewOrder, NewTransaction, NewUser, Order, OrderDetail, OrderStatus,
    Page, PageRequest, StoredToken, Transaction, User, UserUpdate, Widget,
};
use crate::store::{OrderStore, TokenStore, UserStore};

#[derive(Default)]
struct Tables {
    widgets: HashMap<i64, Widget>,
    customers: HashMap<i64, Customer>,
    transactions: HashMap<i64, Transaction>,
    orders: HashMap<i64, Order>,
    users: HashMap<i64, User>,
    tokens: Vec<StoredToken>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn detail(&self, order: &Order) -> Result<OrderDetail> {
        let transaction = self
            .transactions
            .get(&order.transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("transaction", order.transaction_id))?;
        let customer = self
            .customers
            .get(&order.customer_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("customer", order.customer_id))?;
        let widget = self.widgets.get(&order.widget_id).cloned().unwrap_or_default();

        Ok(OrderDetail {
            order: order.clone(),
            widget,
            transaction,
            customer,
        })
    }

    fn orders_where(&self, recurring: bool) -> Result<Vec<OrderDetail>> {
        let mut orders: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| {
                self.widgets
                    .get(&o.widget_id)
                    .is_some_and(|w| w.is_recurring == recurring)
            })
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders.into_iter().map(|o| self.detail(o)).collect()
    }
}

/// Storage gateway backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a widget catalogue
    pub fn with_widgets(widgets: impl IntoIterator<Item = Widget>) -> Self {
        let mut tables = Tables::default();
        for widget in widgets {
            tables.next_id = tables.next_id.max(widget.id);
            tables.widgets.insert(widget.id, widget);
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn customer_count(&self) -> usize {
        self.tables.read().await.customers.len()
    }

    pub async fn transaction_count(&self) -> usize {
        self.tables.read().await.transactions.len()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    pub async fn transaction(&self, id: i64) -> Option<Transaction> {
        self.tables.read().await.transactions.get(&id).cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn get_widget(&self, id: i64) -> Result<Widget> {
        self.tables
            .read()
            .await
            .widgets
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("widget", id))
    }

    async fn insert_customer(&self, customer: NewCustomer) -> Result<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let now = Utc::now();
        tables.customers.insert(
            id,
            Customer {
                id,
                first_name: customer.first_name,
                last_name: customer.last_name,
                email: customer.email,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<i64> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        let now = Utc::now();
        tables.transactions.insert(
            id,
            Transaction {
                id,
                amount: transaction.amount,
                currency: transaction.currency,
                last_four: transaction.last_four,
                expiry_month: transaction.expiry_month,
                expiry_year: transaction.expiry_year,
                payment_intent: transaction.payment_intent,
                payment_method: transaction.payment_method,
                bank_return_code: transaction.bank_return_code,
                status: transaction.status,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<i64> {
        let mut tables = self.tables.write().await;
        if !tables.widgets.contains_key(&order.widget_id) {
            return Err(StoreError::InvalidReference(format!("widget {}", order.widget_id)));
        }
        if !tables.transactions.contains_key(&order.transaction_id) {
            return Err(StoreError::InvalidReference(format!(
                "transaction {}",
                order.transaction_id
            )));
        }
        if !tables.customers.contains_key(&order.customer_id) {
            return Err(StoreError::InvalidReference(format!(
                "customer {}",
                order.customer_id
            )));
        }

        let id = tables.next_id();
        let now = Utc::now();
        tables.orders.insert(
            id,
            Order {
                id,
                widget_id: order.widget_id,
                transaction_id: order.transaction_id,
                customer_id: order.customer_id,
                status: order.status,
                quantity: order.quantity,
                amount: order.amount,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn get_order(&self, id: i64) -> Result<OrderDetail> {
        let tables = self.tables.read().await;
        let order = tables
            .orders
            .get(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        tables.detail(order)
    }

    async fn update_order_status(&self, id: i64, status: OrderStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn all_orders(&self, page: PageRequest) -> Result<Page<OrderDetail>> {
        let all = self.tables.read().await.orders_where(false)?;
        Ok(Page::slice(all, page))
    }

    async fn all_subscriptions(&self, page: PageRequest) -> Result<Page<OrderDetail>> {
        let all = self.tables.read().await.orders_where(true)?;
        Ok(Page::slice(all, page))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: i64) -> Result<User> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", email))
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.last_name.cmp(&b.last_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn add_user(&self, user: NewUser, password_hash: &str) -> Result<i64> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }

        let id = tables.next_id();
        let now = Utc::now();
        tables.users.insert(
            id,
            User {
                id,
                first_name: user.first_name,
                last_name: user.last_name,
                email: user.email,
                password_hash: password_hash.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn edit_user(&self, update: UserUpdate) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != update.id && u.email.eq_ignore_ascii_case(&update.email))
        {
            return Err(StoreError::Conflict(format!("email {} already registered", update.email)));
        }
        let user = tables
            .users
            .get_mut(&update.id)
            .ok_or_else(|| StoreError::not_found("user", update.id))?;
        user.first_name = update.first_name;
        user.last_name = update.last_name;
        user.email = update.email;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .users
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        tables.tokens.retain(|t| t.user_id != id);
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: StoredToken) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.tokens.retain(|t| t.user_id != token.user_id);
        tables.tokens.push(token);
        Ok(())
    }

    async fn get_user_for_token(&self, hash: &[u8; 32], now: DateTime<Utc>) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .iter()
            .find(|t| &t.hash == hash && t.expiry > now)
            .and_then(|t| tables.users.get(&t.user_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::TransactionStatus;

    fn widget(id: i64, recurring: bool) -> Widget {
        Widget {
            id,
            name: format!("widget-{id}"),
            price: 1000,
            is_recurring: recurring,
            ..Default::default()
        }
    }

    fn new_transaction(amount: i64) -> NewTransaction {
        NewTransaction {
            amount,
            currency: "usd".into(),
            last_four: "4242".into(),
            expiry_month: 12,
            expiry_year: 2030,
            payment_intent: "pi_123".into(),
            payment_method: "pm_123".into(),
            bank_return_code: "ch_123".into(),
            status: TransactionStatus::Cleared,
        }
    }

    async fn place_order(store: &MemoryStore, widget_id: i64) -> i64 {
        let customer_id = store
            .insert_customer(NewCustomer {
                first_name: "Jo".into(),
                last_name: "Doe".into(),
                email: "jo@example.com".into(),
            })
            .await
            .unwrap();
        let transaction_id = store.insert_transaction(new_transaction(1000)).await.unwrap();
        store
            .insert_order(NewOrder {
                widget_id,
                transaction_id,
                customer_id,
                status: OrderStatus::Cleared,
                quantity: 1,
                amount: 1000,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_order_requires_existing_transaction() {
        let store = MemoryStore::with_widgets([widget(1, false)]);
        let err = store
            .insert_order(NewOrder {
                widget_id: 1,
                transaction_id: 999,
                customer_id: 999,
                status: OrderStatus::Cleared,
                quantity: 1,
                amount: 100,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_order_requires_known_widget() {
        let store = MemoryStore::with_widgets([widget(1, false)]);
        let customer_id = store
            .insert_customer(NewCustomer {
                first_name: "Jo".into(),
                last_name: "Doe".into(),
                email: "jo@example.com".into(),
            })
            .await
            .unwrap();
        let transaction_id = store.insert_transaction(new_transaction(1000)).await.unwrap();

        let err = store
            .insert_order(NewOrder {
                widget_id: 999,
                transaction_id,
                customer_id,
                status: OrderStatus::Cleared,
                quantity: 1,
                amount: 1000,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_sales_and_subscriptions_are_split() {
        let store = MemoryStore::with_widgets([widget(1, false), widget(2, true)]);
        for _ in 0..3 {
            place_order(&store, 1).await;
        }
        let sub = place_order(&store, 2).await;

        let sales = store.all_orders(PageRequest::new(2, 1)).await.unwrap();
        assert_eq!(sales.total_records, 3);
        assert_eq!(sales.last_page, 2);
        assert_eq!(sales.orders.len(), 2);

        let subs = store.all_subscriptions(PageRequest::default()).await.unwrap();
        assert_eq!(subs.total_records, 1);
        assert_eq!(subs.orders[0].order.id, sub);
        assert!(subs.orders[0].widget.is_recurring);
    }

    #[tokio::test]
    async fn test_update_order_status() {
        let store = MemoryStore::with_widgets([widget(1, false)]);
        let id = place_order(&store, 1).await;
        store.update_order_status(id, OrderStatus::Refunded).await.unwrap();
        assert_eq!(store.get_order(id).await.unwrap().order.status, OrderStatus::Refunded);

        let missing = store.update_order_status(404, OrderStatus::Refunded).await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_token_replaces_previous_and_respects_expiry() {
        let store = MemoryStore::new();
        let user_id = store
            .add_user(
                NewUser {
                    first_name: "Ada".into(),
                    last_name: "Admin".into(),
                    email: "admin@example.com".into(),
                },
                "hash",
            )
            .await
            .unwrap();

        let now = Utc::now();
        let first = StoredToken {
            hash: [1; 32],
            user_id,
            expiry: now + Duration::hours(1),
            scope: "authentication".into(),
        };
        store.insert_token(first).await.unwrap();
        assert!(store.get_user_for_token(&[1; 32], now).await.unwrap().is_some());

        let second = StoredToken {
            hash: [2; 32],
            user_id,
            expiry: now + Duration::hours(1),
            scope: "authentication".into(),
        };
        store.insert_token(second).await.unwrap();
        assert!(store.get_user_for_token(&[1; 32], now).await.unwrap().is_none());
        assert!(store.get_user_for_token(&[2; 32], now).await.unwrap().is_some());
        assert!(
            store
                .get_user_for_token(&[2; 32], now + Duration::hours(2))
                .await
                .unwrap()
                .is_none()
        );

        store.delete_user(user_id).await.unwrap();
        assert!(store.get_user_for_token(&[2; 32], now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        let user = NewUser {
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.com".into(),
        };
        store.add_user(user.clone(), "h").await.unwrap();
        let err = store.add_user(user, "h").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_edit_user_cannot_take_another_email() {
        let store = MemoryStore::new();
        let new_user = |email: &str| NewUser {
            first_name: "A".into(),
            last_name: "B".into(),
            email: email.into(),
        };
        store.add_user(new_user("taken@b.com"), "h").await.unwrap();
        let id = store.add_user(new_user("mine@b.com"), "h").await.unwrap();

        let update = |email: &str| UserUpdate {
            id,
            first_name: "A".into(),
            last_name: "B".into(),
            email: email.into(),
        };
        let err = store.edit_user(update("TAKEN@b.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.get_user(id).await.unwrap().email, "mine@b.com");

        store.edit_user(update("mine@b.com")).await.unwrap();
        store.edit_user(update("renamed@b.com")).await.unwrap();
        assert_eq!(store.get_user(id).await.unwrap().email, "renamed@b.com");
    }
}
