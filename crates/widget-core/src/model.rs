//! Domain Model
//!
//! Records owned by the storage gateway. Money is always an integer amount
//! in minor units (cents); nothing here ever touches floating point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purchasable item; recurring widgets are sold as subscriptions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub inventory_level: i32,
    /// Price in minor units
    pub price: i64,
    pub image: String,
    pub is_recurring: bool,
    /// Gateway price/plan identifier for recurring widgets
    pub plan_id: String,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

impl Default for Widget {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            description: String::new(),
            inventory_level: 0,
            price: 0,
            image: String::new(),
            is_recurring: false,
            plan_id: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Transaction status ids (owned by storage)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Cleared,
    Declined,
    Refunded,
    PartiallyRefunded,
}

impl TransactionStatus {
    pub const fn id(self) -> i32 {
        match self {
            Self::Pending => 1,
            Self::Cleared => 2,
            Self::Declined => 3,
            Self::Refunded => 4,
            Self::PartiallyRefunded => 5,
        }
    }

    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Cleared),
            3 => Some(Self::Declined),
            4 => Some(Self::Refunded),
            5 => Some(Self::PartiallyRefunded),
            _ => None,
        }
    }
}

/// Order status ids (owned by storage)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Cleared,
    Refunded,
    Cancelled,
}

impl OrderStatus {
    pub const fn id(self) -> i32 {
        match self {
            Self::Cleared => 1,
            Self::Refunded => 2,
            Self::Cancelled => 3,
        }
    }

    pub const fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(Self::Cleared),
            2 => Some(Self::Refunded),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Identity captured at purchase time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A single financial event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub amount: i64,
    pub currency: String,
    pub last_four: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    /// Payment intent or subscription id on the gateway
    pub payment_intent: String,
    pub payment_method: String,
    pub bank_return_code: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: i64,
    pub currency: String,
    pub last_four: String,
    pub expiry_month: i32,
    pub expiry_year: i32,
    pub payment_intent: String,
    pub payment_method: String,
    pub bank_return_code: String,
    pub status: TransactionStatus,
}

/// Links a customer, a transaction and a widget
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub widget_id: i64,
    pub transaction_id: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub quantity: i32,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub widget_id: i64,
    pub transaction_id: i64,
    pub customer_id: i64,
    pub status: OrderStatus,
    pub quantity: i32,
    pub amount: i64,
}

/// Order joined with everything it references
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub widget: Widget,
    pub transaction: Transaction,
    pub customer: Customer,
}

/// Internal operator account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Persisted half of a bearer token; the plaintext never reaches storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredToken {
    pub hash: [u8; 32],
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: String,
}

/// Pagination request (1-based pages)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page_size: u32,
    #[serde(rename = "page")]
    pub current_page: u32,
}

impl PageRequest {
    pub const fn new(page_size: u32, current_page: u32) -> Self {
        Self {
            page_size,
            current_page,
        }
    }

    /// Clamp zero values to 1
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            page_size: self.page_size.max(1),
            current_page: self.current_page.max(1),
        }
    }

    pub fn offset(self) -> usize {
        let page = self.normalized();
        (page.current_page as usize - 1) * page.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(10, 1)
    }
}

/// One page of results plus totals
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub current_page: u32,
    pub page_size: u32,
    pub last_page: u32,
    pub total_records: u64,
    pub orders: Vec<T>,
}

impl<T> Page<T> {
    /// Slice `all` according to `request`
    pub fn slice(all: Vec<T>, request: PageRequest) -> Self {
        let request = request.normalized();
        let total = all.len();
        let last_page = total.div_ceil(request.page_size as usize);
        let orders = all
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .collect();

        Self {
            current_page: request.current_page,
            page_size: request.page_size,
            last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            total_records: total as u64,
            orders,
        }
    }
}
