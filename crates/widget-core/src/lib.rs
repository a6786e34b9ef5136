//! # widget-core
//!
//! Domain model and storage ports shared by every widget-store crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Storage Gateway                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐   │
//! │  │ OrderStore  │  │  UserStore  │  │     TokenStore      │   │
//! │  │ (widgets,   │  │  (operator  │  │  (bearer token      │   │
//! │  │  orders)    │  │  accounts)  │  │   hashes)           │   │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ports are split so each component depends only on the slice of
//! storage it sequences. [`MemoryStore`] implements all three.

pub mod error;
pub mod memory;
pub mod model;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use model::{
    Customer, NewCustomer, NewOrder, NewTransaction, NewUser, Order, OrderDetail, OrderStatus,
    Page, PageRequest, StoredToken, Transaction, TransactionStatus, User, UserUpdate, Widget,
};
pub use store::{OrderStore, TokenStore, UserStore};
