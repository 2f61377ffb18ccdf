use crate::{
    db_types::{CartItem, Coupon, NewCoupon, Product, SettingsUpdate, StoreSettings},
    traits::{LedgerError, OrderLedger},
};

/// Read access to product prices. Prices read here are snapshotted onto orders at checkout.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    /// Fetches the products with the given ids. Unknown ids are simply absent from the result.
    async fn fetch_products(&self, ids: &[String]) -> Result<Vec<Product>, LedgerError>;

    async fn upsert_product(&self, product: Product) -> Result<Product, LedgerError>;
}

#[allow(async_fn_in_trait)]
pub trait CartManagement {
    async fn fetch_cart(&self, user_id: &str) -> Result<Vec<CartItem>, LedgerError>;

    /// Adds `quantity` of the product to the user's cart, adding to any quantity already there.
    async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<CartItem, LedgerError>;

    /// Empties the user's cart, returning the number of lines removed.
    async fn clear_cart(&self, user_id: &str) -> Result<u64, LedgerError>;
}

#[allow(async_fn_in_trait)]
pub trait CouponManagement {
    async fn fetch_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, LedgerError>;

    /// The user's active coupon, if they have one
    async fn fetch_active_coupon_for_user(&self, user_id: &str) -> Result<Option<Coupon>, LedgerError>;

    /// Issues a coupon, removing any unused coupon the user already holds.
    async fn replace_coupon_for_user(&self, coupon: NewCoupon) -> Result<Coupon, LedgerError>;
}

/// Access to the single global [`StoreSettings`] record.
#[allow(async_fn_in_trait)]
pub trait SettingsManagement {
    /// Returns the settings record, creating it with default values if it does not exist yet.
    async fn fetch_or_create_settings(&self) -> Result<StoreSettings, LedgerError>;

    /// Applies a partial update to the settings record (creating it first if necessary) and returns the result.
    async fn update_settings(&self, update: SettingsUpdate) -> Result<StoreSettings, LedgerError>;
}

/// Everything checkout needs from a storage backend.
pub trait StoreBackend:
    OrderLedger + CatalogManagement + CartManagement + CouponManagement + SettingsManagement
{
}

impl<T> StoreBackend for T where T: OrderLedger + CatalogManagement + CartManagement + CouponManagement + SettingsManagement
{}
