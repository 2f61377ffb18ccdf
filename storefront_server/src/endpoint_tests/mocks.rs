use mockall::mock;
use storefront_engine::{
    db_types::{
        CartItem,
        Coupon,
        Kes,
        NewCoupon,
        NewOrder,
        Order,
        OrderId,
        OrderStatusType,
        Product,
        SettingsUpdate,
        StoreSettings,
    },
    order_objects::OrderQueryFilter,
    traits::{
        CartManagement,
        CatalogManagement,
        CorrelationKeys,
        CouponManagement,
        LedgerError,
        OrderLedger,
        SettingsManagement,
        Settlement,
        TransitionOutcome,
    },
};

mock! {
    pub Store {}
    impl OrderLedger for Store {
        fn url(&self) -> &str;
        async fn upsert_pending_order(&self, order: NewOrder) -> Result<(Order, bool), LedgerError>;
        async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerError>;
        async fn fetch_order_by_external_reference(&self, reference: &str) -> Result<Option<Order>, LedgerError>;
        async fn fetch_order_by_correlation(&self, keys: &CorrelationKeys) -> Result<Option<Order>, LedgerError>;
        async fn fetch_order_by_mpesa_transaction_id(&self, transaction_id: &str) -> Result<Option<Order>, LedgerError>;
        async fn fetch_pending_orders_by_amount(&self, amount: Kes) -> Result<Vec<Order>, LedgerError>;
        async fn count_pending_orders(&self) -> Result<i64, LedgerError>;
        async fn settle_order(&self, id: i64, settlement: Settlement) -> Result<TransitionOutcome, LedgerError>;
        async fn update_order_status(
            &self,
            order_id: &OrderId,
            from: OrderStatusType,
            to: OrderStatusType,
        ) -> Result<TransitionOutcome, LedgerError>;
        async fn fetch_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, LedgerError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerError>;
    }
    impl CatalogManagement for Store {
        async fn fetch_products(&self, ids: &[String]) -> Result<Vec<Product>, LedgerError>;
        async fn upsert_product(&self, product: Product) -> Result<Product, LedgerError>;
    }
    impl CartManagement for Store {
        async fn fetch_cart(&self, user_id: &str) -> Result<Vec<CartItem>, LedgerError>;
        async fn add_to_cart(&self, user_id: &str, product_id: &str, quantity: i64) -> Result<CartItem, LedgerError>;
        async fn clear_cart(&self, user_id: &str) -> Result<u64, LedgerError>;
    }
    impl CouponManagement for Store {
        async fn fetch_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, LedgerError>;
        async fn fetch_active_coupon_for_user(&self, user_id: &str) -> Result<Option<Coupon>, LedgerError>;
        async fn replace_coupon_for_user(&self, coupon: NewCoupon) -> Result<Coupon, LedgerError>;
    }
    impl SettingsManagement for Store {
        async fn fetch_or_create_settings(&self) -> Result<StoreSettings, LedgerError>;
        async fn update_settings(&self, update: SettingsUpdate) -> Result<StoreSettings, LedgerError>;
    }
}
