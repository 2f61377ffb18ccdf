#![allow(dead_code)]
use chrono::{Duration, NaiveDate, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use storefront_engine::{
    checkout_objects::{CheckoutItem, CheckoutRequest},
    db_types::{Kes, LineItem, NewOrder, Order, OrderId, Product},
    events::EventProducers,
    payment_objects::SmsRelayMessage,
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path},
        stub_gateway::StubGateway,
    },
    traits::{CatalogManagement, OrderLedger},
    CheckoutApi,
    ReconciliationApi,
    ReconciliationOptions,
    SqliteDatabase,
};

pub const BUYER_PHONE: &str = "0712345678";

pub struct TestStore {
    pub db: SqliteDatabase,
    pub gateway: StubGateway,
}

impl TestStore {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        for (id, name, price) in
            [("cake", "Chocolate cake", 500), ("bread", "Sourdough loaf", 150), ("cookie", "Oat cookie", 50)]
        {
            db.upsert_product(Product::new(id, name, Kes::from_shillings(price))).await.expect("Error adding product");
        }
        db.upsert_product(Product::new("muffin", "Blueberry muffin", Kes::from_cents(12_550)))
            .await
            .expect("Error adding product");
        Self { db, gateway: StubGateway::default() }
    }

    pub fn checkout_api(&self) -> CheckoutApi<SqliteDatabase, StubGateway> {
        self.checkout_api_with_producers(EventProducers::default())
    }

    pub fn checkout_api_with_producers(&self, producers: EventProducers) -> CheckoutApi<SqliteDatabase, StubGateway> {
        CheckoutApi::new(self.db.clone(), self.gateway.clone(), producers)
    }

    pub fn reconciliation_api(&self) -> ReconciliationApi<SqliteDatabase, StubGateway> {
        self.reconciliation_api_with_producers(EventProducers::default())
    }

    pub fn reconciliation_api_with_producers(
        &self,
        producers: EventProducers,
    ) -> ReconciliationApi<SqliteDatabase, StubGateway> {
        let options = ReconciliationOptions { lookup_delay: std::time::Duration::from_millis(10), ..Default::default() };
        ReconciliationApi::new(self.db.clone(), self.gateway.clone(), producers).with_options(options)
    }

    /// Stores a pending order directly, bypassing checkout
    pub async fn pending_order(&self, reference: &str, user_id: &str, shillings: i64) -> Order {
        let amount = Kes::from_shillings(shillings);
        let items = vec![LineItem::new("cake", 1, amount)];
        let order = NewOrder::new(OrderId::new(reference), user_id, items, amount)
            .with_transaction_reference(format!("TXN-{reference}"));
        let (order, inserted) = self.db.upsert_pending_order(order).await.expect("Error storing order");
        assert!(inserted);
        order
    }

    pub async fn order(&self, order_id: &OrderId) -> Order {
        self.db.fetch_order_by_order_id(order_id).await.expect("Error fetching order").expect("Order not found")
    }

    pub async fn tear_down(self) {
        let url = self.db.url().to_string();
        self.db.close().await;
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Could not remove test database {url}: {e}");
        }
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn checkout_request(items: Vec<CheckoutItem>) -> CheckoutRequest {
    CheckoutRequest {
        products: items,
        phone_number: Some(BUYER_PHONE.into()),
        pickup_location: Some("Westlands".into()),
        pickup_date: Some((today() + Duration::days(1)).format("%Y-%m-%d").to_string()),
        pickup_time: Some("10:00".into()),
        ..Default::default()
    }
}

pub fn payment_sms(txid: &str, amount: &str) -> SmsRelayMessage {
    let content = format!(
        "{txid} Confirmed. You have received Ksh{amount} from AIRTEL MONEY - Jane Doe 712345678 on 5/1/24 at 2:30 PM. \
         New M-PESA balance is Ksh3,000.00."
    );
    SmsRelayMessage::new("MPESA".to_string(), content)
}
