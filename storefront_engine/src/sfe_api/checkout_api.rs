use std::{collections::HashMap, fmt::Debug};

use chrono::{NaiveDate, Utc};
use log::*;
use serde_json::json;

use crate::{
    db_types::{Coupon, Kes, LineItem, NewOrder, OrderId, PickupDetails},
    events::{EventProducers, OrderCreatedEvent},
    helpers::{compute_amount, normalize_phone, MAXIMUM_CHARGE},
    sfe_api::{
        checkout_objects::{CheckoutItem, CheckoutRequest, CheckoutResponse, LoyaltyPolicy, MAX_LINE_QUANTITY},
        coupon_api::issue_loyalty_coupon,
        errors::CheckoutError,
        settings_api::{parse_pickup_date, validate_pickup},
    },
    traits::{GatewayError, PaymentGateway, PushPaymentRequest, StoreBackend},
};

/// Client-claimed prices may differ from the catalog by at most one cent.
const PRICE_TOLERANCE: Kes = Kes::from_cents(1);

/// `CheckoutApi` validates a checkout, prompts the buyer's phone for payment and records the pending order.
pub struct CheckoutApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    loyalty: LoyaltyPolicy,
}

impl<B, G> Debug for CheckoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, G> CheckoutApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers, loyalty: LoyaltyPolicy::default() }
    }

    pub fn with_loyalty_policy(mut self, policy: LoyaltyPolicy) -> Self {
        self.loyalty = policy;
        self
    }
}

impl<B, G> CheckoutApi<B, G>
where
    B: StoreBackend,
    G: PaymentGateway,
{
    /// Starts a push-payment checkout for `user_id`.
    ///
    /// Every validation happens before the gateway is contacted or anything is stored. If the gateway refuses the
    /// request no order is created. If it accepts, the order is stored as `Pending` (or, when the client is retrying
    /// a checkout, the existing pending order gets the new transaction reference). A retry must come from the same
    /// user and be for the same amount as the original checkout.
    pub async fn initiate(
        &self,
        user_id: &str,
        request: CheckoutRequest,
        today: NaiveDate,
    ) -> Result<CheckoutResponse, CheckoutError> {
        validate_items(&request.products)?;
        let phone = normalize_phone(request.phone_number.as_deref().unwrap_or_default())?;
        let pickup = pickup_details(&request)?;
        let settings = self.db.fetch_or_create_settings().await?;
        validate_pickup(&settings, pickup.date, &pickup.time, today).map_err(CheckoutError::CheckoutNotAllowed)?;
        let items = self.price_items(&request.products).await?;
        let coupon = self.redeemable_coupon(user_id, request.coupon_code.as_deref()).await?;
        let amount = compute_amount(&items, coupon.as_ref());
        if amount > MAXIMUM_CHARGE {
            return Err(CheckoutError::AmountTooLarge { amount, limit: MAXIMUM_CHARGE });
        }
        let external_reference =
            self.external_reference(user_id, request.external_reference.as_deref(), amount).await?;
        debug!("🔄️🛒️ Checkout [{external_reference}] for {user_id}: {} items, {amount}", items.len());

        let push = PushPaymentRequest {
            phone: phone.clone(),
            amount,
            external_reference: external_reference.to_string(),
            metadata: json!({
                "userId": user_id,
                "couponCode": coupon.as_ref().map(|c| c.code.as_str()).unwrap_or_default(),
                "pickupLocation": pickup.location,
                "products": items,
            }),
        };
        let accepted = self.gateway.request_payment(push).await.map_err(|e| {
            match &e {
                GatewayError::Rejected { details } => {
                    warn!("🔄️🛒️ Push payment for [{external_reference}] rejected: {details}")
                },
                e => error!("🔄️🛒️ Push payment for [{external_reference}] failed: {e}"),
            }
            CheckoutError::from(e)
        })?;
        info!(
            "🔄️🛒️ Push payment for [{external_reference}] accepted. Transaction reference {}",
            accepted.transaction_reference
        );

        let mut order = NewOrder::new(external_reference, user_id, items, amount)
            .with_transaction_reference(accepted.transaction_reference.clone())
            .with_pickup(pickup);
        order.merchant_request_id = accepted.merchant_request_id;
        order.coupon_code = coupon.map(|c| c.code);
        order.customer_phone = Some(phone.to_string());
        let (order, inserted) = self.db.upsert_pending_order(order).await?;
        if inserted {
            self.producers.publish_order_created(OrderCreatedEvent::new(order.clone())).await;
        }

        if self.loyalty.qualifies(amount) {
            // A coupon failure must never fail a checkout that the gateway has already accepted
            if let Err(e) = issue_loyalty_coupon(&self.db, user_id, &self.loyalty).await {
                warn!("🔄️🛒️ Could not issue a loyalty coupon to {user_id}: {e}");
            }
        }

        Ok(CheckoutResponse {
            order_id: order.order_id,
            transaction_reference: accepted.transaction_reference,
            external_reference: order.external_reference,
            amount,
        })
    }

    /// Snapshots catalog prices onto the line items, checking any client-claimed price against them.
    async fn price_items(&self, products: &[CheckoutItem]) -> Result<Vec<LineItem>, CheckoutError> {
        let ids = products.iter().map(|p| p.product_id.clone()).collect::<Vec<_>>();
        let catalog =
            self.db.fetch_products(&ids).await?.into_iter().map(|p| (p.id.clone(), p)).collect::<HashMap<_, _>>();
        products
            .iter()
            .map(|item| {
                let product = catalog
                    .get(&item.product_id)
                    .ok_or_else(|| CheckoutError::UnknownProduct(item.product_id.clone()))?;
                if let Some(claimed) = item.price {
                    if claimed.abs_diff(product.price) > PRICE_TOLERANCE {
                        return Err(CheckoutError::AmountMismatch {
                            product_id: item.product_id.clone(),
                            claimed,
                            actual: product.price,
                        });
                    }
                }
                let line = LineItem::new(item.product_id.clone(), item.quantity, product.price);
                match line.checked_subtotal() {
                    Some(_) => Ok(line),
                    None => Err(CheckoutError::AmountTooLarge { amount: line.subtotal(), limit: MAXIMUM_CHARGE }),
                }
            })
            .collect()
    }

    /// An unknown, foreign or expired coupon is ignored rather than failing the checkout.
    async fn redeemable_coupon(&self, user_id: &str, code: Option<&str>) -> Result<Option<Coupon>, CheckoutError> {
        let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let coupon = self.db.fetch_coupon_by_code(code).await?;
        match coupon {
            Some(c) if c.user_id == user_id && c.is_redeemable(Utc::now()) => Ok(Some(c)),
            _ => {
                info!("🔄️🛒️ Coupon {code} cannot be redeemed by {user_id}. Checking out without a discount");
                Ok(None)
            },
        }
    }

    /// Reuses the client's reference when it retries a checkout of its own pending order for the same amount.
    async fn external_reference(
        &self,
        user_id: &str,
        requested: Option<&str>,
        amount: Kes,
    ) -> Result<OrderId, CheckoutError> {
        let Some(reference) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(OrderId::random());
        };
        let Some(existing) = self.db.fetch_order_by_external_reference(reference).await? else {
            return Ok(OrderId::new(reference));
        };
        if existing.user_id != user_id {
            warn!("🔄️🛒️ {user_id} tried to check out with reference [{reference}] owned by someone else");
            return Err(CheckoutError::ReferenceConflict(format!("Order reference {reference} is not available")));
        }
        if existing.status.is_terminal() {
            return Err(CheckoutError::OrderAlreadyFinalized(existing.order_id, existing.status));
        }
        if existing.total_amount != amount {
            info!(
                "🔄️🛒️ Retry of [{reference}] is for {amount}, but the order was started for {}. Refusing",
                existing.total_amount
            );
            return Err(CheckoutError::ReferenceConflict(format!(
                "Order {reference} was started for {}, but the cart now comes to {amount}. Start a new checkout",
                existing.total_amount
            )));
        }
        Ok(OrderId::new(reference))
    }
}

fn validate_items(items: &[CheckoutItem]) -> Result<(), CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    match items.iter().find(|i| !(1..=MAX_LINE_QUANTITY).contains(&i.quantity)) {
        Some(item) => {
            Err(CheckoutError::InvalidQuantity { product_id: item.product_id.clone(), quantity: item.quantity })
        },
        None => Ok(()),
    }
}

fn pickup_details(request: &CheckoutRequest) -> Result<PickupDetails, CheckoutError> {
    let field = |f: &Option<String>| f.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
    let (Some(location), Some(date), Some(time)) =
        (field(&request.pickup_location), field(&request.pickup_date), field(&request.pickup_time))
    else {
        return Err(CheckoutError::MissingPickupDetails);
    };
    let date = parse_pickup_date(&date).map_err(CheckoutError::CheckoutNotAllowed)?;
    Ok(PickupDetails { location, date, time })
}
