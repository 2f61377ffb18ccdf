use chrono::Utc;
use log::{debug, trace, warn};
use sqlx::{types::Json, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{Kes, NewOrder, Order, OrderId, OrderStatusType},
    sfe_api::order_objects::OrderQueryFilter,
    traits::{CorrelationKeys, LedgerError, Settlement},
};

/// Inserts the order, keyed by its external reference. If the reference is already known and the order is still
/// pending, the gateway-issued references are refreshed instead and `false` is returned in the second parameter.
///
/// An existing order is only refreshed for the same user and the same total, so that the stored amount always matches
/// what the gateway was asked to collect.
pub async fn idempotent_upsert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), LedgerError> {
    match fetch_order_by_external_reference(&order.external_reference, conn).await? {
        Some(existing) if existing.user_id != order.user_id => {
            warn!("📝️ Order [{}] was resubmitted by {}, who does not own it", existing.order_id, order.user_id);
            let reference = order.external_reference;
            Err(LedgerError::ReferenceConflict(format!("Order reference {reference} is not available")))
        },
        Some(existing) if existing.status != OrderStatusType::Pending => {
            warn!(
                "📝️ Order [{}] was resubmitted, but it is already {}. Leaving it untouched",
                existing.order_id, existing.status
            );
            Err(LedgerError::OrderAlreadyFinalized(existing.order_id, existing.status))
        },
        Some(existing) if existing.total_amount != order.total_amount => {
            warn!(
                "📝️ Order [{}] was resubmitted for {}, but it was stored for {}",
                existing.order_id, order.total_amount, existing.total_amount
            );
            Err(LedgerError::ReferenceConflict(format!(
                "Order {} was started for {}, not {}",
                existing.order_id, existing.total_amount, order.total_amount
            )))
        },
        Some(existing) => {
            let updated = refresh_gateway_references(existing.id, &order, conn).await?;
            debug!("📝️ Order [{}] already exists. Gateway references refreshed", updated.order_id);
            Ok((updated, false))
        },
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
            Ok((order, true))
        },
    }
}

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let (pickup_location, pickup_date, pickup_time) = match order.pickup {
        Some(p) => (Some(p.location), Some(p.date), Some(p.time)),
        None => (None, None, None),
    };
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                user_id,
                items,
                total_amount,
                status,
                payment_method,
                pickup_location,
                pickup_date,
                pickup_time,
                external_reference,
                transaction_reference,
                merchant_request_id,
                coupon_code,
                customer_phone,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, 'Pending', $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(Json(order.items))
    .bind(order.total_amount)
    .bind(order.payment_method)
    .bind(pickup_location)
    .bind(pickup_date)
    .bind(pickup_time)
    .bind(order.external_reference)
    .bind(order.transaction_reference)
    .bind(order.merchant_request_id)
    .bind(order.coupon_code)
    .bind(order.customer_phone)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

async fn refresh_gateway_references(
    id: i64,
    order: &NewOrder,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET
            transaction_reference = COALESCE($1, transaction_reference),
            merchant_request_id = COALESCE($2, merchant_request_id),
            updated_at = $3
        WHERE id = $4 AND status = 'Pending' AND user_id = $5 AND total_amount = $6
        RETURNING *"#,
    )
    .bind(order.transaction_reference.as_deref())
    .bind(order.merchant_request_id.as_deref())
    .bind(Utc::now())
    .bind(id)
    .bind(order.user_id.as_str())
    .bind(order.total_amount)
    .fetch_optional(conn)
    .await?;
    result.ok_or(LedgerError::OrderIdNotFound(id))
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_order_by_external_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE external_reference = $1").bind(reference).fetch_optional(conn).await
}

pub async fn fetch_order_by_transaction_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE transaction_reference = $1").bind(reference).fetch_optional(conn).await
}

pub async fn fetch_order_by_mpesa_transaction_id(
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE mpesa_transaction_id = $1")
        .bind(transaction_id)
        .fetch_optional(conn)
        .await
}

/// Merchant request ids are not guaranteed unique, so the most recent order wins.
pub async fn fetch_order_by_merchant_request_id(
    merchant_request_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE merchant_request_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1")
        .bind(merchant_request_id)
        .fetch_optional(conn)
        .await
}

/// Tries each correlation key in turn, returning the first match.
pub async fn fetch_order_by_correlation(
    keys: &CorrelationKeys,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    if let Some(reference) = non_empty(keys.external_reference.as_deref()) {
        if let Some(order) = fetch_order_by_external_reference(reference, conn).await? {
            trace!("📝️ Order [{}] matched on external reference", order.order_id);
            return Ok(Some(order));
        }
    }
    if let Some(reference) = non_empty(keys.transaction_reference.as_deref()) {
        if let Some(order) = fetch_order_by_transaction_reference(reference, conn).await? {
            trace!("📝️ Order [{}] matched on transaction reference", order.order_id);
            return Ok(Some(order));
        }
    }
    if let Some(id) = non_empty(keys.merchant_request_id.as_deref()) {
        if let Some(order) = fetch_order_by_merchant_request_id(id, conn).await? {
            trace!("📝️ Order [{}] matched on merchant request id", order.order_id);
            return Ok(Some(order));
        }
    }
    if let Some(order_id) = keys.order_id.as_ref().filter(|o| !o.as_str().is_empty()) {
        if let Some(order) = fetch_order_by_order_id(order_id, conn).await? {
            trace!("📝️ Order [{}] matched on order id", order.order_id);
            return Ok(Some(order));
        }
    }
    Ok(None)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Pending orders for exactly the given amount, most recent first.
pub async fn fetch_pending_orders_by_amount(amount: Kes, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE status = 'Pending' AND total_amount = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(amount)
    .fetch_all(conn)
    .await
}

pub async fn count_pending_orders(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'Pending'").fetch_one(conn).await?;
    Ok(count)
}

/// Writes the terminal transition in a single statement, conditioned on the order still being pending.
/// Returns `None` if the order was not pending (or does not exist), in which case nothing was written.
pub async fn settle_pending_order(
    id: i64,
    settlement: Settlement,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let now = Utc::now();
    match settlement {
        Settlement::Paid { transaction_id, channel, payment_meta, customer_phone, customer_name, paid_at } => {
            sqlx::query_as(
                r#"
                UPDATE orders SET
                    status = 'Paid',
                    mpesa_transaction_id = $1,
                    payment_channel = $2,
                    payment_meta = $3,
                    customer_phone = COALESCE($4, customer_phone),
                    customer_name = COALESCE($5, customer_name),
                    paid_at = $6,
                    updated_at = $7
                WHERE id = $8 AND status = 'Pending'
                RETURNING *"#,
            )
            .bind(transaction_id)
            .bind(channel)
            .bind(Json(payment_meta))
            .bind(customer_phone)
            .bind(customer_name)
            .bind(paid_at)
            .bind(now)
            .bind(id)
            .fetch_optional(conn)
            .await
        },
        Settlement::Failed { channel, payment_meta } => {
            sqlx::query_as(
                r#"
                UPDATE orders SET
                    status = 'Failed',
                    payment_channel = $1,
                    payment_meta = $2,
                    updated_at = $3
                WHERE id = $4 AND status = 'Pending'
                RETURNING *"#,
            )
            .bind(channel)
            .bind(Json(payment_meta))
            .bind(now)
            .bind(id)
            .fetch_optional(conn)
            .await
        },
    }
}

/// Compare-and-set of the order status. Returns `None` if the order was not in the `from` state.
pub async fn update_order_status(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("UPDATE orders SET status = $1, updated_at = $2 WHERE order_id = $3 AND status = $4 RETURNING *")
        .bind(to.to_string())
        .bind(Utc::now())
        .bind(order_id.as_str())
        .bind(from.to_string())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_orders_for_user(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(phone) = query.customer_phone {
        where_clause.push("customer_phone LIKE ");
        where_clause.push_bind_unseparated(format!("%{phone}%"));
    }
    if let Some(txid) = query.mpesa_transaction_id {
        where_clause.push("mpesa_transaction_id = ");
        where_clause.push_bind_unseparated(txid);
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        where_clause.push("status IN (");
        let mut first = true;
        for status in statuses {
            if !first {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status.to_string());
            first = false;
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {}", orders.len());
    Ok(orders)
}
