use std::time::Duration;

use chrono::Utc;
use cucumber::{then, when};
use serde_json::json;
use storefront_engine::{
    checkout_objects::{CheckoutItem, CheckoutRequest},
    db_types::{Kes, Order, OrderStatusType},
    payment_objects::{GatewayCallback, PollStatus, SmsOutcome, SmsRelayMessage},
    test_utils::stub_gateway::StubStatusBehaviour,
    traits::{CartManagement, OrderLedger},
};

use crate::cucumber::StorefrontWorld;

fn checkout_request(product: &str, quantity: i64) -> CheckoutRequest {
    let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);
    CheckoutRequest {
        products: vec![CheckoutItem::new(product, quantity)],
        phone_number: Some("0712345678".into()),
        pickup_location: Some("CBD".into()),
        pickup_date: Some(tomorrow.format("%Y-%m-%d").to_string()),
        pickup_time: Some("12:00".into()),
        ..Default::default()
    }
}

async fn fetch_order(world: &StorefrontWorld, alias: &str) -> Order {
    let sys = world.system();
    let order_id = sys.order_id(alias);
    sys.db.fetch_order_by_order_id(&order_id).await.expect("Error fetching order").expect("Order does not exist")
}

#[when(expr = "'{word}' adds {int} of {word} to their cart")]
async fn add_to_cart(world: &mut StorefrontWorld, user: String, quantity: i64, product: String) {
    world.system().db.add_to_cart(&user, &product, quantity).await.expect("Error adding to cart");
}

#[when(expr = "'{word}' checks out {int} of {word} as order {word}")]
async fn check_out(world: &mut StorefrontWorld, user: String, quantity: i64, product: String, alias: String) {
    let request = checkout_request(&product, quantity);
    let today = Utc::now().date_naive();
    let response = world.system().checkout.initiate(&user, request, today).await.expect("Checkout failed");
    world.system_mut().checkouts.insert(alias, response);
}

#[when(expr = "an SMS from {word} reports payment {word} of {word} KES by {string}")]
async fn sms_payment(world: &mut StorefrontWorld, sender: String, txid: String, amount: String, name: String) {
    let content = format!(
        "{txid} Confirmed. You have received Ksh{amount} from {name} 0722000111 on 5/1/24 at 2:30 PM. New M-PESA \
         balance is Ksh10,000.00."
    );
    let message = SmsRelayMessage::new(sender, content);
    let outcome = world.system().reconciliation.process_sms(message).await.expect("Error processing SMS");
    world.system_mut().last_sms = Some(outcome);
}

#[when(expr = "the gateway calls back with {word} for order {word} and receipt {word}")]
async fn gateway_callback(world: &mut StorefrontWorld, result: String, alias: String, receipt: String) {
    let success = result == "success";
    let reference = world.system().checkouts.get(&alias).expect("Unknown order").transaction_reference.clone();
    let callback: GatewayCallback = serde_json::from_value(json!({
        "status": success,
        "response": {
            "TransactionReference": reference,
            "ExternalReference": world.system().order_id(&alias).as_str(),
            "MpesaReceiptNumber": receipt,
            "Status": if success { "Success" } else { "Failed" }
        }
    }))
    .expect("Invalid callback");
    world.system().reconciliation.process_callback(callback).await.expect("Error processing callback");
}

#[when(expr = "the gateway reports order {word} as paid with receipt {word}")]
async fn gateway_reports_paid(world: &mut StorefrontWorld, _alias: String, receipt: String) {
    world.system().gateway.set_status_behaviour(StubStatusBehaviour::Paid { receipt });
}

#[when(expr = "the client polls for order {word}")]
async fn poll(world: &mut StorefrontWorld, alias: String) {
    let reference = world.system().checkouts.get(&alias).expect("Unknown order").transaction_reference.clone();
    let result = world.system().reconciliation.poll_payment(&reference).await.expect("Error polling");
    world.system_mut().last_poll = Some(result);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut StorefrontWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[then(expr = "order {word} is {word}")]
async fn check_status(world: &mut StorefrontWorld, alias: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Invalid status");
    let order = fetch_order(world, &alias).await;
    assert_eq!(order.status, expected, "Order {alias} has the wrong status");
}

#[then(expr = "order {word} costs {int} KES")]
async fn check_total(world: &mut StorefrontWorld, alias: String, amount: i64) {
    let order = fetch_order(world, &alias).await;
    assert_eq!(order.total_amount, Kes::from_shillings(amount));
}

#[then(expr = "order {word} has transaction id {word}")]
async fn check_transaction_id(world: &mut StorefrontWorld, alias: String, txid: String) {
    let order = fetch_order(world, &alias).await;
    assert_eq!(order.mpesa_transaction_id.as_deref(), Some(txid.as_str()));
    assert!(order.paid_at.is_some(), "Paid order has no payment time");
}

#[then(expr = "order {word} was paid by {string}")]
async fn check_customer(world: &mut StorefrontWorld, alias: String, name: String) {
    let order = fetch_order(world, &alias).await;
    assert_eq!(order.customer_name.as_deref(), Some(name.as_str()));
}

#[then(expr = "the cart for '{word}' is empty")]
async fn cart_is_empty(world: &mut StorefrontWorld, user: String) {
    let cart = world.system().db.fetch_cart(&user).await.expect("Error fetching cart");
    assert!(cart.is_empty(), "Cart still holds {} items", cart.len());
}

#[then(expr = "the cart for '{word}' holds {int} items")]
async fn cart_holds(world: &mut StorefrontWorld, user: String, count: usize) {
    let cart = world.system().db.fetch_cart(&user).await.expect("Error fetching cart");
    assert_eq!(cart.len(), count);
}

#[then(expr = "the SMS was {word}")]
async fn check_sms_outcome(world: &mut StorefrontWorld, expected: String) {
    let outcome = world.system().last_sms.as_ref().expect("No SMS was processed");
    let matched = match expected.as_str() {
        "applied" => matches!(outcome, SmsOutcome::Applied(_)),
        "unmatched" => matches!(outcome, SmsOutcome::Unmatched { .. }),
        "ignored" => matches!(outcome, SmsOutcome::Ignored(_)),
        "redundant" => matches!(outcome, SmsOutcome::AlreadyFinal(_)),
        other => panic!("Unknown SMS outcome {other}"),
    };
    assert!(matched, "Expected the SMS to be {expected}, but it was: {outcome}");
}

#[then(expr = "the poll reports {word}")]
async fn check_poll(world: &mut StorefrontWorld, status: String) {
    let poll = world.system().last_poll.as_ref().expect("No poll was made");
    let expected = match status.as_str() {
        "PAID" => PollStatus::Paid,
        "FAILED" => PollStatus::Failed,
        "CANCELLED" => PollStatus::Cancelled,
        _ => PollStatus::Pending,
    };
    assert_eq!(poll.status, expected);
}

#[then(expr = "the gateway was queried {int} times")]
async fn check_gateway_queries(world: &mut StorefrontWorld, count: usize) {
    assert_eq!(world.system().gateway.status_queries().len(), count);
}

#[then(expr = "there are {int} pending orders")]
async fn check_pending(world: &mut StorefrontWorld, count: i64) {
    let pending = world.system().db.count_pending_orders().await.expect("Error counting orders");
    assert_eq!(pending, count);
}
