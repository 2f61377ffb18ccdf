//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (e.g. I/O, database operations,
//! gateway calls) must be expressed as futures or asynchronous functions.
//!
//! The gateway callback is the one place where work continues after the response is sent. The gateway only needs to
//! know that the callback arrived, so it is acknowledged straight away and reconciled on a spawned task.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use storefront_engine::{
    checkout_objects::CheckoutRequest,
    db_types::{OrderId, SettingsUpdate},
    order_objects::{OrderQueryFilter, StatusUpdateRequest},
    payment_objects::{CallbackOutcome, GatewayCallback, SmsOutcome, SmsRelayMessage, WebhookPayload},
    traits::{CouponManagement, OrderLedger, PaymentGateway, SettingsManagement, StoreBackend},
    CheckoutApi,
    CouponApi,
    OrderQueryApi,
    ReconciliationApi,
    ReconciliationError,
    SettingsApi,
};

use crate::{
    auth::{AuthenticatedUser, Role},
    config::StoreCalendar,
    data_objects::{CouponValidationRequest, JsonResponse, OrderSearchParams, PollRequest},
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:ty),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl StoreBackend, PaymentGateway);
/// Route handler for the checkout endpoint
///
/// Validates the cart, prices it from the catalog, asks the gateway to prompt the customer's phone and records the
/// order as pending. The response carries the gateway's transaction reference, which the client uses to poll
/// `/api/checkout/status` until the payment completes.
///
/// A refusal from the gateway is returned as a 400 with the gateway's own response under `details`.
pub async fn checkout<B: StoreBackend, G: PaymentGateway>(
    user: AuthenticatedUser,
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<B, G>>,
    calendar: web::Data<StoreCalendar>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST checkout for {}", user.user_id);
    let response = api.initiate(&user.user_id, body.into_inner(), calendar.today()).await.map_err(|e| {
        debug!("💻️ Checkout for {} failed. {e}", user.user_id);
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(response))
}

route!(checkout_status => Post "/checkout/status" impl OrderLedger, PaymentGateway);
/// Route handler for payment status polls
///
/// Clients poll with the transaction reference they were given at checkout. Pending orders are checked with the
/// gateway, so a poll can itself settle an order whose callback never arrived.
pub async fn checkout_status<B: OrderLedger, G: PaymentGateway>(
    user: AuthenticatedUser,
    body: web::Json<PollRequest>,
    api: web::Data<ReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let reference = body.into_inner().transaction_reference;
    trace!("💻️ {} is polling for payment {reference}", user.user_id);
    let result = api.poll_payment(&reference).await?;
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(order_status => Get "/orders/status/{order_id}" impl OrderLedger);
/// The payment state of one of the caller's orders. Orders belonging to someone else are reported as not found.
pub async fn order_status<B: OrderLedger>(
    user: AuthenticatedUser,
    path: web::Path<OrderId>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order status for {order_id}");
    let report = api.order_status(&order_id, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(report))
}

route!(my_orders => Get "/orders" impl OrderLedger);
pub async fn my_orders<B: OrderLedger>(
    user: AuthenticatedUser,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_orders for {}", user.user_id);
    let orders = api.orders_for_user(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(search_orders => Get "/orders/search" impl OrderLedger where requires [Role::Admin]);
/// Admin order search. Filters are passed in the query string, e.g.
/// `/api/orders/search?status=paid,delivered&since=2024-05-01T00:00:00Z`
pub async fn search_orders<B: OrderLedger>(
    query: web::Query<OrderSearchParams>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = OrderQueryFilter::try_from(query.into_inner())?;
    debug!("💻️ GET search orders. {filter}");
    let orders = api.search(filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(update_order_status => Put "/orders/{order_id}/status" impl OrderLedger where requires [Role::Admin]);
/// Admins may cancel a pending order, or mark a paid order as delivered. No other change is allowed.
pub async fn update_order_status<B: OrderLedger>(
    path: web::Path<OrderId>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let to = body.into_inner().status;
    info!("💻️ PUT status of order {order_id} to {to}");
    let order = api.update_order_status(&order_id, to).await?;
    Ok(HttpResponse::Ok().json(order))
}

//----------------------------------------------   Settings  ----------------------------------------------------
route!(store_settings => Get "/settings" impl SettingsManagement);
pub async fn store_settings<B: SettingsManagement>(
    api: web::Data<SettingsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ GET store settings");
    let settings = api.fetch_settings().await?;
    Ok(HttpResponse::Ok().json(settings))
}

route!(update_settings => Put "/settings" impl SettingsManagement where requires [Role::Admin]);
pub async fn update_settings<B: SettingsManagement>(
    body: web::Json<SettingsUpdate>,
    api: web::Data<SettingsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    info!("💻️ PUT store settings");
    let settings = api.update_settings(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}

//----------------------------------------------   Coupons  ----------------------------------------------------
route!(validate_coupon => Post "/coupons/validate" impl CouponManagement);
pub async fn validate_coupon<B: CouponManagement>(
    user: AuthenticatedUser,
    body: web::Json<CouponValidationRequest>,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let code = body.into_inner().code;
    debug!("💻️ {} is validating coupon {code}", user.user_id);
    let summary = api.validate_coupon(&code, &user.user_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(my_coupon => Get "/coupons" impl CouponManagement);
/// The caller's active coupon, or `{"coupon": null}`
pub async fn my_coupon<B: CouponManagement>(
    user: AuthenticatedUser,
    api: web::Data<CouponApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let coupon = api.my_coupon(&user.user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "coupon": coupon })))
}

//----------------------------------------------   Gateway  ----------------------------------------------------
route!(gateway_callback => Post "" impl OrderLedger, PaymentGateway);
/// Route handler for the payment gateway's result notification.
///
/// The gateway always gets `200 ok`, whatever the payload. A callback can arrive before the checkout that triggered it
/// has stored its order, so the engine may take several seconds to find the order. That search runs after the
/// response has been sent.
pub async fn gateway_callback<B, G>(body: web::Bytes, api: web::Data<ReconciliationApi<B, G>>) -> HttpResponse
where
    B: OrderLedger + 'static,
    G: PaymentGateway + 'static,
{
    match serde_json::from_slice::<GatewayCallback>(&body) {
        Ok(callback) => {
            info!("💻️📞️ Received payment callback. Success: {}", callback.is_success());
            actix_web::rt::spawn(reconcile_callback(api, callback));
        },
        Err(e) => {
            warn!("💻️📞️ Ignoring unrecognised callback payload. {e}. {}", String::from_utf8_lossy(&body));
        },
    }
    callback_acknowledgement()
}

/// The gateway only needs to know that its callback arrived
fn callback_acknowledgement() -> HttpResponse {
    HttpResponse::Ok().content_type("text/plain").body("ok")
}

async fn reconcile_callback<B, G>(api: web::Data<ReconciliationApi<B, G>>, callback: GatewayCallback)
where
    B: OrderLedger,
    G: PaymentGateway,
{
    match api.process_callback(callback).await {
        Ok(CallbackOutcome::Applied(order)) => {
            info!("💻️📞️ Callback settled order {} as {}", order.order_id, order.status)
        },
        Ok(CallbackOutcome::AlreadyFinal(order)) => {
            debug!("💻️📞️ Callback for order {} arrived after it was settled", order.order_id)
        },
        Ok(CallbackOutcome::Unresolved(keys)) => warn!("💻️📞️ Callback could not be matched to an order. {keys:?}"),
        Err(e) => error!("💻️📞️ Callback could not be processed. {e}"),
    }
}

route!(sms_relay => Post "/sms" impl OrderLedger, PaymentGateway);
/// Route handler for payment notifications forwarded by the SMS relay.
///
/// Messages that cannot be parsed get a 400. Anything else, including notifications that match no order and storage
/// failures, gets a 200 so that the relay does not keep retrying. The JSON body says what happened. Only a storage
/// failure reports `success: false`.
pub async fn sms_relay<B: OrderLedger, G: PaymentGateway>(
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError> {
    let message = serde_json::from_slice::<SmsRelayMessage>(&body).map_err(|e| {
        debug!("💻️📨️ Could not read SMS relay payload. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let result = api.process_sms(message).await;
    sms_response(result)
}

route!(unified_webhook => Post "/webhook" impl OrderLedger, PaymentGateway);
/// A single endpoint for both SMS relay messages and gateway callbacks. The shape of the body decides which it is.
pub async fn unified_webhook<B, G>(
    body: web::Bytes,
    api: web::Data<ReconciliationApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: OrderLedger + 'static,
    G: PaymentGateway + 'static,
{
    let payload = WebhookPayload::decode(&body).map_err(|e| {
        debug!("💻️ Rejecting webhook payload. {e}");
        ServerError::from(e)
    })?;
    match payload {
        WebhookPayload::Sms(message) => {
            let result = api.process_sms(message).await;
            sms_response(result)
        },
        WebhookPayload::Callback(callback) => {
            info!("💻️📞️ Received payment callback through the webhook");
            actix_web::rt::spawn(reconcile_callback(api, callback));
            Ok(callback_acknowledgement())
        },
    }
}

fn sms_response(result: Result<SmsOutcome, ReconciliationError>) -> Result<HttpResponse, ServerError> {
    let response = match result {
        Ok(outcome @ (SmsOutcome::Applied(_) | SmsOutcome::AlreadyFinal(_))) => {
            info!("💻️📨️ {outcome}");
            JsonResponse::success(outcome)
        },
        // The relay is told these were delivered, so that it does not send them again
        Ok(outcome @ SmsOutcome::Unmatched { .. }) => {
            warn!("💻️📨️ {outcome}");
            JsonResponse::success(outcome)
        },
        Ok(outcome @ SmsOutcome::Ignored(_)) => {
            debug!("💻️📨️ {outcome}");
            JsonResponse::success(outcome)
        },
        Err(e @ ReconciliationError::MalformedSms(_)) | Err(e @ ReconciliationError::MalformedPayload(_)) => {
            return Err(ServerError::from(e));
        },
        Err(ReconciliationError::DatabaseError(e)) => {
            error!("💻️📨️ Could not record SMS payment. {e}");
            JsonResponse::failure("The notification could not be processed")
        },
    };
    Ok(HttpResponse::Ok().json(response))
}
