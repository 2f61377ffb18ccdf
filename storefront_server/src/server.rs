use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::future::{ok, FutureExt};
use lipia_tools::LipiaApi;
use log::*;
use storefront_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CheckoutApi,
    CouponApi,
    OrderQueryApi,
    ReconciliationApi,
    SettingsApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::{get_remote_ip, is_whitelisted},
    integrations::lipia::LipiaGateway,
    middleware::{RelaySignatureMiddlewareFactory, ReplayGuard},
    routes::{
        health,
        CheckoutRoute,
        CheckoutStatusRoute,
        GatewayCallbackRoute,
        MyCouponRoute,
        MyOrdersRoute,
        OrderStatusRoute,
        SearchOrdersRoute,
        SmsRelayRoute,
        StoreSettingsRoute,
        UnifiedWebhookRoute,
        UpdateOrderStatusRoute,
        UpdateSettingsRoute,
        ValidateCouponRoute,
    },
};

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let api = LipiaApi::new(config.lipia.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let gateway = LipiaGateway::new(api);
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, gateway, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Every order lifecycle event is written to the log under the `sps::orders` target.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_order_created(|ev| {
            async move {
                let order = ev.order;
                info!(
                    target: "sps::orders",
                    "🛒️ Order {} created for {} ({})", order.order_id, order.user_id, order.total_amount
                );
            }
            .boxed()
        })
        .on_order_paid(|ev| {
            async move {
                info!(target: "sps::orders", "💰️ Order {} paid via {}", ev.order.order_id, ev.channel);
            }
            .boxed()
        })
        .on_order_failed(|ev| {
            async move {
                info!(target: "sps::orders", "❌️ Order {} failed via {}", ev.order.order_id, ev.channel);
            }
            .boxed()
        });
    hooks
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    gateway: LipiaGateway,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let calendar = config.store_calendar();
    let replay_guard = ReplayGuard::default();
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), gateway.clone(), producers.clone())
            .with_loyalty_policy(config.loyalty);
        let reconciliation_api = ReconciliationApi::new(db.clone(), gateway.clone(), producers.clone())
            .with_options(config.reconciliation.clone());
        let orders_api = OrderQueryApi::new(db.clone());
        let settings_api = SettingsApi::new(db.clone());
        let coupon_api = CouponApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sps::access_log"))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(reconciliation_api))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(settings_api))
            .app_data(web::Data::new(coupon_api))
            .app_data(web::Data::new(calendar));
        // Identity is checked per route: user routes need an X-User-Id, admin routes are wrapped in the ACL middleware
        let api_scope = web::scope("/api")
            .service(CheckoutRoute::<SqliteDatabase, LipiaGateway>::new())
            .service(CheckoutStatusRoute::<SqliteDatabase, LipiaGateway>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(OrderStatusRoute::<SqliteDatabase>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase>::new())
            .service(MyOrdersRoute::<SqliteDatabase>::new())
            .service(StoreSettingsRoute::<SqliteDatabase>::new())
            .service(UpdateSettingsRoute::<SqliteDatabase>::new())
            .service(ValidateCouponRoute::<SqliteDatabase>::new())
            .service(MyCouponRoute::<SqliteDatabase>::new());
        // The callback has its own scope because it is guarded by the IP whitelist rather than by the relay signature.
        // It must be registered before the `/gateway` scope, which would otherwise claim the path.
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let whitelist = config.gateway_whitelist.clone();
        let callback_scope = web::scope("/gateway/callback")
            .wrap_fn(move |req, srv| {
                let peer_ip: Option<IpAddr> = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                if is_whitelisted(peer_ip, whitelist.as_deref()) {
                    srv.call(req)
                } else {
                    ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
                }
            })
            .service(GatewayCallbackRoute::<SqliteDatabase, LipiaGateway>::new());
        let relay_auth = RelaySignatureMiddlewareFactory::new(&config.sms_relay, replay_guard.clone());
        let relay_scope = web::scope("/gateway")
            .wrap(relay_auth)
            .service(SmsRelayRoute::<SqliteDatabase, LipiaGateway>::new())
            .service(UnifiedWebhookRoute::<SqliteDatabase, LipiaGateway>::new());
        app.service(health).service(api_scope).service(callback_scope).service(relay_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
