//! Access control list middleware for the storefront server.
//! This middleware can be placed on any route or service.
//!
//! It reads the caller's identity from the proxy headers (see [`crate::auth`]) and checks the caller's roles against
//! the roles required by the route. Anonymous requests get a 401 Unauthorized response, and identified callers without
//! the required roles get a 403 Forbidden response.
use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ok, Ready};
use log::*;

use crate::{
    auth::{AuthenticatedUser, Role},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    required_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(required_roles: &[Role]) -> Self {
        AclMiddlewareFactory { required_roles: required_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { required_roles: self.required_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    required_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let required_roles = self.required_roles.clone();
        Box::pin(async move {
            let Some(user) = AuthenticatedUser::from_headers(req.headers()) else {
                debug!("🔐️ Anonymous request to {} denied", req.path());
                return Err(ServerError::AuthenticationError(AuthError::MissingIdentity).into());
            };
            if user.has_roles(&required_roles) {
                service.call(req).await
            } else {
                let roles = required_roles.iter().map(Role::to_string).collect::<Vec<_>>().join(", ");
                warn!("🔐️ {} tried to access {} without the required roles ({roles})", user.user_id, req.path());
                Err(ServerError::AuthenticationError(AuthError::InsufficientPermissions(format!("Requires {roles}")))
                    .into())
            }
        })
    }
}
