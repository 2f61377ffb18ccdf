mod acl;
mod relay_signature;

pub use acl::{AclMiddlewareFactory, AclMiddlewareService};
pub use relay_signature::{
    RelayRejection,
    RelaySignature,
    RelaySignatureMiddlewareFactory,
    RelaySignatureMiddlewareService,
    ReplayGuard,
    RELAY_SIGNATURE_HEADER,
};
