//! Helpers for tests that need a real database and a controllable payment gateway.
pub mod prepare_env;
pub mod stub_gateway;
