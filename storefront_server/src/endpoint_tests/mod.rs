mod helpers;
mod mocks;

mod checkout;
mod coupons;
mod gateway;
mod orders;
mod settings;
