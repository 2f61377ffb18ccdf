use cucumber::given;

use crate::cucumber::{world::StorefrontSystem, StorefrontWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut StorefrontWorld) {
    let system = StorefrontSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a product {word} priced at {int} KES")]
async fn add_product(world: &mut StorefrontWorld, id: String, price: i64) {
    world.system().add_product(&id, price).await;
}
