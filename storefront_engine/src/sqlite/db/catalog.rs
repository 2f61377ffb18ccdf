use sqlx::{QueryBuilder, SqliteConnection};

use crate::db_types::Product;

pub async fn fetch_products(ids: &[String], conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT * FROM products WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(id);
    }
    list.push_unseparated(")");
    builder.build_query_as::<Product>().fetch_all(conn).await
}

pub async fn upsert_product(product: Product, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO products (id, name, price) VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET name = excluded.name, price = excluded.price
        RETURNING *"#,
    )
    .bind(product.id)
    .bind(product.name)
    .bind(product.price)
    .fetch_one(conn)
    .await
}
