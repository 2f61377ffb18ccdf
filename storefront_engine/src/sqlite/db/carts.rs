use sqlx::SqliteConnection;

use crate::db_types::CartItem;

pub async fn fetch_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<Vec<CartItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY product_id")
        .bind(user_id)
        .fetch_all(conn)
        .await
}

pub async fn add_to_cart(
    user_id: &str,
    product_id: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartItem, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = quantity + excluded.quantity
        RETURNING *"#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_one(conn)
    .await
}

/// Empties the user's cart, returning the number of lines removed.
pub async fn clear_cart(user_id: &str, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(conn).await?;
    Ok(result.rows_affected())
}
