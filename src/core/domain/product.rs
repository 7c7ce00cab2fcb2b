use std::borrow::Cow;

use anyhow::Context;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use validator::{Validate, ValidationError};

use crate::core::CoreError;

#[derive(Debug, Validate, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, alias = "product_id")]
    pub id: Option<i64>,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[validate(custom = "non_negative_price")]
    pub price: BigDecimal,
}

impl Product {
    pub fn new(
        name: impl Into<String>, description: Option<String>, price: BigDecimal,
    ) -> Result<Self, CoreError> {
        let product = Self {
            id: None,
            name: name.into(),
            description,
            price,
        }
        .normalized();
        product.validate()?;
        Ok(product)
    }

    /// Trims the name and drops a blank description.
    pub fn normalized(self) -> Self {
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Self { name: self.name.trim().to_string(), description, ..self }
    }
}

fn non_negative_price(price: &BigDecimal) -> Result<(), ValidationError> {
    if price < &BigDecimal::zero() {
        let mut error = ValidationError::new("range");
        error.message = Some(Cow::from("price must not be negative"));
        error.add_param(Cow::from("min"), &0);
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: Option<String>,
    price: BigDecimal,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.name,
            description: row.description,
            price: row.price,
        }
    }
}

/// `%` and `_` in the fragment match literally.
fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub struct ProductRepository;

impl ProductRepository {
    #[tracing::instrument(level = "info", skip(pool))]
    pub async fn find_all(pool: &PgPool) -> Result<Vec<Product>, CoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r##"
            SELECT id, name, description, price
            FROM products
            ORDER BY id
            "##,
        )
        .fetch_all(pool)
        .await
        .context("Failed to perform a query to retrieve products.")?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[tracing::instrument(level = "info", skip(pool))]
    pub async fn find(id: i64, pool: &PgPool) -> Result<Option<Product>, CoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r##"
            SELECT id, name, description, price
            FROM products
            WHERE id = $1
            "##,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to perform a query to retrieve stored product.")?;

        Ok(row.map(Product::from))
    }

    #[tracing::instrument(level = "info", skip(pool))]
    pub async fn count(pool: &PgPool) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await
            .context("Failed to count products.")?;
        Ok(count)
    }

    #[tracing::instrument(level = "info", skip(pool))]
    pub async fn find_by_name_containing_ignore_case(name: &str, pool: &PgPool) -> Result<Vec<Product>, CoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r##"
            SELECT id, name, description, price
            FROM products
            WHERE name ILIKE $1 ESCAPE '\'
            ORDER BY id
            "##,
        )
        .bind(contains_pattern(name))
        .fetch_all(pool)
        .await
        .context(format!("Failed to search products by name containing {:?}", name))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Both bounds are inclusive.
    #[tracing::instrument(level = "info", skip(pool))]
    pub async fn find_by_price_between(
        min_price: &BigDecimal, max_price: &BigDecimal, pool: &PgPool,
    ) -> Result<Vec<Product>, CoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r##"
            SELECT id, name, description, price
            FROM products
            WHERE price BETWEEN $1 AND $2
            ORDER BY price, id
            "##,
        )
        .bind(min_price)
        .bind(max_price)
        .fetch_all(pool)
        .await
        .context(format!("Failed to search products priced between {} and {}", min_price, max_price))?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[tracing::instrument(level = "info", skip(transaction))]
    pub async fn save(transaction: &mut Transaction<'_, Postgres>, record: &Product) -> Result<Product, CoreError> {
        let now = Utc::now();

        let row = sqlx::query_as::<_, ProductRow>(
            r##"
            INSERT INTO products (id, name, description, price, created_on, last_updated_on)
            VALUES(DEFAULT, $1, $2, $3, $4, $5)
            RETURNING id, name, description, price
            "##,
        )
        .bind(&record.name)
        .bind(record.description.as_deref())
        .bind(&record.price)
        .bind(now)
        .bind(now)
        .fetch_one(&mut **transaction)
        .await?;

        Ok(row.into())
    }

    #[tracing::instrument(level = "info", skip(transaction))]
    pub async fn update(
        transaction: &mut Transaction<'_, Postgres>, id: i64, record: &Product,
    ) -> Result<Option<Product>, CoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r##"
            UPDATE products
            SET name = $2, description = $3, price = $4, last_updated_on = $5
            WHERE id = $1
            RETURNING id, name, description, price
            "##,
        )
        .bind(id)
        .bind(&record.name)
        .bind(record.description.as_deref())
        .bind(&record.price)
        .bind(Utc::now())
        .fetch_optional(&mut **transaction)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Returns whether a product was removed.
    #[tracing::instrument(level = "info", skip(transaction))]
    pub async fn delete(transaction: &mut Transaction<'_, Postgres>, id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut **transaction)
            .await?;
        Ok(0 < result.rows_affected())
    }
}
