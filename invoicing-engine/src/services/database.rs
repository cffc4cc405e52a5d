//! Database service for the invoicing engine.

use std::str::FromStr;
use std::time::Duration;

use engine_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    BillingAccount, Invoice, InvoiceItem, LedgerEntry, ListInvoicesFilter, Payment, Product,
};
use crate::services::metrics::DB_QUERY_DURATION;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to SQLite"
        );

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin the transactional unit a lifecycle operation runs in.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Invoice Reads
    // -------------------------------------------------------------------------

    /// Get an invoice by ID, scoped to the store.
    #[instrument(skip(self), fields(store_id = %store_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        store_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, store_id, customer_id, created_by, status, payment_type,
                total_cents, issued_by, settled_by, cancelled_by,
                created_utc, updated_utc, issued_utc, settled_utc, cancelled_utc
            FROM invoices
            WHERE store_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(store_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Get the line items of an invoice, scoped to the store.
    #[instrument(skip(self), fields(store_id = %store_id, invoice_id = %invoice_id))]
    pub async fn get_invoice_items(
        &self,
        store_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceItem>(
            r#"
            SELECT item_id, invoice_id, store_id, product_id, quantity, unit_price_cents, created_utc
            FROM invoice_items
            WHERE store_id = $1 AND invoice_id = $2
            ORDER BY created_utc, item_id
            "#,
        )
        .bind(store_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice items: {}", e))
        })?;

        timer.observe_duration();

        Ok(items)
    }

    /// List invoices for a store.
    #[instrument(skip(self, filter), fields(store_id = %store_id))]
    pub async fn list_invoices(
        &self,
        store_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str());

        let invoices = if let Some(cursor) = filter.page_token {
            sqlx::query_as::<_, Invoice>(
                r#"
                SELECT invoice_id, store_id, customer_id, created_by, status, payment_type,
                    total_cents, issued_by, settled_by, cancelled_by,
                    created_utc, updated_utc, issued_utc, settled_utc, cancelled_utc
                FROM invoices
                WHERE store_id = $1
                  AND ($2 IS NULL OR status = $2)
                  AND ($3 IS NULL OR customer_id = $3)
                  AND invoice_id > $4
                ORDER BY invoice_id
                LIMIT $5
                "#,
            )
            .bind(store_id)
            .bind(status_str)
            .bind(filter.customer_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Invoice>(
                r#"
                SELECT invoice_id, store_id, customer_id, created_by, status, payment_type,
                    total_cents, issued_by, settled_by, cancelled_by,
                    created_utc, updated_utc, issued_utc, settled_utc, cancelled_utc
                FROM invoices
                WHERE store_id = $1
                  AND ($2 IS NULL OR status = $2)
                  AND ($3 IS NULL OR customer_id = $3)
                ORDER BY invoice_id
                LIMIT $4
                "#,
            )
            .bind(store_id)
            .bind(status_str)
            .bind(filter.customer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    // -------------------------------------------------------------------------
    // Product Reads
    // -------------------------------------------------------------------------

    /// Get a product by ID, scoped to the store.
    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id))]
    pub async fn get_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, store_id, name, price_cents, stock, created_utc, updated_utc
            FROM products
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get product: {}", e)))?;

        timer.observe_duration();

        Ok(product)
    }

    /// List products for a store.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn list_products(
        &self,
        store_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_products"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let products = if let Some(cursor) = page_token {
            sqlx::query_as::<_, Product>(
                r#"
                SELECT product_id, store_id, name, price_cents, stock, created_utc, updated_utc
                FROM products
                WHERE store_id = $1 AND product_id > $2
                ORDER BY product_id
                LIMIT $3
                "#,
            )
            .bind(store_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Product>(
                r#"
                SELECT product_id, store_id, name, price_cents, stock, created_utc, updated_utc
                FROM products
                WHERE store_id = $1
                ORDER BY product_id
                LIMIT $2
                "#,
            )
            .bind(store_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list products: {}", e)))?;

        timer.observe_duration();

        Ok(products)
    }

    // -------------------------------------------------------------------------
    // Financial Fact Reads
    // -------------------------------------------------------------------------

    /// Get the payments recorded against an invoice.
    #[instrument(skip(self), fields(store_id = %store_id, invoice_id = %invoice_id))]
    pub async fn get_payments(
        &self,
        store_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, store_id, invoice_id, amount_cents, method, created_utc
            FROM payments
            WHERE store_id = $1 AND invoice_id = $2
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(store_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Get the ledger entries recorded for an invoice.
    #[instrument(skip(self), fields(store_id = %store_id, invoice_id = %invoice_id))]
    pub async fn get_ledger_entries(
        &self,
        store_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_ledger_entries"])
            .start_timer();

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT entry_id, store_id, invoice_id, entry_type, amount_cents, created_utc
            FROM ledger_entries
            WHERE store_id = $1 AND invoice_id = $2
            ORDER BY created_utc, entry_id
            "#,
        )
        .bind(store_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get ledger entries: {}", e))
        })?;

        timer.observe_duration();

        Ok(entries)
    }

    /// Get the billing account of a store, if one exists.
    #[instrument(skip(self), fields(store_id = %store_id))]
    pub async fn get_billing_account(
        &self,
        store_id: Uuid,
    ) -> Result<Option<BillingAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_billing_account"])
            .start_timer();

        let account = sqlx::query_as::<_, BillingAccount>(
            r#"
            SELECT store_id, status, created_utc, updated_utc
            FROM billing_accounts
            WHERE store_id = $1
            "#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get billing account: {}", e))
        })?;

        timer.observe_duration();

        Ok(account)
    }
}
