//! Common test utilities for invoicing-engine integration tests.
#![allow(dead_code)]

use std::sync::Once;

use chrono::Utc;
use invoicing_engine::models::{CreateInvoice, LineItemInput, OperatorContext};
use invoicing_engine::{Database, InvoiceLifecycle};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,invoicing_engine=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A fully migrated in-memory engine instance.
pub struct TestEngine {
    pub db: Database,
    pub lifecycle: InvoiceLifecycle,
}

impl TestEngine {
    /// Spawn an engine against a fresh in-memory database.
    pub async fn spawn() -> Self {
        init_tracing();

        let db = Database::new("sqlite::memory:", 1, 1)
            .await
            .expect("Failed to connect to in-memory database");
        db.run_migrations().await.expect("Failed to run migrations");

        let lifecycle = InvoiceLifecycle::new(db.clone());
        TestEngine { db, lifecycle }
    }

    /// An operator scoped to the given store.
    pub fn operator(&self, store_id: Uuid) -> OperatorContext {
        OperatorContext::new(Uuid::new_v4(), store_id)
    }

    /// Seed a store and return its ID.
    pub async fn seed_store(&self, name: &str) -> Uuid {
        let store_id = Uuid::new_v4();
        sqlx::query("INSERT INTO stores (store_id, name, created_utc) VALUES ($1, $2, $3)")
            .bind(store_id)
            .bind(name)
            .bind(Utc::now())
            .execute(self.db.pool())
            .await
            .expect("Failed to seed store");
        store_id
    }

    /// Seed a product and return its ID.
    pub async fn seed_product(
        &self,
        store_id: Uuid,
        name: &str,
        price_cents: i64,
        stock: i64,
    ) -> Uuid {
        let product_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO products (product_id, store_id, name, price_cents, stock, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product_id)
        .bind(store_id)
        .bind(name)
        .bind(price_cents)
        .bind(stock)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .expect("Failed to seed product");
        product_id
    }

    /// Seed a billing account with the given raw status string.
    pub async fn seed_billing_account(&self, store_id: Uuid, status: &str) {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO billing_accounts (store_id, status, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(store_id)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .expect("Failed to seed billing account");
    }

    /// Seed an invoice row directly with an arbitrary status and no items.
    pub async fn seed_invoice(
        &self,
        store_id: Uuid,
        created_by: Uuid,
        status: &str,
        total_cents: i64,
    ) -> Uuid {
        let invoice_id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO invoices (invoice_id, store_id, customer_id, created_by, status, total_cents, created_utc, updated_utc)
            VALUES ($1, $2, NULL, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(invoice_id)
        .bind(store_id)
        .bind(created_by)
        .bind(status)
        .bind(total_cents)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await
        .expect("Failed to seed invoice");
        invoice_id
    }

    /// Seed a raw ledger entry, bypassing the engine's writers.
    pub async fn seed_ledger_entry(
        &self,
        store_id: Uuid,
        invoice_id: Uuid,
        entry_type: &str,
        amount_cents: i64,
    ) {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (entry_id, store_id, invoice_id, entry_type, amount_cents, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(store_id)
        .bind(invoice_id)
        .bind(entry_type)
        .bind(amount_cents)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await
        .expect("Failed to seed ledger entry");
    }

    /// Current stock of a product.
    pub async fn stock_of(&self, store_id: Uuid, product_id: Uuid) -> i64 {
        self.db
            .get_product(store_id, product_id)
            .await
            .expect("Failed to load product")
            .expect("Product should exist")
            .stock
    }

    /// Current raw status string of an invoice.
    pub async fn status_of(&self, store_id: Uuid, invoice_id: Uuid) -> String {
        self.db
            .get_invoice(store_id, invoice_id)
            .await
            .expect("Failed to load invoice")
            .expect("Invoice should exist")
            .status
    }
}

/// Shorthand for a single-product line.
pub fn line(product_id: Uuid, quantity: i64) -> LineItemInput {
    LineItemInput {
        product_id,
        quantity,
    }
}

/// Shorthand for a create request authored by the given operator.
pub fn create_request(
    ctx: &OperatorContext,
    customer_id: Option<Uuid>,
    items: Vec<LineItemInput>,
) -> CreateInvoice {
    CreateInvoice {
        store_id: ctx.store_id,
        created_by: ctx.operator_id,
        customer_id,
        items,
    }
}
