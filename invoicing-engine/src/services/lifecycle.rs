//! Invoice lifecycle orchestrator.
//!
//! Each operation is one transactional unit: the invoice is re-read inside
//! the transaction, every guard runs against that fresh view, and all writes
//! commit together or not at all.

use std::collections::HashMap;

use chrono::Utc;
use engine_core::config::Config;
use engine_core::error::AppError;
use sqlx::SqliteConnection;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::invoice::validate_transition;
use crate::models::{
    BillingAccount, CancelOutcome, CreateInvoice, Invoice, InvoiceItem, InvoiceStatus,
    IssueOutcome, LedgerEntryType, LineItemInput, OperatorContext, PaymentType, Product,
    SettleOutcome, UpdateDraft,
};
use crate::services::database::Database;
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_TOTAL};
use crate::services::{ledger, stock, tenant};

const INVOICE_COLUMNS: &str = "invoice_id, store_id, customer_id, created_by, status, \
     payment_type, total_cents, issued_by, settled_by, cancelled_by, \
     created_utc, updated_utc, issued_utc, settled_utc, cancelled_utc";

/// Transactional orchestrator for the five invoice lifecycle operations.
#[derive(Clone)]
pub struct InvoiceLifecycle {
    db: Database,
    fail_open_billing_gate: bool,
}

impl InvoiceLifecycle {
    /// Create an orchestrator with the default fail-open billing gate.
    pub fn new(db: Database) -> Self {
        InvoiceLifecycle {
            db,
            fail_open_billing_gate: true,
        }
    }

    /// Create an orchestrator honoring the configured billing-gate policy.
    pub fn with_config(db: Database, config: &Config) -> Self {
        InvoiceLifecycle {
            db,
            fail_open_billing_gate: config.fail_open_billing_gate,
        }
    }

    /// Get the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // -------------------------------------------------------------------------
    // create
    // -------------------------------------------------------------------------

    /// Create a new draft invoice with priced line items.
    ///
    /// Snapshots each product's price into its line and computes the total;
    /// checks availability informationally but reserves nothing — drafts have
    /// no financial or inventory impact.
    #[instrument(
        skip(self, input, ctx),
        fields(store_id = %input.store_id, operator_id = %ctx.operator_id, request_id = %ctx.request_id)
    )]
    pub async fn create(
        &self,
        input: &CreateInvoice,
        ctx: &OperatorContext,
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        if input.store_id != ctx.store_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Operator {} does not belong to store {}",
                ctx.operator_id,
                input.store_id
            )));
        }
        if input.created_by != ctx.operator_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Declared creator {} does not match the authenticated operator",
                input.created_by
            )));
        }
        validate_line_inputs(&input.items)?;

        let mut tx = self.db.begin().await?;

        let aggregated =
            stock::aggregate_quantities(input.items.iter().map(|l| (l.product_id, l.quantity)));
        let products = load_products(&mut tx, input.store_id, &aggregated).await?;
        stock::check_availability(&products, &aggregated);

        let total_cents = compute_total(&input.items, &products)?;

        let invoice_id = Uuid::new_v4();
        let now = Utc::now();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (invoice_id, store_id, customer_id, created_by, status, total_cents, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(input.store_id)
        .bind(input.customer_id)
        .bind(input.created_by)
        .bind(total_cents)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)))?;

        let items = insert_items(&mut tx, &invoice, &input.items, &products).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL.with_label_values(&["draft"]).inc();

        info!(
            invoice_id = %invoice.invoice_id,
            total_cents = total_cents,
            item_count = items.len(),
            "Draft invoice created"
        );

        Ok((invoice, items))
    }

    // -------------------------------------------------------------------------
    // update_draft
    // -------------------------------------------------------------------------

    /// Replace the customer and/or item set of a draft invoice.
    ///
    /// Items are replaced wholesale and the total recomputed from fresh price
    /// snapshots. Only the creating operator may modify the draft.
    #[instrument(
        skip(self, patch, ctx),
        fields(invoice_id = %invoice_id, operator_id = %ctx.operator_id, request_id = %ctx.request_id)
    )]
    pub async fn update_draft(
        &self,
        invoice_id: Uuid,
        patch: &UpdateDraft,
        ctx: &OperatorContext,
    ) -> Result<(Invoice, Vec<InvoiceItem>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_draft"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let invoice = fetch_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
        tenant::enforce_store_boundary(invoice.store_id, ctx, "update_draft", invoice_id)?;

        if invoice.created_by != ctx.operator_id {
            warn!(
                invoice_id = %invoice_id,
                created_by = %invoice.created_by,
                operator_id = %ctx.operator_id,
                "Draft modification denied for non-creator"
            );
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Only the creating operator may modify a draft invoice"
            )));
        }

        let status = parsed_status(&invoice)?;
        if !status.can_modify() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only draft invoices can be modified; invoice is {}",
                status
            )));
        }

        let mut total_cents = invoice.total_cents;
        if let Some(items) = &patch.items {
            validate_line_inputs(items)?;

            let aggregated =
                stock::aggregate_quantities(items.iter().map(|l| (l.product_id, l.quantity)));
            let products = load_products(&mut tx, invoice.store_id, &aggregated).await?;
            stock::check_availability(&products, &aggregated);
            total_cents = compute_total(items, &products)?;

            sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
                .bind(invoice_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to replace items: {}", e))
                })?;

            insert_items(&mut tx, &invoice, items, &products).await?;
        }

        let customer_id = match patch.customer_id {
            Some(value) => value,
            None => invoice.customer_id,
        };

        let updated = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET customer_id = $2, total_cents = $3, updated_utc = $4
            WHERE invoice_id = $1 AND status = 'draft'
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice_id)
        .bind(customer_id)
        .bind(total_cents)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice: {}", e)))?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!(
                "Invoice {} was modified concurrently",
                invoice_id
            ))
        })?;

        let items = fetch_items(&mut tx, invoice_id).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, total_cents = total_cents, "Draft invoice updated");

        Ok((updated, items))
    }

    // -------------------------------------------------------------------------
    // issue
    // -------------------------------------------------------------------------

    /// Issue a draft invoice: the irreversible transition that freezes its
    /// content, reserves stock, and records the SALE ledger fact.
    ///
    /// Cash invoices settle immediately (PAID, payment recorded); credit
    /// invoices become UNPAID and settle later.
    #[instrument(
        skip(self, ctx),
        fields(invoice_id = %invoice_id, operator_id = %ctx.operator_id, request_id = %ctx.request_id)
    )]
    pub async fn issue(
        &self,
        invoice_id: Uuid,
        payment_type: PaymentType,
        ctx: &OperatorContext,
    ) -> Result<IssueOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["issue_invoice"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let invoice = fetch_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
        tenant::enforce_store_boundary(invoice.store_id, ctx, "issue", invoice_id)?;

        let items = fetch_items(&mut tx, invoice_id).await?;
        if items.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot issue an invoice with no items"
            )));
        }
        if invoice.total_cents <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Cannot issue an invoice with a zero total"
            )));
        }

        let previous = parsed_status(&invoice)?;
        if !previous.can_issue() {
            // A repeated issue call is a duplicate-fact attempt, not a malformed
            // request; only states that never saw issuance are a bad request.
            if previous == InvoiceStatus::Issued || previous.has_financial_impact() {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was already issued",
                    invoice_id
                )));
            }
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only draft invoices can be issued; invoice is {}",
                previous
            )));
        }

        self.check_billing_gate(&mut tx, invoice.store_id).await?;

        let aggregated =
            stock::aggregate_quantities(items.iter().map(|i| (i.product_id, i.quantity)));
        stock::reserve(&mut tx, invoice.store_id, &aggregated).await?;

        let final_status = match payment_type {
            PaymentType::Cash => InvoiceStatus::Paid,
            PaymentType::Credit => InvoiceStatus::Unpaid,
        };
        validate_transition(previous, InvoiceStatus::Issued).map_err(log_transition_defect)?;
        validate_transition(InvoiceStatus::Issued, final_status).map_err(log_transition_defect)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $2, payment_type = $3, issued_by = $4, issued_utc = $5, updated_utc = $6
            WHERE invoice_id = $1 AND status = 'draft'
            "#,
        )
        .bind(invoice_id)
        .bind(final_status.as_str())
        .bind(payment_type.as_str())
        .bind(ctx.operator_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to issue invoice: {}", e)))
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was modified concurrently",
                    invoice_id
                )))
            } else {
                Ok(())
            }
        })?;

        if payment_type == PaymentType::Cash {
            ledger::insert_payment(
                &mut tx,
                invoice.store_id,
                invoice_id,
                invoice.total_cents,
                PaymentType::Cash,
            )
            .await?;
        }

        ledger::ensure_no_entry(&mut tx, invoice_id, LedgerEntryType::Sale).await?;
        ledger::insert_entry(
            &mut tx,
            invoice.store_id,
            invoice_id,
            LedgerEntryType::Sale,
            invoice.total_cents,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL
            .with_label_values(&[final_status.as_str()])
            .inc();

        info!(
            invoice_id = %invoice_id,
            payment_type = %payment_type,
            status = %final_status,
            total_cents = invoice.total_cents,
            "Invoice issued"
        );

        Ok(IssueOutcome {
            invoice_id,
            previous_status: previous,
            current_status: final_status,
            payment_type,
            total_cents: invoice.total_cents,
            issued_at: now,
            message: format!(
                "Invoice issued with {} payment; now {}",
                payment_type, final_status
            ),
        })
    }

    // -------------------------------------------------------------------------
    // settle
    // -------------------------------------------------------------------------

    /// Settle an unpaid (credit-issued) invoice: record the payment and the
    /// RECEIPT ledger fact, and mark the invoice paid.
    #[instrument(
        skip(self, ctx),
        fields(invoice_id = %invoice_id, operator_id = %ctx.operator_id, request_id = %ctx.request_id)
    )]
    pub async fn settle(
        &self,
        invoice_id: Uuid,
        ctx: &OperatorContext,
    ) -> Result<SettleOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_invoice"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let invoice = fetch_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
        tenant::enforce_store_boundary(invoice.store_id, ctx, "settle", invoice_id)?;

        let previous = parsed_status(&invoice)?;
        if !previous.can_settle() {
            if previous == InvoiceStatus::Paid {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was already settled",
                    invoice_id
                )));
            }
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only unpaid invoices can be settled; invoice is {}",
                previous
            )));
        }
        validate_transition(previous, InvoiceStatus::Paid).map_err(log_transition_defect)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'paid', settled_by = $2, settled_utc = $3, updated_utc = $4
            WHERE invoice_id = $1 AND status = 'unpaid'
            "#,
        )
        .bind(invoice_id)
        .bind(ctx.operator_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to settle invoice: {}", e)))
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was modified concurrently",
                    invoice_id
                )))
            } else {
                Ok(())
            }
        })?;

        ledger::insert_payment(
            &mut tx,
            invoice.store_id,
            invoice_id,
            invoice.total_cents,
            PaymentType::Credit,
        )
        .await?;

        ledger::ensure_no_entry(&mut tx, invoice_id, LedgerEntryType::Receipt).await?;
        ledger::insert_entry(
            &mut tx,
            invoice.store_id,
            invoice_id,
            LedgerEntryType::Receipt,
            invoice.total_cents,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL.with_label_values(&["paid"]).inc();

        info!(
            invoice_id = %invoice_id,
            total_cents = invoice.total_cents,
            "Invoice settled"
        );

        Ok(SettleOutcome {
            invoice_id,
            previous_status: previous,
            current_status: InvoiceStatus::Paid,
            settled_at: now,
            message: "Invoice settled; payment collected".to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // cancel
    // -------------------------------------------------------------------------

    /// Cancel a draft or issued invoice.
    ///
    /// Draft cancellation has no financial or inventory effect. Cancelling an
    /// invoice stored as issued posts a reversal entry offsetting its sale;
    /// the sale itself stays in the ledger (append-only). Stock is never
    /// restored here.
    #[instrument(
        skip(self, ctx),
        fields(invoice_id = %invoice_id, operator_id = %ctx.operator_id, request_id = %ctx.request_id)
    )]
    pub async fn cancel(
        &self,
        invoice_id: Uuid,
        ctx: &OperatorContext,
    ) -> Result<CancelOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let mut tx = self.db.begin().await?;

        let invoice = fetch_invoice(&mut tx, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id)))?;
        tenant::enforce_store_boundary(invoice.store_id, ctx, "cancel", invoice_id)?;

        let previous = parsed_status(&invoice)?;
        if !previous.can_cancel() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Only draft or issued invoices can be cancelled; invoice is {}",
                previous
            )));
        }
        validate_transition(previous, InvoiceStatus::Cancelled).map_err(log_transition_defect)?;

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'cancelled', cancelled_by = $2, cancelled_utc = $3, updated_utc = $4
            WHERE invoice_id = $1 AND status = $5
            "#,
        )
        .bind(invoice_id)
        .bind(ctx.operator_id)
        .bind(now)
        .bind(now)
        .bind(previous.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel invoice: {}", e)))
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "Invoice {} was modified concurrently",
                    invoice_id
                )))
            } else {
                Ok(())
            }
        })?;

        if previous == InvoiceStatus::Issued {
            ledger::ensure_no_entry(&mut tx, invoice_id, LedgerEntryType::Reversal).await?;
            ledger::insert_entry(
                &mut tx,
                invoice.store_id,
                invoice_id,
                LedgerEntryType::Reversal,
                invoice.total_cents,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        INVOICES_TOTAL.with_label_values(&["cancelled"]).inc();

        info!(invoice_id = %invoice_id, previous_status = %previous, "Invoice cancelled");

        Ok(CancelOutcome {
            invoice_id,
            previous_status: previous,
            current_status: InvoiceStatus::Cancelled,
            cancelled_at: now,
            message: "Invoice cancelled".to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // Billing gate
    // -------------------------------------------------------------------------

    /// Issuance precondition: an existing billing account must be active.
    ///
    /// No billing account means the store predates billing onboarding and is
    /// allowed through. A failed lookup is governed by the fail-open flag.
    async fn check_billing_gate(
        &self,
        conn: &mut SqliteConnection,
        store_id: Uuid,
    ) -> Result<(), AppError> {
        let account = match fetch_billing_account(conn, store_id).await {
            Ok(account) => account,
            Err(e) if self.fail_open_billing_gate => {
                warn!(
                    store_id = %store_id,
                    error = %e,
                    "Billing account lookup failed; allowing issuance (fail-open)"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let account = match account {
            Some(account) => account,
            None => return Ok(()),
        };

        match account.parsed_status() {
            Some(status) if status.can_issue_invoices() => Ok(()),
            Some(status) => Err(AppError::Forbidden(anyhow::anyhow!(
                "Billing account is {}; invoice issuance is blocked",
                status
            ))),
            None if self.fail_open_billing_gate => {
                warn!(
                    store_id = %store_id,
                    status = %account.status,
                    "Unrecognized billing status; allowing issuance (fail-open)"
                );
                Ok(())
            }
            None => Err(AppError::InternalError(anyhow::anyhow!(
                "Unrecognized billing status '{}' for store {}",
                account.status,
                store_id
            ))),
        }
    }
}

// -----------------------------------------------------------------------------
// Transaction-scoped helpers
// -----------------------------------------------------------------------------

async fn fetch_invoice(
    conn: &mut SqliteConnection,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load invoice: {}", e)))
}

async fn fetch_items(
    conn: &mut SqliteConnection,
    invoice_id: Uuid,
) -> Result<Vec<InvoiceItem>, AppError> {
    sqlx::query_as::<_, InvoiceItem>(
        r#"
        SELECT item_id, invoice_id, store_id, product_id, quantity, unit_price_cents, created_utc
        FROM invoice_items
        WHERE invoice_id = $1
        ORDER BY created_utc, item_id
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load invoice items: {}", e)))
}

async fn fetch_billing_account(
    conn: &mut SqliteConnection,
    store_id: Uuid,
) -> Result<Option<BillingAccount>, AppError> {
    sqlx::query_as::<_, BillingAccount>(
        "SELECT store_id, status, created_utc, updated_utc FROM billing_accounts WHERE store_id = $1",
    )
    .bind(store_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load billing account: {}", e)))
}

/// Load every referenced product, scoped to the store. A missing product is
/// `NotFound` — products from other stores are indistinguishable from absent
/// ones by design.
async fn load_products(
    conn: &mut SqliteConnection,
    store_id: Uuid,
    aggregated: &std::collections::BTreeMap<Uuid, i64>,
) -> Result<HashMap<Uuid, Product>, AppError> {
    let mut products = HashMap::with_capacity(aggregated.len());
    for product_id in aggregated.keys() {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, store_id, name, price_cents, stock, created_utc, updated_utc
            FROM products
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load product: {}", e)))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Product {} not found in store", product_id))
        })?;
        products.insert(product.product_id, product);
    }
    Ok(products)
}

async fn insert_items(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    lines: &[LineItemInput],
    products: &HashMap<Uuid, Product>,
) -> Result<Vec<InvoiceItem>, AppError> {
    let mut items = Vec::with_capacity(lines.len());
    let now = Utc::now();
    for line in lines {
        let product = products.get(&line.product_id).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Product {} missing from loaded set",
                line.product_id
            ))
        })?;

        let item = sqlx::query_as::<_, InvoiceItem>(
            r#"
            INSERT INTO invoice_items (item_id, invoice_id, store_id, product_id, quantity, unit_price_cents, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING item_id, invoice_id, store_id, product_id, quantity, unit_price_cents, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice.invoice_id)
        .bind(invoice.store_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(product.price_cents)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert item: {}", e)))?;

        items.push(item);
    }
    Ok(items)
}

fn validate_line_inputs(items: &[LineItemInput]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "An invoice needs at least one item"
        )));
    }
    for line in items {
        if line.quantity < 1 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
    }
    Ok(())
}

fn compute_total(
    items: &[LineItemInput],
    products: &HashMap<Uuid, Product>,
) -> Result<i64, AppError> {
    let mut total_cents: i64 = 0;
    for line in items {
        let product = products.get(&line.product_id).ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Product {} missing from loaded set",
                line.product_id
            ))
        })?;
        total_cents += product.price_cents * line.quantity;
    }
    Ok(total_cents)
}

fn parsed_status(invoice: &Invoice) -> Result<InvoiceStatus, AppError> {
    invoice.parsed_status().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Invoice {} has unrecognized status '{}'",
            invoice.invoice_id,
            invoice.status
        ))
    })
}

/// An illegal transition past the `can_*` guards is a caller contract bug,
/// not a user error; log it as a defect before surfacing it.
fn log_transition_defect(err: AppError) -> AppError {
    if let AppError::IllegalStateTransition { from, to } = &err {
        error!(
            from = %from,
            to = %to,
            "State transition contract violated; a precondition check was bypassed"
        );
    }
    err
}
