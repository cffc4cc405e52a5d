//! Ledger idempotency and append-only invariant tests.

mod common;

use common::{create_request, line, TestEngine};
use chrono::Utc;
use invoicing_engine::models::PaymentType;
use uuid::Uuid;

#[tokio::test]
async fn pre_existing_sale_entry_aborts_issue_without_partial_writes() {
    let engine = TestEngine::spawn().await;
    let store_id = engine.seed_store("Guard Store").await;
    let widget = engine.seed_product(store_id, "Widget", 1000, 10).await;
    let ctx = engine.operator(store_id);

    let (invoice, _) = engine
        .lifecycle
        .create(&create_request(&ctx, None, vec![line(widget, 3)]), &ctx)
        .await
        .expect("Failed to create invoice");

    // A sale fact already recorded for this invoice, e.g. by a retried call
    // that committed after this one re-read the draft.
    engine
        .seed_ledger_entry(store_id, invoice.invoice_id, "sale", 3000)
        .await;

    let err = engine
        .lifecycle
        .issue(invoice.invoice_id, PaymentType::Cash, &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // The whole transaction rolled back: status, stock, and payment intact.
    assert_eq!(engine.status_of(store_id, invoice.invoice_id).await, "draft");
    assert_eq!(engine.stock_of(store_id, widget).await, 10);
    let payments = engine
        .db
        .get_payments(store_id, invoice.invoice_id)
        .await
        .expect("Failed to load payments");
    assert!(payments.is_empty());

    let entries = engine
        .db
        .get_ledger_entries(store_id, invoice.invoice_id)
        .await
        .expect("Failed to load ledger entries");
    assert_eq!(entries.len(), 1, "Only the pre-existing entry remains");
}

#[tokio::test]
async fn pre_existing_receipt_entry_aborts_settle_without_partial_writes() {
    let engine = TestEngine::spawn().await;
    let store_id = engine.seed_store("Receipt Guard Store").await;
    let widget = engine.seed_product(store_id, "Widget", 1000, 10).await;
    let ctx = engine.operator(store_id);

    let (invoice, _) = engine
        .lifecycle
        .create(&create_request(&ctx, None, vec![line(widget, 2)]), &ctx)
        .await
        .expect("Failed to create invoice");
    engine
        .lifecycle
        .issue(invoice.invoice_id, PaymentType::Credit, &ctx)
        .await
        .expect("Failed to issue invoice");

    engine
        .seed_ledger_entry(store_id, invoice.invoice_id, "receipt", 2000)
        .await;

    let err = engine
        .lifecycle
        .settle(invoice.invoice_id, &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    // The settle transaction rolled back entirely, including its payment.
    assert_eq!(
        engine.status_of(store_id, invoice.invoice_id).await,
        "unpaid"
    );
    let payments = engine
        .db
        .get_payments(store_id, invoice.invoice_id)
        .await
        .expect("Failed to load payments");
    assert!(payments.is_empty());
}

#[tokio::test]
async fn unique_index_rejects_duplicate_facts_at_the_schema_level() {
    let engine = TestEngine::spawn().await;
    let store_id = engine.seed_store("Index Store").await;
    let ctx = engine.operator(store_id);
    let invoice_id = engine
        .seed_invoice(store_id, ctx.operator_id, "unpaid", 1500)
        .await;

    engine
        .seed_ledger_entry(store_id, invoice_id, "sale", 1500)
        .await;

    // A second sale row for the same invoice violates the unique pair even
    // when written directly, bypassing the engine's guard.
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (entry_id, store_id, invoice_id, entry_type, amount_cents, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(store_id)
    .bind(invoice_id)
    .bind("sale")
    .bind(1500_i64)
    .bind(Utc::now())
    .execute(engine.db.pool())
    .await;

    let err = result.unwrap_err();
    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("Expected a database error, got {:?}", other),
    }

    // A different entry type for the same invoice is still allowed.
    engine
        .seed_ledger_entry(store_id, invoice_id, "receipt", 1500)
        .await;
}

#[tokio::test]
async fn full_credit_flow_records_each_fact_exactly_once() {
    let engine = TestEngine::spawn().await;
    let store_id = engine.seed_store("Exactly Once Store").await;
    let widget = engine.seed_product(store_id, "Widget", 700, 10).await;
    let ctx = engine.operator(store_id);

    let (invoice, _) = engine
        .lifecycle
        .create(&create_request(&ctx, None, vec![line(widget, 5)]), &ctx)
        .await
        .expect("Failed to create invoice");
    engine
        .lifecycle
        .issue(invoice.invoice_id, PaymentType::Credit, &ctx)
        .await
        .expect("Failed to issue invoice");
    engine
        .lifecycle
        .settle(invoice.invoice_id, &ctx)
        .await
        .expect("Failed to settle invoice");

    // Retries of both operations conflict and add nothing.
    assert_eq!(
        engine
            .lifecycle
            .issue(invoice.invoice_id, PaymentType::Credit, &ctx)
            .await
            .unwrap_err()
            .kind(),
        "conflict"
    );
    assert_eq!(
        engine
            .lifecycle
            .settle(invoice.invoice_id, &ctx)
            .await
            .unwrap_err()
            .kind(),
        "conflict"
    );

    let entries = engine
        .db
        .get_ledger_entries(store_id, invoice.invoice_id)
        .await
        .expect("Failed to load ledger entries");
    let sales = entries.iter().filter(|e| e.entry_type == "sale").count();
    let receipts = entries.iter().filter(|e| e.entry_type == "receipt").count();
    assert_eq!(sales, 1);
    assert_eq!(receipts, 1);
    assert!(entries.iter().all(|e| e.amount_cents == 3500));

    let payments = engine
        .db
        .get_payments(store_id, invoice.invoice_id)
        .await
        .expect("Failed to load payments");
    assert_eq!(payments.len(), 1);
}
