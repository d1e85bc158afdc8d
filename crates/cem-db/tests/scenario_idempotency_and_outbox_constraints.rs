//! Requires a live PostgreSQL instance reachable via CEM_PRIMARY_STORE_URL.
//! All tests skip automatically when that variable is absent (CI without a DB).

use sqlx::PgPool;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some("23505")
    } else {
        false
    }
}

async fn connect_and_migrate() -> PgPool {
    let db_url = std::env::var("CEM_PRIMARY_STORE_URL")
        .expect("DB tests require CEM_PRIMARY_STORE_URL; run with --include-ignored against a scratch database");
    let pool = PgPool::connect(&db_url).await.expect("connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
    pool
}

/// A webhook retry for the same `external_webhook_id` must not create a
/// second inbound_messages row.
#[tokio::test]
#[ignore = "requires CEM_PRIMARY_STORE_URL"]
async fn duplicate_webhook_id_is_rejected() {
    let pool = connect_and_migrate().await;
    let mut tx = pool.begin().await.expect("begin tx");

    sqlx::query("insert into inbound_messages (id, external_webhook_id, sender_address, subject) values (gen_random_uuid(), $1, 'a@example.com', 'subj')")
        .bind("webhook-dup-001")
        .execute(&mut *tx)
        .await
        .expect("first insert should succeed");

    let err = sqlx::query("insert into inbound_messages (id, external_webhook_id, sender_address, subject) values (gen_random_uuid(), $1, 'b@example.com', 'subj2')")
        .bind("webhook-dup-001")
        .execute(&mut *tx)
        .await
        .expect_err("duplicate external_webhook_id must be rejected");

    assert!(is_unique_violation(&err), "expected unique_violation, got: {err:?}");
    let _ = tx.rollback().await;
}

/// Two outbox rows sharing an idempotency_key must be rejected at the
/// database level, matching the teacher's oms_outbox uniqueness guarantee.
#[tokio::test]
#[ignore = "requires CEM_PRIMARY_STORE_URL"]
async fn duplicate_outbox_idempotency_key_is_rejected() {
    let pool = connect_and_migrate().await;
    let mut tx = pool.begin().await.expect("begin tx");

    let message_id: (uuid::Uuid,) = sqlx::query_as(
        "insert into inbound_messages (id, external_webhook_id, sender_address, subject) values (gen_random_uuid(), 'webhook-outbox-001', 'a@example.com', 'subj') returning id",
    )
    .fetch_one(&mut *tx)
    .await
    .expect("seed message insert");

    sqlx::query("insert into outbox_messages (id, aggregate_type, aggregate_id, operation, payload, idempotency_key) values (gen_random_uuid(), 'creditor_debt_update', $1, 'update', '{}'::jsonb, 'dedupe-key-1')")
        .bind(message_id.0.to_string())
        .execute(&mut *tx)
        .await
        .expect("first outbox insert should succeed");

    let err = sqlx::query("insert into outbox_messages (id, aggregate_type, aggregate_id, operation, payload, idempotency_key) values (gen_random_uuid(), 'creditor_debt_update', $1, 'update', '{}'::jsonb, 'dedupe-key-1')")
        .bind(message_id.0.to_string())
        .execute(&mut *tx)
        .await
        .expect_err("duplicate idempotency_key must be rejected");

    assert!(is_unique_violation(&err), "expected unique_violation, got: {err:?}");
    let _ = tx.rollback().await;
}

/// Only one active prompt per (task_type, name) may exist at a time.
#[tokio::test]
#[ignore = "requires CEM_PRIMARY_STORE_URL"]
async fn only_one_active_prompt_per_name() {
    let pool = connect_and_migrate().await;
    let mut tx = pool.begin().await.expect("begin tx");

    sqlx::query("insert into prompt_templates (id, task_type, name, version, active, template_text) values (gen_random_uuid(), 'intent', 'agent_1', 1, true, 'v1')")
        .execute(&mut *tx)
        .await
        .expect("first active prompt should succeed");

    let err = sqlx::query("insert into prompt_templates (id, task_type, name, version, active, template_text) values (gen_random_uuid(), 'intent', 'agent_1', 2, true, 'v2')")
        .execute(&mut *tx)
        .await
        .expect_err("second active prompt for the same name must be rejected");

    assert!(is_unique_violation(&err), "expected unique_violation, got: {err:?}");
    let _ = tx.rollback().await;
}
