use anyhow::{Context, Result};
use cem_schemas::matching::MatchResult;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SELECT_COLUMNS: &str = r#"
    id, message_id, inquiry_id, total_score, confidence_tier, component_scores,
    scoring_details, ambiguity_gap, rank, selected, selection_method
"#;

fn row_to_match_result(row: sqlx::postgres::PgRow) -> Result<MatchResult> {
    Ok(MatchResult {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        inquiry_id: row.try_get("inquiry_id")?,
        total_score: row.try_get("total_score")?,
        confidence_tier: row.try_get("confidence_tier")?,
        component_scores: row.try_get("component_scores")?,
        scoring_details: row.try_get("scoring_details")?,
        ambiguity_gap: row.try_get("ambiguity_gap")?,
        rank: row.try_get("rank")?,
        selected: row.try_get("selected")?,
        selection_method: row.try_get("selection_method")?,
    })
}

/// Persists the full ranked candidate list for one message's matching pass
/// (§4.7, §3 "per-candidate scoring record").
pub async fn insert_batch(pool: &PgPool, results: &[MatchResult]) -> Result<()> {
    let mut tx = pool.begin().await.context("matching::insert_batch begin tx failed")?;
    for r in results {
        sqlx::query(
            r#"
            insert into match_results (
                id, message_id, inquiry_id, total_score, confidence_tier, component_scores,
                scoring_details, ambiguity_gap, rank, selected, selection_method
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(r.id)
        .bind(r.message_id)
        .bind(r.inquiry_id)
        .bind(r.total_score)
        .bind(&r.confidence_tier)
        .bind(&r.component_scores)
        .bind(&r.scoring_details)
        .bind(r.ambiguity_gap)
        .bind(r.rank)
        .bind(r.selected)
        .bind(&r.selection_method)
        .execute(&mut *tx)
        .await
        .context("matching::insert_batch row insert failed")?;
    }
    tx.commit().await.context("matching::insert_batch commit failed")?;
    Ok(())
}

pub async fn list_for_message(pool: &PgPool, message_id: Uuid) -> Result<Vec<MatchResult>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from match_results where message_id = $1 order by rank asc"
    ))
    .bind(message_id)
    .fetch_all(pool)
    .await
    .context("matching::list_for_message failed")?;

    rows.into_iter().map(row_to_match_result).collect()
}

/// Three-level threshold fallback (§4.7): a row scoped to `(category,
/// threshold_type, weight_name)`, else `(category, threshold_type, "")`,
/// else the caller's compiled-in default.
pub async fn lookup_threshold(
    pool: &PgPool,
    category: &str,
    threshold_type: &str,
    weight_name: Option<&str>,
    compiled_default: f64,
) -> Result<f64> {
    if let Some(weight_name) = weight_name {
        if let Some(v) = fetch_threshold_value(pool, category, threshold_type, weight_name).await? {
            return Ok(v);
        }
    }
    if let Some(v) = fetch_threshold_value(pool, category, threshold_type, "").await? {
        return Ok(v);
    }
    if let Some(v) = fetch_threshold_value(pool, "default", threshold_type, "").await? {
        return Ok(v);
    }
    Ok(compiled_default)
}

async fn fetch_threshold_value(
    pool: &PgPool,
    category: &str,
    threshold_type: &str,
    weight_name: &str,
) -> Result<Option<f64>> {
    let row: Option<(Decimal,)> = sqlx::query_as(
        "select value from matching_thresholds where category = $1 and threshold_type = $2 and weight_name = $3",
    )
    .bind(category)
    .bind(threshold_type)
    .bind(weight_name)
    .fetch_optional(pool)
    .await
    .context("matching::fetch_threshold_value failed")?;

    Ok(row.and_then(|(d,)| d.to_string().parse::<f64>().ok()))
}

pub async fn upsert_threshold(
    pool: &PgPool,
    category: &str,
    threshold_type: &str,
    weight_name: &str,
    value: Decimal,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into matching_thresholds (category, threshold_type, weight_name, value)
        values ($1, $2, $3, $4)
        on conflict (category, threshold_type, weight_name)
        do update set value = excluded.value
        "#,
    )
    .bind(category)
    .bind(threshold_type)
    .bind(weight_name)
    .bind(value)
    .execute(pool)
    .await
    .context("matching::upsert_threshold failed")?;
    Ok(())
}
