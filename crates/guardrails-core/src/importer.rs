use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use guardrails_shared::{Action, RiskLevel};
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Log-to-DB importer (§4.9), grounded on `log_to_db_service.py`. Runs inside the
/// Admin Service on a 5-second tick; lists JSONL files for today and the prior two
/// days, skips files it has already fully processed, and inserts one
/// `DetectionResult` row per record, deduplicated by `request_id`.
///
/// Processed-filename bookkeeping uses a DB table (`importer_processed_files`)
/// rather than the pickle file the original keeps on local disk, since the Admin
/// Service may run as more than one process/replica sharing the same DB.
pub struct Importer {
    pool: PgPool,
    log_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files_processed: u32,
    pub records_inserted: u32,
    pub records_skipped: u32,
    pub records_malformed: u32,
}

impl Importer {
    pub fn new(pool: PgPool, log_dir: impl Into<PathBuf>) -> Self {
        Self { pool, log_dir: log_dir.into() }
    }

    pub async fn run_once(&self) -> ImportStats {
        let mut stats = ImportStats::default();

        for filename in self.candidate_filenames() {
            let path = self.log_dir.join(&filename);
            if !path.exists() {
                continue;
            }

            match self.already_processed(&filename).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, filename, "failed to check importer state");
                    continue;
                }
            }

            if !self.eligible(&path, &filename).await {
                continue;
            }

            match self.process_file(&path).await {
                Ok(file_stats) => {
                    stats.records_inserted += file_stats.records_inserted;
                    stats.records_skipped += file_stats.records_skipped;
                    stats.records_malformed += file_stats.records_malformed;
                    stats.files_processed += 1;
                    if let Err(e) = self.mark_processed(&filename).await {
                        tracing::error!(error = %e, filename, "failed to persist importer state");
                    }
                }
                Err(e) => tracing::error!(error = %e, filename, "failed to import detection log file"),
            }
        }

        stats
    }

    fn candidate_filenames(&self) -> Vec<String> {
        let today = Utc::now().date_naive();
        (0..3)
            .map(|days_ago| {
                let date = today - Duration::days(days_ago);
                format!("detection_{}.jsonl", date.format("%Y%m%d"))
            })
            .collect()
    }

    async fn already_processed(&self, filename: &str) -> guardrails_shared::Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT filename FROM importer_processed_files WHERE log_dir = $1 AND filename = $2",
        )
        .bind(self.log_dir.to_string_lossy().as_ref())
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_processed(&self, filename: &str) -> guardrails_shared::Result<()> {
        sqlx::query(
            "INSERT INTO importer_processed_files (log_dir, filename, processed_at)
             VALUES ($1, $2, now())
             ON CONFLICT (log_dir, filename) DO UPDATE SET processed_at = now()",
        )
        .bind(self.log_dir.to_string_lossy().as_ref())
        .bind(filename)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A file is eligible once its mtime is older than 5 minutes (avoids racing the
    /// writer) or its first ten records already exist in the DB.
    async fn eligible(&self, path: &Path, filename: &str) -> bool {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        let age = modified.elapsed().unwrap_or_default();
        if age > std::time::Duration::from_secs(300) {
            return true;
        }

        let Ok(contents) = tokio::fs::read_to_string(path).await else {
            return false;
        };
        let head_ids: Vec<String> = contents
            .lines()
            .take(10)
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|v| v.get("request_id")?.as_str().map(str::to_string))
            .collect();

        if head_ids.is_empty() {
            return false;
        }

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM detection_results WHERE request_id = ANY($1)",
        )
        .bind(&head_ids)
        .fetch_one(&self.pool)
        .await
        .unwrap_or((0,));

        count as usize >= head_ids.len()
    }

    async fn process_file(&self, path: &Path) -> guardrails_shared::Result<ImportStats> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            guardrails_shared::GuardrailsError::InternalError(format!("read {}: {e}", path.display()))
        })?;

        let mut stats = ImportStats::default();

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(record) => match self.import_record(record).await {
                    Ok(true) => stats.records_inserted += 1,
                    Ok(false) => stats.records_skipped += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to insert detection record");
                        stats.records_malformed += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, line, "malformed detection log line, skipping");
                    stats.records_malformed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Returns `Ok(true)` if a new row was inserted, `Ok(false)` if it was a
    /// dedup no-op (already present).
    async fn import_record(&self, record: serde_json::Value) -> guardrails_shared::Result<bool> {
        let Some(request_id) = record.get("request_id").and_then(|v| v.as_str()) else {
            return Err(guardrails_shared::GuardrailsError::InvalidInput("missing request_id".into()));
        };

        let Some(tenant_id) = record
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            // numeric-legacy or invalid tenant_id: drop the record.
            return Err(guardrails_shared::GuardrailsError::InvalidInput(
                "tenant_id missing or not a UUID".into(),
            ));
        };

        let created_at = record
            .get("logged_at")
            .or_else(|| record.get("created_at"))
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp_tolerant)
            .unwrap_or_else(Utc::now);

        let content = record.get("content").and_then(|v| v.as_str()).unwrap_or_default();
        let suggest_action: Action = record
            .get("suggest_action")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(Action::Pass);
        let suggest_answer = record.get("suggest_answer").and_then(|v| v.as_str()).map(str::to_string);

        let security_risk_level = risk_level_field(&record, "security_risk_level");
        let compliance_risk_level = risk_level_field(&record, "compliance_risk_level");
        let data_risk_level = risk_level_field(&record, "data_risk_level");

        let security_categories = string_array_field(&record, "security_categories");
        let compliance_categories = string_array_field(&record, "compliance_categories");
        let data_categories = string_array_field(&record, "data_categories");
        let image_paths = string_array_field(&record, "image_paths");
        let hit_keywords = record
            .get("hit_keywords")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect::<Vec<_>>());

        let sensitivity_score = record.get("sensitivity_score").and_then(serde_json::Value::as_f64);
        let sensitivity_level = record.get("sensitivity_level").and_then(|v| v.as_str()).map(str::to_string);
        let has_image = record.get("has_image").and_then(|v| v.as_bool()).unwrap_or(false);
        let image_count = record.get("image_count").and_then(serde_json::Value::as_i64).unwrap_or(0) as i32;
        let model_response = record.get("model_response").and_then(|v| v.as_str()).map(str::to_string);
        let ip_address = record.get("ip_address").and_then(|v| v.as_str()).map(str::to_string);
        let user_agent = record.get("user_agent").and_then(|v| v.as_str()).map(str::to_string);

        let result = sqlx::query(
            "INSERT INTO detection_results
                (request_id, tenant_id, content, suggest_action, suggest_answer,
                 security_risk_level, security_categories, compliance_risk_level, compliance_categories,
                 data_risk_level, data_categories, sensitivity_level, sensitivity_score,
                 has_image, image_count, image_paths, hit_keywords, model_response,
                 ip_address, user_agent, created_at)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21)
             ON CONFLICT (request_id) DO NOTHING",
        )
        .bind(request_id)
        .bind(tenant_id)
        .bind(content)
        .bind(suggest_action)
        .bind(&suggest_answer)
        .bind(security_risk_level)
        .bind(&security_categories)
        .bind(compliance_risk_level)
        .bind(&compliance_categories)
        .bind(data_risk_level)
        .bind(&data_categories)
        .bind(&sensitivity_level)
        .bind(sensitivity_score)
        .bind(has_image)
        .bind(image_count)
        .bind(&image_paths)
        .bind(&hit_keywords)
        .bind(&model_response)
        .bind(&ip_address)
        .bind(&user_agent)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn risk_level_field(record: &serde_json::Value, key: &str) -> RiskLevel {
    let Some(value) = record.get(key) else {
        return RiskLevel::default();
    };

    if let Ok(level) = serde_json::from_value::<RiskLevel>(value.clone()) {
        return level;
    }

    value
        .as_str()
        .and_then(|s| match s {
            "no_risk" => Some(RiskLevel::NoRisk),
            "low_risk" | "low" => Some(RiskLevel::Low),
            "medium_risk" | "medium" => Some(RiskLevel::Medium),
            "high_risk" | "high" => Some(RiskLevel::High),
            _ => None,
        })
        .unwrap_or_default()
}

fn string_array_field(record: &serde_json::Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Accepts a trailing `Z` as UTC; if no timezone is present, assumes UTC+8 (the
/// original deployment's local zone), matching the source importer's tolerance.
fn parse_timestamp_tolerant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let stripped = raw.strip_suffix('Z').unwrap_or(raw);
    if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%d %H:%M:%S%.f") {
        let offset = Duration::hours(8);
        return Some(Utc.from_utc_datetime(&naive) - offset);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_trailing_z() {
        let parsed = parse_timestamp_tolerant("2026-07-27T10:00:00Z").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-07-27 10:00:00");
    }

    #[test]
    fn parses_naive_timestamp_as_utc_plus_8() {
        let parsed = parse_timestamp_tolerant("2026-07-27 18:00:00").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-07-27 10:00:00");
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_timestamp_tolerant("not-a-date").is_none());
    }

    #[test]
    fn risk_level_field_defaults_to_no_risk_on_missing_or_unknown() {
        let record = serde_json::json!({});
        assert_eq!(risk_level_field(&record, "security_risk_level"), RiskLevel::NoRisk);
    }
}
