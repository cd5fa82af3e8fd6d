//! Persistence for the Citizenly registry: the store contract, the
//! PostgreSQL implementation, an in-memory stand-in for tests and local
//! tooling, and retry classification for contended writes.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use citizenly_core::{BarangaySectoralCounts, Resident, SectoralRecord};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "citizenly-storage";

/// Embedded schema migrations, applied with `citizenly migrate` or
/// [`PgRegistry::run_migrations`].
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("resident {0} not found")]
    ResidentNotFound(Uuid),
    #[error("write conflict on resident {0}")]
    Conflict(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

/// Serialization failures and deadlocks are worth retrying; everything else
/// (constraint violations, connection loss, bad SQL) is surfaced as-is.
pub fn classify_db_error(err: &sqlx::Error) -> RetryDisposition {
    if let sqlx::Error::Database(db_err) = err {
        if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01")) {
            return RetryDisposition::Retryable;
        }
    }
    RetryDisposition::NonRetryable
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Store contract between the classification engine and its backing store.
///
/// The resident insert/update operations take the companion sectoral row
/// alongside the resident so implementations can persist both in one
/// transaction; a resident write must never become visible without its
/// recomputed flags.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn fetch_resident(&self, resident_id: Uuid) -> Result<Option<Resident>, StoreError>;

    async fn fetch_sectoral(&self, resident_id: Uuid)
        -> Result<Option<SectoralRecord>, StoreError>;

    async fn insert_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError>;

    /// Overwrites a resident's attributes and sectoral row atomically.
    /// Fails with [`StoreError::ResidentNotFound`] when the id is unknown.
    async fn update_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError>;

    /// Removes the resident and (by cascade) their sectoral row. Returns
    /// whether anything existed.
    async fn delete_resident(&self, resident_id: Uuid) -> Result<bool, StoreError>;

    /// Insert-or-replace of a sectoral row keyed by resident id. The stored
    /// `created_at` is preserved on replace.
    async fn upsert_sectoral(&self, record: &SectoralRecord) -> Result<(), StoreError>;

    /// Name-ordered page of residents for listing endpoints.
    async fn list_residents(&self, offset: i64, limit: i64) -> Result<Vec<Resident>, StoreError>;

    /// Id-ordered keyset page for full-registry scans; pass the last id of
    /// the previous page to continue.
    async fn list_residents_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Resident>, StoreError>;

    async fn count_residents(&self) -> Result<i64, StoreError>;

    /// Per-barangay sector totals, every resident counted whether or not a
    /// sectoral row exists yet.
    async fn sectoral_counts(&self) -> Result<Vec<BarangaySectoralCounts>, StoreError>;
}

/// PostgreSQL-backed registry store.
#[derive(Debug, Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

fn parse_enum<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value.as_deref().and_then(|s| s.parse().ok())
}

fn resident_from_row(row: &PgRow) -> Result<Resident, sqlx::Error> {
    let attainment: Option<String> = row.try_get("education_attainment")?;
    let status: Option<String> = row.try_get("education_status")?;
    let employment: Option<String> = row.try_get("employment_status")?;
    Ok(Resident {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        barangay_code: row.try_get("barangay_code")?,
        birthdate: row.try_get("birthdate")?,
        // Unknown stored values decode to None and classify as nothing.
        education_attainment: parse_enum(attainment),
        education_status: parse_enum(status),
        employment_status: parse_enum(employment),
        ethnicity: row.try_get("ethnicity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn sectoral_from_row(row: &PgRow) -> Result<SectoralRecord, sqlx::Error> {
    Ok(SectoralRecord {
        resident_id: row.try_get("resident_id")?,
        is_out_of_school_children: row.try_get("is_out_of_school_children")?,
        is_out_of_school_youth: row.try_get("is_out_of_school_youth")?,
        is_senior_citizen: row.try_get("is_senior_citizen")?,
        is_labor_force_employed: row.try_get("is_labor_force_employed")?,
        is_unemployed: row.try_get("is_unemployed")?,
        is_indigenous_people: row.try_get("is_indigenous_people")?,
        is_registered_senior_citizen: row.try_get("is_registered_senior_citizen")?,
        is_person_with_disability: row.try_get("is_person_with_disability")?,
        is_overseas_filipino_worker: row.try_get("is_overseas_filipino_worker")?,
        is_solo_parent: row.try_get("is_solo_parent")?,
        is_migrant: row.try_get("is_migrant")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_write_error(resident_id: Uuid, err: sqlx::Error) -> StoreError {
    match classify_db_error(&err) {
        RetryDisposition::Retryable => StoreError::Conflict(resident_id),
        RetryDisposition::NonRetryable => StoreError::Database(err),
    }
}

const SELECT_RESIDENT_COLUMNS: &str = r#"
    SELECT id, first_name, last_name, barangay_code, birthdate,
           education_attainment, education_status, employment_status,
           ethnicity, created_at, updated_at
      FROM residents
"#;

async fn upsert_sectoral_stmt<'e, E>(executor: E, record: &SectoralRecord) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO sectoral_information (
            resident_id,
            is_out_of_school_children,
            is_out_of_school_youth,
            is_senior_citizen,
            is_labor_force_employed,
            is_unemployed,
            is_indigenous_people,
            is_registered_senior_citizen,
            is_person_with_disability,
            is_overseas_filipino_worker,
            is_solo_parent,
            is_migrant,
            created_at,
            updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (resident_id) DO UPDATE SET
            is_out_of_school_children = EXCLUDED.is_out_of_school_children,
            is_out_of_school_youth = EXCLUDED.is_out_of_school_youth,
            is_senior_citizen = EXCLUDED.is_senior_citizen,
            is_labor_force_employed = EXCLUDED.is_labor_force_employed,
            is_unemployed = EXCLUDED.is_unemployed,
            is_indigenous_people = EXCLUDED.is_indigenous_people,
            is_registered_senior_citizen = EXCLUDED.is_registered_senior_citizen,
            is_person_with_disability = EXCLUDED.is_person_with_disability,
            is_overseas_filipino_worker = EXCLUDED.is_overseas_filipino_worker,
            is_solo_parent = EXCLUDED.is_solo_parent,
            is_migrant = EXCLUDED.is_migrant,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(record.resident_id)
    .bind(record.is_out_of_school_children)
    .bind(record.is_out_of_school_youth)
    .bind(record.is_senior_citizen)
    .bind(record.is_labor_force_employed)
    .bind(record.is_unemployed)
    .bind(record.is_indigenous_people)
    .bind(record.is_registered_senior_citizen)
    .bind(record.is_person_with_disability)
    .bind(record.is_overseas_filipino_worker)
    .bind(record.is_solo_parent)
    .bind(record.is_migrant)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl RegistryStore for PgRegistry {
    async fn fetch_resident(&self, resident_id: Uuid) -> Result<Option<Resident>, StoreError> {
        let sql = format!("{SELECT_RESIDENT_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(resident_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(resident_from_row).transpose().map_err(StoreError::from)
    }

    async fn fetch_sectoral(
        &self,
        resident_id: Uuid,
    ) -> Result<Option<SectoralRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT resident_id,
                   is_out_of_school_children, is_out_of_school_youth,
                   is_senior_citizen, is_labor_force_employed, is_unemployed,
                   is_indigenous_people, is_registered_senior_citizen,
                   is_person_with_disability, is_overseas_filipino_worker,
                   is_solo_parent, is_migrant,
                   created_at, updated_at
              FROM sectoral_information
             WHERE resident_id = $1
            "#,
        )
        .bind(resident_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(sectoral_from_row).transpose().map_err(StoreError::from)
    }

    async fn insert_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO residents (
                id, first_name, last_name, barangay_code, birthdate,
                education_attainment, education_status, employment_status,
                ethnicity, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(resident.id)
        .bind(&resident.first_name)
        .bind(&resident.last_name)
        .bind(&resident.barangay_code)
        .bind(resident.birthdate)
        .bind(resident.education_attainment.map(|v| v.to_string()))
        .bind(resident.education_status.map(|v| v.to_string()))
        .bind(resident.employment_status.map(|v| v.to_string()))
        .bind(&resident.ethnicity)
        .bind(resident.created_at)
        .bind(resident.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(resident.id, e))?;

        upsert_sectoral_stmt(&mut *tx, sectoral)
            .await
            .map_err(|e| map_write_error(resident.id, e))?;

        tx.commit().await.map_err(|e| map_write_error(resident.id, e))?;
        Ok(())
    }

    async fn update_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE residents
               SET first_name = $2,
                   last_name = $3,
                   barangay_code = $4,
                   birthdate = $5,
                   education_attainment = $6,
                   education_status = $7,
                   employment_status = $8,
                   ethnicity = $9,
                   updated_at = $10
             WHERE id = $1
            "#,
        )
        .bind(resident.id)
        .bind(&resident.first_name)
        .bind(&resident.last_name)
        .bind(&resident.barangay_code)
        .bind(resident.birthdate)
        .bind(resident.education_attainment.map(|v| v.to_string()))
        .bind(resident.education_status.map(|v| v.to_string()))
        .bind(resident.employment_status.map(|v| v.to_string()))
        .bind(&resident.ethnicity)
        .bind(resident.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(resident.id, e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ResidentNotFound(resident.id));
        }

        upsert_sectoral_stmt(&mut *tx, sectoral)
            .await
            .map_err(|e| map_write_error(resident.id, e))?;

        tx.commit().await.map_err(|e| map_write_error(resident.id, e))?;
        Ok(())
    }

    async fn delete_resident(&self, resident_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM residents WHERE id = $1")
            .bind(resident_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_sectoral(&self, record: &SectoralRecord) -> Result<(), StoreError> {
        upsert_sectoral_stmt(&self.pool, record)
            .await
            .map_err(|e| map_write_error(record.resident_id, e))
    }

    async fn list_residents(&self, offset: i64, limit: i64) -> Result<Vec<Resident>, StoreError> {
        let sql = format!(
            "{SELECT_RESIDENT_COLUMNS} ORDER BY last_name, first_name, id LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| resident_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn list_residents_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Resident>, StoreError> {
        let sql = format!(
            "{SELECT_RESIDENT_COLUMNS} WHERE $1::uuid IS NULL OR id > $1 ORDER BY id LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| resident_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn count_residents(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM residents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn sectoral_counts(&self) -> Result<Vec<BarangaySectoralCounts>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT r.barangay_code,
                   COUNT(*) AS residents,
                   COUNT(*) FILTER (WHERE s.is_out_of_school_children) AS out_of_school_children,
                   COUNT(*) FILTER (WHERE s.is_out_of_school_youth) AS out_of_school_youth,
                   COUNT(*) FILTER (WHERE s.is_senior_citizen) AS senior_citizens,
                   COUNT(*) FILTER (WHERE s.is_labor_force_employed) AS labor_force_employed,
                   COUNT(*) FILTER (WHERE s.is_unemployed) AS unemployed,
                   COUNT(*) FILTER (WHERE s.is_indigenous_people) AS indigenous_people,
                   COUNT(*) FILTER (WHERE s.is_registered_senior_citizen) AS registered_senior_citizens,
                   COUNT(*) FILTER (WHERE s.is_person_with_disability) AS persons_with_disability,
                   COUNT(*) FILTER (WHERE s.is_overseas_filipino_worker) AS overseas_filipino_workers,
                   COUNT(*) FILTER (WHERE s.is_solo_parent) AS solo_parents,
                   COUNT(*) FILTER (WHERE s.is_migrant) AS migrants
              FROM residents r
              LEFT JOIN sectoral_information s ON s.resident_id = r.id
             GROUP BY r.barangay_code
             ORDER BY r.barangay_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(BarangaySectoralCounts {
                barangay_code: row.try_get("barangay_code")?,
                residents: row.try_get("residents")?,
                out_of_school_children: row.try_get("out_of_school_children")?,
                out_of_school_youth: row.try_get("out_of_school_youth")?,
                senior_citizens: row.try_get("senior_citizens")?,
                labor_force_employed: row.try_get("labor_force_employed")?,
                unemployed: row.try_get("unemployed")?,
                indigenous_people: row.try_get("indigenous_people")?,
                registered_senior_citizens: row.try_get("registered_senior_citizens")?,
                persons_with_disability: row.try_get("persons_with_disability")?,
                overseas_filipino_workers: row.try_get("overseas_filipino_workers")?,
                solo_parents: row.try_get("solo_parents")?,
                migrants: row.try_get("migrants")?,
            });
        }
        Ok(out)
    }
}

/// In-memory registry mirroring the PostgreSQL semantics closely enough for
/// engine and handler tests: pair-writes are atomic under one lock, replaces
/// keep the original `created_at`, and listings use the same orderings.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    residents: HashMap<Uuid, Resident>,
    sectoral: HashMap<Uuid, SectoralRecord>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn fetch_resident(&self, resident_id: Uuid) -> Result<Option<Resident>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.residents.get(&resident_id).cloned())
    }

    async fn fetch_sectoral(
        &self,
        resident_id: Uuid,
    ) -> Result<Option<SectoralRecord>, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.sectoral.get(&resident_id).cloned())
    }

    async fn insert_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        state.residents.insert(resident.id, resident.clone());
        state.sectoral.insert(resident.id, sectoral.clone());
        Ok(())
    }

    async fn update_resident(
        &self,
        resident: &Resident,
        sectoral: &SectoralRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let Some(existing) = state.residents.get(&resident.id) else {
            return Err(StoreError::ResidentNotFound(resident.id));
        };
        let mut stored = resident.clone();
        stored.created_at = existing.created_at;
        state.residents.insert(resident.id, stored);

        let mut row = sectoral.clone();
        if let Some(existing) = state.sectoral.get(&sectoral.resident_id) {
            row.created_at = existing.created_at;
        }
        state.sectoral.insert(sectoral.resident_id, row);
        Ok(())
    }

    async fn delete_resident(&self, resident_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.inner.lock().await;
        let existed = state.residents.remove(&resident_id).is_some();
        state.sectoral.remove(&resident_id);
        Ok(existed)
    }

    async fn upsert_sectoral(&self, record: &SectoralRecord) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let mut row = record.clone();
        if let Some(existing) = state.sectoral.get(&record.resident_id) {
            row.created_at = existing.created_at;
        }
        state.sectoral.insert(record.resident_id, row);
        Ok(())
    }

    async fn list_residents(&self, offset: i64, limit: i64) -> Result<Vec<Resident>, StoreError> {
        let state = self.inner.lock().await;
        let mut residents: Vec<Resident> = state.residents.values().cloned().collect();
        residents.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str(), a.id)
                .cmp(&(b.last_name.as_str(), b.first_name.as_str(), b.id))
        });
        Ok(residents
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_residents_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Resident>, StoreError> {
        let state = self.inner.lock().await;
        let mut residents: Vec<Resident> = state.residents.values().cloned().collect();
        residents.sort_by_key(|r| r.id);
        Ok(residents
            .into_iter()
            .filter(|r| after.map_or(true, |cursor| r.id > cursor))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_residents(&self) -> Result<i64, StoreError> {
        let state = self.inner.lock().await;
        Ok(state.residents.len() as i64)
    }

    async fn sectoral_counts(&self) -> Result<Vec<BarangaySectoralCounts>, StoreError> {
        let state = self.inner.lock().await;
        let mut by_barangay: BTreeMap<String, BarangaySectoralCounts> = BTreeMap::new();
        for resident in state.residents.values() {
            let counts = by_barangay
                .entry(resident.barangay_code.clone())
                .or_insert_with(|| BarangaySectoralCounts::new(resident.barangay_code.clone()));
            match state.sectoral.get(&resident.id) {
                Some(record) => counts.absorb(record),
                None => counts.residents += 1,
            }
        }
        Ok(by_barangay.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use citizenly_core::EmploymentStatus;

    fn mk_resident(first: &str, last: &str, barangay: &str) -> Resident {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        Resident {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            barangay_code: barangay.to_string(),
            birthdate: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            education_attainment: None,
            education_status: None,
            employment_status: Some(EmploymentStatus::Employed),
            ethnicity: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn mk_sectoral(resident_id: Uuid) -> SectoralRecord {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let mut record = SectoralRecord::new(resident_id, now);
        record.is_labor_force_employed = true;
        record
    }

    #[test]
    fn backoff_delays_double_and_cap() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn non_database_errors_are_not_retryable() {
        assert_eq!(
            classify_db_error(&sqlx::Error::RowNotFound),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_db_error(&sqlx::Error::PoolTimedOut),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn enum_columns_fail_open_to_none() {
        assert_eq!(
            parse_enum::<EmploymentStatus>(Some("self_employed".to_string())),
            Some(EmploymentStatus::SelfEmployed)
        );
        assert_eq!(
            parse_enum::<EmploymentStatus>(Some("astronaut".to_string())),
            None
        );
        assert_eq!(parse_enum::<EmploymentStatus>(None), None);
    }

    #[tokio::test]
    async fn memory_registry_inserts_and_fetches_pairs() {
        let store = MemoryRegistry::new();
        let resident = mk_resident("Maria", "Santos", "BRGY-001");
        let sectoral = mk_sectoral(resident.id);
        store.insert_resident(&resident, &sectoral).await.unwrap();

        let fetched = store.fetch_resident(resident.id).await.unwrap().unwrap();
        assert_eq!(fetched, resident);
        let flags = store.fetch_sectoral(resident.id).await.unwrap().unwrap();
        assert!(flags.is_labor_force_employed);
        assert_eq!(store.count_residents().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_registry_rejects_update_of_unknown_resident() {
        let store = MemoryRegistry::new();
        let resident = mk_resident("Jose", "Reyes", "BRGY-001");
        let sectoral = mk_sectoral(resident.id);
        let err = store.update_resident(&resident, &sectoral).await.unwrap_err();
        assert!(matches!(err, StoreError::ResidentNotFound(id) if id == resident.id));
    }

    #[tokio::test]
    async fn memory_registry_delete_removes_both_rows() {
        let store = MemoryRegistry::new();
        let resident = mk_resident("Ana", "Cruz", "BRGY-002");
        store
            .insert_resident(&resident, &mk_sectoral(resident.id))
            .await
            .unwrap();
        assert!(store.delete_resident(resident.id).await.unwrap());
        assert!(store.fetch_resident(resident.id).await.unwrap().is_none());
        assert!(store.fetch_sectoral(resident.id).await.unwrap().is_none());
        assert!(!store.delete_resident(resident.id).await.unwrap());
    }

    #[tokio::test]
    async fn sectoral_replace_keeps_original_created_at() {
        let store = MemoryRegistry::new();
        let resident = mk_resident("Lita", "Garcia", "BRGY-002");
        let first = mk_sectoral(resident.id);
        store.insert_resident(&resident, &first).await.unwrap();

        let mut second = first.clone();
        second.is_unemployed = true;
        second.created_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        second.updated_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        store.upsert_sectoral(&second).await.unwrap();

        let stored = store.fetch_sectoral(resident.id).await.unwrap().unwrap();
        assert!(stored.is_unemployed);
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn keyset_pagination_walks_every_resident_once() {
        let store = MemoryRegistry::new();
        for i in 0..5 {
            let resident = mk_resident(&format!("R{i}"), "Lopez", "BRGY-003");
            store
                .insert_resident(&resident, &mk_sectoral(resident.id))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = store.list_residents_after(cursor, 2).await.unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|r| r.id);
            seen.extend(page.into_iter().map(|r| r.id));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn name_ordered_listing_pages_deterministically() {
        let store = MemoryRegistry::new();
        for (first, last) in [("Ben", "Uy"), ("Ana", "Uy"), ("Carla", "Abad")] {
            let resident = mk_resident(first, last, "BRGY-004");
            store
                .insert_resident(&resident, &mk_sectoral(resident.id))
                .await
                .unwrap();
        }
        let page = store.list_residents(0, 2).await.unwrap();
        let names: Vec<_> = page
            .iter()
            .map(|r| format!("{} {}", r.first_name, r.last_name))
            .collect();
        assert_eq!(names, vec!["Carla Abad", "Ana Uy"]);
        let rest = store.list_residents(2, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].first_name, "Ben");
    }

    #[tokio::test]
    async fn counts_group_by_barangay_and_include_rowless_residents() {
        let store = MemoryRegistry::new();
        let a1 = mk_resident("Maria", "Santos", "BRGY-A");
        let a2 = mk_resident("Jose", "Reyes", "BRGY-A");
        let b1 = mk_resident("Ana", "Cruz", "BRGY-B");
        store.insert_resident(&a1, &mk_sectoral(a1.id)).await.unwrap();
        store.insert_resident(&b1, &mk_sectoral(b1.id)).await.unwrap();
        // Simulate a resident whose flags row has not been created yet.
        {
            let mut state = store.inner.lock().await;
            state.residents.insert(a2.id, a2.clone());
        }

        let counts = store.sectoral_counts().await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].barangay_code, "BRGY-A");
        assert_eq!(counts[0].residents, 2);
        assert_eq!(counts[0].labor_force_employed, 1);
        assert_eq!(counts[1].barangay_code, "BRGY-B");
        assert_eq!(counts[1].residents, 1);
    }
}
