use crate::errors::{is_unique_violation, AppError, ResultExt};
use crate::ledger::{self, RETRYABLE_STATUSES};
use crate::models::{FailureEntry, LookupResult, RecordBundle, UserExportRow};
use crate::store::{DuplicatePolicy, FailureFilter, RecordStore, SaveOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

const CHILD_TABLES: [&str; 6] = [
    "user_address",
    "user_demography",
    "user_organization",
    "user_topic",
    "user_model_score",
    "user_profile",
];

const FAILURE_COLUMNS: &str = "failure_log_id, email, initial_status, message, request_id, \
     create_dt, most_recent_retry_dt, most_recent_retry_status, retry_count, retry_complete";

/// Relational storage for enriched identities and the failure ledger.
pub struct SqliteStore {
    pool: SqlitePool,
    duplicate_policy: DuplicatePolicy,
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    failure_log_id: i64,
    email: String,
    initial_status: i64,
    message: String,
    request_id: String,
    create_dt: DateTime<Utc>,
    most_recent_retry_dt: Option<DateTime<Utc>>,
    most_recent_retry_status: Option<i64>,
    retry_count: i64,
    retry_complete: bool,
}

impl From<FailureRow> for FailureEntry {
    fn from(row: FailureRow) -> Self {
        FailureEntry {
            failure_id: row.failure_log_id,
            email: row.email,
            initial_status: status_from_db(row.initial_status),
            message: row.message,
            request_id: row.request_id,
            create_dt: row.create_dt,
            retry_count: row.retry_count,
            most_recent_retry_status: row.most_recent_retry_status.map(status_from_db),
            most_recent_retry_dt: row.most_recent_retry_dt,
            retry_complete: row.retry_complete,
        }
    }
}

fn status_from_db(status: i64) -> u16 {
    u16::try_from(status).unwrap_or_default()
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, duplicate_policy: DuplicatePolicy) -> Self {
        Self {
            pool,
            duplicate_policy,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn insert_identity(
        conn: &mut SqliteConnection,
        bundle: &RecordBundle,
        now: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let identity = &bundle.identity;
        let result = sqlx::query(
            r#"
            INSERT INTO user (email, first_name, last_name, match_likelihood, create_dt)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&identity.email)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.match_likelihood)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Integrity(format!("identity already stored for {}", identity.email))
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn overwrite_identity(
        conn: &mut SqliteConnection,
        user_id: i64,
        bundle: &RecordBundle,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let identity = &bundle.identity;
        sqlx::query(
            r#"
            UPDATE user
            SET first_name = ?, last_name = ?, match_likelihood = ?, update_dt = ?
            WHERE user_id = ?
            "#,
        )
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.match_likelihood)
        .bind(now)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .context("updating identity")?;

        for table in CHILD_TABLES {
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
                .bind(user_id)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("clearing {}", table))?;
        }

        Ok(())
    }

    /// Inserts address, demography and every one-to-many record of the bundle.
    async fn insert_children(
        conn: &mut SqliteConnection,
        user_id: i64,
        bundle: &RecordBundle,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let address = &bundle.address;
        sqlx::query(
            r#"
            INSERT INTO user_address (
                user_id, location_general,
                city_name, city_is_deduced,
                county_name, county_is_deduced,
                state_name, state_code, state_is_deduced,
                country_name, country_code, country_is_deduced,
                continent_name, continent_is_deduced,
                address_likelihood, create_dt
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&address.location_general)
        .bind(&address.city.name)
        .bind(address.city.is_deduced)
        .bind(&address.county.name)
        .bind(address.county.is_deduced)
        .bind(&address.state.name)
        .bind(&address.state.code)
        .bind(address.state.is_deduced)
        .bind(&address.country.name)
        .bind(&address.country.code)
        .bind(address.country.is_deduced)
        .bind(&address.continent.name)
        .bind(address.continent.is_deduced)
        .bind(address.address_likelihood)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("inserting address")?;

        let demography = &bundle.demography;
        sqlx::query(
            r#"
            INSERT INTO user_demography (user_id, gender, age, age_range_min, age_range_max, create_dt)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&demography.gender)
        .bind(demography.age)
        .bind(demography.age_range_min)
        .bind(demography.age_range_max)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("inserting demography")?;

        for org in &bundle.organizations {
            sqlx::query(
                r#"
                INSERT INTO user_organization (
                    user_id, organization_name, title, start_date, end_date,
                    is_current, is_primary, create_dt
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(&org.name)
            .bind(&org.title)
            .bind(&org.start_date)
            .bind(&org.end_date)
            .bind(org.is_current)
            .bind(org.is_primary)
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("inserting organization")?;
        }

        for topic in &bundle.topics {
            sqlx::query(
                "INSERT INTO user_topic (user_id, provider, topic, create_dt) VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(&topic.provider)
            .bind(&topic.topic)
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("inserting topic")?;
        }

        for score in &bundle.scores {
            sqlx::query(
                r#"
                INSERT INTO user_model_score (user_id, provider, type, score_value, create_dt)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(&score.provider)
            .bind(&score.score_type)
            .bind(score.value)
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("inserting score")?;
        }

        for profile in &bundle.profiles {
            sqlx::query(
                r#"
                INSERT INTO user_profile (
                    user_id, profile_type, network_id, network_name, profile_url,
                    profile_id, user_name, user_bio, followers, following, user_feed, create_dt
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user_id)
            .bind(profile.profile_type.as_str())
            .bind(&profile.network_id)
            .bind(&profile.network_name)
            .bind(&profile.profile_url)
            .bind(&profile.profile_id)
            .bind(&profile.user_name)
            .bind(&profile.user_bio)
            .bind(profile.followers)
            .bind(profile.following)
            .bind(&profile.user_feed)
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("inserting profile")?;
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn save(&self, bundle: &RecordBundle) -> Result<SaveOutcome, AppError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing = if self.duplicate_policy == DuplicatePolicy::Fail {
            // Let the unique constraint on email decide.
            None
        } else {
            sqlx::query_as::<_, (i64,)>("SELECT user_id FROM user WHERE email = ? LIMIT 1")
                .bind(bundle.email())
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.0)
        };

        let outcome = match existing {
            None => {
                let user_id = Self::insert_identity(&mut *tx, bundle, now).await?;
                SaveOutcome::Inserted { user_id }
            }
            Some(user_id) if self.duplicate_policy == DuplicatePolicy::Skip => {
                tracing::info!(
                    "Identity for {} already stored (user_id: {}), skipping",
                    bundle.email(),
                    user_id
                );
                return Ok(SaveOutcome::Skipped { user_id });
            }
            Some(user_id) => {
                Self::overwrite_identity(&mut *tx, user_id, bundle, now).await?;
                SaveOutcome::Updated { user_id }
            }
        };

        Self::insert_children(&mut *tx, outcome.user_id(), bundle, now).await?;
        tx.commit().await?;

        tracing::info!(
            "✓ Stored records for {} (user_id: {}, {} organization(s), {} profile(s))",
            bundle.email(),
            outcome.user_id(),
            bundle.organizations.len(),
            bundle.profiles.len()
        );

        Ok(outcome)
    }

    async fn record_failure(
        &self,
        email: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let entry = ledger::open_entry(email, result, Utc::now());

        let inserted = sqlx::query(
            r#"
            INSERT INTO failure_log (
                email, initial_status, message, request_id, create_dt, retry_count, retry_complete
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.email)
        .bind(i64::from(entry.initial_status))
        .bind(&entry.message)
        .bind(&entry.request_id)
        .bind(entry.create_dt)
        .bind(entry.retry_count)
        .bind(entry.retry_complete)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateKey(format!(
                    "ledger entry for {} (request id '{}')",
                    entry.email, entry.request_id
                ))
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        Ok(FailureEntry {
            failure_id: inserted.last_insert_rowid(),
            ..entry
        })
    }

    async fn record_retry(
        &self,
        request_id: &str,
        result: &LookupResult,
    ) -> Result<FailureEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            "SELECT {} FROM failure_log WHERE request_id = ? ORDER BY failure_log_id",
            FAILURE_COLUMNS
        ))
        .bind(request_id)
        .fetch_all(&mut *tx)
        .await
        .context("loading ledger entry")?;

        if rows.is_empty() {
            return Err(AppError::NotFound(format!(
                "no ledger entry with request id '{}'",
                request_id
            )));
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(rows.len());
        for row in rows {
            let mut entry = FailureEntry::from(row);
            ledger::apply_retry(&mut entry, result, now);

            sqlx::query(
                r#"
                UPDATE failure_log
                SET retry_count = ?, most_recent_retry_status = ?,
                    most_recent_retry_dt = ?, retry_complete = ?
                WHERE failure_log_id = ?
                "#,
            )
            .bind(entry.retry_count)
            .bind(entry.most_recent_retry_status.map(i64::from))
            .bind(entry.most_recent_retry_dt)
            .bind(entry.retry_complete)
            .bind(entry.failure_id)
            .execute(&mut *tx)
            .await
            .context("updating ledger entry")?;

            updated.push(entry);
        }

        tx.commit().await?;

        updated
            .pop()
            .ok_or_else(|| AppError::InternalError("ledger update produced no rows".to_string()))
    }

    async fn pending_entries(&self) -> Result<Vec<FailureEntry>, AppError> {
        let retryable = RETRYABLE_STATUSES
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            "SELECT {} FROM failure_log \
             WHERE retry_complete = 0 AND initial_status IN ({}) \
             ORDER BY failure_log_id",
            FAILURE_COLUMNS, retryable
        ))
        .fetch_all(&self.pool)
        .await
        .context("loading pending ledger entries")?;

        Ok(rows.into_iter().map(FailureEntry::from).collect())
    }

    async fn export_users(&self) -> Result<Vec<UserExportRow>, AppError> {
        let rows = sqlx::query_as::<_, UserExportRow>(
            r#"
            SELECT
                u.user_id,
                u.first_name,
                u.last_name,
                u.email,
                (SELECT a.location_general FROM user_address a
                  WHERE a.user_id = u.user_id ORDER BY a.user_address_id LIMIT 1) AS location,
                d.age,
                d.age_range_min,
                d.age_range_max,
                (SELECT s.score_value FROM user_model_score s
                  WHERE s.user_id = u.user_id AND s.provider = 'klout'
                  ORDER BY s.user_model_score_id LIMIT 1) AS klout_score,
                fb.profile_id AS facebook_id,
                fb.user_name AS facebook_username,
                fb.profile_url AS facebook_profile,
                tw.profile_id AS twitter_id,
                tw.user_name AS twitter_screen_name,
                tw.followers AS twitter_followers,
                tw.following AS twitter_following,
                (SELECT w.profile_url FROM user_profile w
                  WHERE w.user_id = u.user_id AND w.profile_type = 'website'
                  ORDER BY w.user_profile_id LIMIT 1) AS website,
                u.create_dt AS scraped_on
            FROM user u
            LEFT JOIN user_demography d ON d.user_demography_id = (
                SELECT MIN(x.user_demography_id) FROM user_demography x WHERE x.user_id = u.user_id
            )
            LEFT JOIN user_profile fb ON fb.user_profile_id = (
                SELECT MIN(p.user_profile_id) FROM user_profile p
                 WHERE p.user_id = u.user_id AND p.profile_type = 'social'
                   AND p.network_name = 'Facebook'
            )
            LEFT JOIN user_profile tw ON tw.user_profile_id = (
                SELECT MIN(p.user_profile_id) FROM user_profile p
                 WHERE p.user_id = u.user_id AND p.profile_type = 'social'
                   AND p.network_name = 'Twitter'
            )
            ORDER BY u.user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("exporting users")?;

        Ok(rows)
    }

    async fn export_failures(&self, filter: FailureFilter) -> Result<Vec<FailureEntry>, AppError> {
        let condition = match filter {
            FailureFilter::All => "",
            FailureFilter::Active => "WHERE retry_complete = 0",
        };

        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            "SELECT {} FROM failure_log {} ORDER BY failure_log_id",
            FAILURE_COLUMNS, condition
        ))
        .fetch_all(&self.pool)
        .await
        .context("exporting ledger")?;

        Ok(rows.into_iter().map(FailureEntry::from).collect())
    }

    async fn close(&self) -> Result<(), AppError> {
        self.pool.close().await;
        tracing::debug!("Closed sqlite pool");
        Ok(())
    }
}
