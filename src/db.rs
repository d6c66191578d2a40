use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::Transaction;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;
use tracing::info;
use tracing::instrument;

use crate::bot::ports::Storage;
use crate::models::CityRow;
use crate::models::ClinicRow;
use crate::models::NewReview;
use crate::models::ReviewRow;
use crate::models::ReviewStatus;
use crate::models::ScheduleRow;
use crate::models::SpecializationRow;
use crate::models::StatsRow;
use crate::models::UserRow;
use crate::models::VetCard;
use crate::models::VetRow;
use crate::reference::CityRecord;
use crate::reference::ClinicRecord;
use crate::reference::ReferenceData;
use crate::reference::ReferenceRows;
use crate::reference::ScheduleRecord;
use crate::reference::SpecializationRecord;
use crate::reference::VetRecord;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const REVIEW_SELECT: &str = r#"
  SELECT
    r.id,
    r.vet_id,
    v.full_name AS vet_name,
    r.user_id,
    COALESCE(u.username, u.first_name) AS author,
    r.rating,
    r.comment,
    r.status,
    r.created_at,
    r.moderated_by,
    r.moderated_at
  FROM reviews r
  JOIN vets v ON v.id = r.vet_id
  JOIN users u ON u.id = r.user_id
"#;

const CLINIC_SELECT: &str = r#"
  SELECT c.id, c.city_id, ci.name AS city_name, c.name, c.address, c.phone
  FROM clinics c
  JOIN cities ci ON ci.id = c.city_id
"#;

#[derive(Clone)]
pub struct Db {
  pool: Pool<Postgres>,
}

impl Db {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }

  async fn list_vets(&self, sql: &str, key: i64) -> Result<Vec<VetRow>> {
    let rows = sqlx::query(sql).bind(key).fetch_all(&self.pool).await?;
    rows.iter().map(vet_from_row).collect()
  }
}

fn vet_from_row(row: &PgRow) -> Result<VetRow> {
  Ok(VetRow {
    id: row.try_get("id")?,
    full_name: row.try_get("full_name")?,
    description: row.try_get("description")?,
  })
}

fn clinic_from_row(row: &PgRow) -> Result<ClinicRow> {
  Ok(ClinicRow {
    id: row.try_get("id")?,
    city_id: row.try_get("city_id")?,
    city_name: row.try_get("city_name")?,
    name: row.try_get("name")?,
    address: row.try_get("address")?,
    phone: row.try_get("phone")?,
  })
}

fn review_from_row(row: &PgRow) -> Result<ReviewRow> {
  let status: String = row.try_get("status")?;
  Ok(ReviewRow {
    id: row.try_get("id")?,
    vet_id: row.try_get("vet_id")?,
    vet_name: row.try_get("vet_name")?,
    user_id: row.try_get("user_id")?,
    author: row.try_get("author")?,
    rating: row.try_get("rating")?,
    comment: row.try_get("comment")?,
    status: status.parse::<ReviewStatus>()?,
    created_at: row.try_get("created_at")?,
    moderated_by: row.try_get("moderated_by")?,
    moderated_at: row.try_get("moderated_at")?,
  })
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduleRow> {
  Ok(ScheduleRow {
    clinic_id: row.try_get("clinic_id")?,
    clinic_name: row.try_get("clinic_name")?,
    weekday: row.try_get("weekday")?,
  })
}

fn city_from_row(row: &PgRow) -> Result<CityRow> {
  Ok(CityRow {
    id: row.try_get("id")?,
    name: row.try_get("name")?,
  })
}

fn specialization_from_row(row: &PgRow) -> Result<SpecializationRow> {
  Ok(SpecializationRow {
    id: row.try_get("id")?,
    name: row.try_get("name")?,
  })
}

fn clinic_record_from_row(row: &PgRow) -> Result<ClinicRecord> {
  Ok(ClinicRecord {
    id: row.try_get("id")?,
    city_id: row.try_get("city_id")?,
    name: row.try_get("name")?,
    address: row.try_get("address")?,
    phone: row.try_get("phone")?,
  })
}

fn vet_record_from_row(row: &PgRow) -> Result<VetRecord> {
  Ok(VetRecord {
    id: row.try_get("id")?,
    full_name: row.try_get("full_name")?,
    description: row.try_get("description")?,
    specializations: row.try_get("specializations")?,
  })
}

fn schedule_record_from_row(row: &PgRow) -> Result<ScheduleRecord> {
  Ok(ScheduleRecord {
    vet_id: row.try_get("vet_id")?,
    clinic_id: row.try_get("clinic_id")?,
    weekday: row.try_get("weekday")?,
  })
}

// Rows imported with explicit ids leave the BIGSERIAL behind; move it past the highest id.
async fn sync_id_sequence(tx: &mut Transaction<'_, Postgres>, table: &str) -> Result<()> {
  let sql = format!("SELECT setval(pg_get_serial_sequence('{table}', 'id'), GREATEST((SELECT MAX(id) FROM {table}), 1))");
  sqlx::query(&sql).execute(&mut **tx).await?;
  Ok(())
}

async fn import_cities(tx: &mut Transaction<'_, Postgres>, rows: &[CityRecord]) -> Result<()> {
  for row in rows {
    sqlx::query(r#"INSERT INTO cities (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"#)
      .bind(row.id)
      .bind(&row.name)
      .execute(&mut **tx)
      .await
      .with_context(|| format!("failed to import city {}", row.id))?;
  }
  sync_id_sequence(tx, "cities").await
}

async fn import_specializations(tx: &mut Transaction<'_, Postgres>, rows: &[SpecializationRecord]) -> Result<()> {
  for row in rows {
    sqlx::query(
      r#"INSERT INTO specializations (id, name) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"#,
    )
    .bind(row.id)
    .bind(&row.name)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to import specialization {}", row.id))?;
  }
  sync_id_sequence(tx, "specializations").await
}

async fn import_clinics(tx: &mut Transaction<'_, Postgres>, rows: &[ClinicRecord]) -> Result<()> {
  for row in rows {
    sqlx::query(
      r#"
      INSERT INTO clinics (id, city_id, name, address, phone)
      VALUES ($1, $2, $3, $4, $5)
      ON CONFLICT (id) DO UPDATE SET
        city_id = EXCLUDED.city_id,
        name = EXCLUDED.name,
        address = EXCLUDED.address,
        phone = EXCLUDED.phone
      "#,
    )
    .bind(row.id)
    .bind(row.city_id)
    .bind(&row.name)
    .bind(&row.address)
    .bind(&row.phone)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to import clinic {}", row.id))?;
  }
  sync_id_sequence(tx, "clinics").await
}

async fn import_vets(tx: &mut Transaction<'_, Postgres>, rows: &[VetRecord]) -> Result<()> {
  for row in rows {
    let specialization_ids = row.specialization_ids().map_err(anyhow::Error::msg)?;
    sqlx::query(
      r#"
      INSERT INTO vets (id, full_name, description)
      VALUES ($1, $2, $3)
      ON CONFLICT (id) DO UPDATE SET
        full_name = EXCLUDED.full_name,
        description = EXCLUDED.description
      "#,
    )
    .bind(row.id)
    .bind(&row.full_name)
    .bind(&row.description)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to import vet {}", row.id))?;

    sqlx::query(r#"DELETE FROM vet_specializations WHERE vet_id = $1"#)
      .bind(row.id)
      .execute(&mut **tx)
      .await?;
    for specialization_id in specialization_ids {
      sqlx::query(
        r#"
        INSERT INTO vet_specializations (vet_id, specialization_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
      )
      .bind(row.id)
      .bind(specialization_id)
      .execute(&mut **tx)
      .await
      .with_context(|| format!("vet {} references unknown specialization {specialization_id}", row.id))?;
    }
  }
  sync_id_sequence(tx, "vets").await
}

async fn import_schedules(tx: &mut Transaction<'_, Postgres>, rows: &[ScheduleRecord]) -> Result<()> {
  let mut vet_ids: Vec<i64> = rows.iter().map(|row| row.vet_id).collect();
  vet_ids.sort_unstable();
  vet_ids.dedup();
  sqlx::query(r#"DELETE FROM vet_schedules WHERE vet_id = ANY($1)"#)
    .bind(&vet_ids)
    .execute(&mut **tx)
    .await?;
  for row in rows {
    sqlx::query(
      r#"
      INSERT INTO vet_schedules (vet_id, clinic_id, weekday)
      VALUES ($1, $2, $3)
      ON CONFLICT DO NOTHING
      "#,
    )
    .bind(row.vet_id)
    .bind(row.clinic_id)
    .bind(row.weekday)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("failed to import schedule of vet {} at clinic {}", row.vet_id, row.clinic_id))?;
  }
  Ok(())
}

#[async_trait]
impl Storage for Db {
  #[instrument(skip(self))]
  async fn upsert_user(
    &self,
    platform_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()> {
    sqlx::query(
      r#"
      INSERT INTO users (platform_id, username, first_name, last_name)
      VALUES ($1, $2, $3, $4)
      ON CONFLICT (platform_id) DO UPDATE SET
        username = EXCLUDED.username,
        first_name = EXCLUDED.first_name,
        last_name = EXCLUDED.last_name
      "#,
    )
    .bind(platform_id)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  async fn find_user_by_platform_id(&self, platform_id: i64) -> Result<Option<UserRow>> {
    let Some(row) = sqlx::query(
      r#"
      SELECT id, platform_id, username, first_name, last_name, created_at
      FROM users
      WHERE platform_id = $1
      "#,
    )
    .bind(platform_id)
    .fetch_optional(&self.pool)
    .await?
    else {
      return Ok(None);
    };
    Ok(Some(UserRow {
      id: row.try_get("id")?,
      platform_id: row.try_get("platform_id")?,
      username: row.try_get("username")?,
      first_name: row.try_get("first_name")?,
      last_name: row.try_get("last_name")?,
      created_at: row.try_get("created_at")?,
    }))
  }

  #[instrument(skip(self))]
  async fn list_specializations(&self) -> Result<Vec<SpecializationRow>> {
    let rows = sqlx::query(r#"SELECT id, name FROM specializations ORDER BY name COLLATE "C""#)
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(specialization_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn list_cities(&self) -> Result<Vec<CityRow>> {
    let rows = sqlx::query(r#"SELECT id, name FROM cities ORDER BY name COLLATE "C""#)
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(city_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn list_clinics(&self, city_id: Option<i64>) -> Result<Vec<ClinicRow>> {
    let sql = format!("{CLINIC_SELECT} WHERE ($1::BIGINT IS NULL OR c.city_id = $1) ORDER BY c.name");
    let rows = sqlx::query(&sql).bind(city_id).fetch_all(&self.pool).await?;
    rows.iter().map(clinic_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn get_clinic(&self, clinic_id: i64) -> Result<Option<ClinicRow>> {
    let sql = format!("{CLINIC_SELECT} WHERE c.id = $1");
    let row = sqlx::query(&sql).bind(clinic_id).fetch_optional(&self.pool).await?;
    row.as_ref().map(clinic_from_row).transpose()
  }

  #[instrument(skip(self))]
  async fn list_vets_by_specialization(&self, specialization_id: i64) -> Result<Vec<VetRow>> {
    self
      .list_vets(
        r#"
        SELECT v.id, v.full_name, v.description
        FROM vets v
        JOIN vet_specializations vs ON vs.vet_id = v.id
        WHERE vs.specialization_id = $1
        ORDER BY v.full_name
        "#,
        specialization_id,
      )
      .await
  }

  #[instrument(skip(self))]
  async fn list_vets_by_clinic(&self, clinic_id: i64) -> Result<Vec<VetRow>> {
    self
      .list_vets(
        r#"
        SELECT DISTINCT v.id, v.full_name, v.description
        FROM vets v
        JOIN vet_schedules s ON s.vet_id = v.id
        WHERE s.clinic_id = $1
        ORDER BY v.full_name
        "#,
        clinic_id,
      )
      .await
  }

  #[instrument(skip(self))]
  async fn list_vets_by_weekday(&self, weekday: i16) -> Result<Vec<VetRow>> {
    self
      .list_vets(
        r#"
        SELECT DISTINCT v.id, v.full_name, v.description
        FROM vets v
        JOIN vet_schedules s ON s.vet_id = v.id
        WHERE s.weekday = $1
        ORDER BY v.full_name
        "#,
        i64::from(weekday),
      )
      .await
  }

  #[instrument(skip(self))]
  async fn get_vet_card(&self, vet_id: i64) -> Result<Option<VetCard>> {
    let Some(row) = sqlx::query(r#"SELECT id, full_name, description FROM vets WHERE id = $1"#)
      .bind(vet_id)
      .fetch_optional(&self.pool)
      .await?
    else {
      return Ok(None);
    };
    let vet = vet_from_row(&row)?;

    let specializations = sqlx::query_scalar::<_, String>(
      r#"
      SELECT s.name
      FROM specializations s
      JOIN vet_specializations vs ON vs.specialization_id = s.id
      WHERE vs.vet_id = $1
      ORDER BY s.name
      "#,
    )
    .bind(vet_id)
    .fetch_all(&self.pool)
    .await?;

    let schedule = sqlx::query(
      r#"
      SELECT s.clinic_id, c.name AS clinic_name, s.weekday
      FROM vet_schedules s
      JOIN clinics c ON c.id = s.clinic_id
      WHERE s.vet_id = $1
      ORDER BY s.weekday, c.name
      "#,
    )
    .bind(vet_id)
    .fetch_all(&self.pool)
    .await?
    .iter()
    .map(schedule_from_row)
    .collect::<Result<Vec<_>>>()?;

    let summary = sqlx::query(
      r#"
      SELECT AVG(rating)::FLOAT8 AS average_rating, COUNT(*) AS approved_reviews
      FROM reviews
      WHERE vet_id = $1 AND status = 'approved'
      "#,
    )
    .bind(vet_id)
    .fetch_one(&self.pool)
    .await?;

    Ok(Some(VetCard {
      vet,
      specializations,
      schedule,
      average_rating: summary.try_get("average_rating")?,
      approved_reviews: summary.try_get("approved_reviews")?,
    }))
  }

  #[instrument(skip(self))]
  async fn list_approved_reviews(&self, vet_id: i64, limit: i64) -> Result<Vec<ReviewRow>> {
    let sql = format!("{REVIEW_SELECT} WHERE r.vet_id = $1 AND r.status = 'approved' ORDER BY r.created_at DESC LIMIT $2");
    let rows = sqlx::query(&sql)
      .bind(vet_id)
      .bind(limit)
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(review_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn has_existing_review(&self, user_id: i64, vet_id: i64) -> Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
      r#"SELECT EXISTS (SELECT 1 FROM reviews WHERE user_id = $1 AND vet_id = $2)"#,
    )
    .bind(user_id)
    .bind(vet_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(exists)
  }

  #[instrument(skip(self, review), fields(vet_id = review.vet_id, user_id = review.user_id))]
  async fn create_review(&self, review: NewReview) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
      r#"
      INSERT INTO reviews (vet_id, user_id, rating, comment, status, created_at)
      VALUES ($1, $2, $3, $4, $5, $6)
      RETURNING id
      "#,
    )
    .bind(review.vet_id)
    .bind(review.user_id)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(review.status.as_str())
    .bind(review.created_at)
    .fetch_one(&self.pool)
    .await
    .context("failed to insert review")?;
    Ok(id)
  }

  #[instrument(skip(self))]
  async fn get_review_by_id(&self, review_id: i64) -> Result<Option<ReviewRow>> {
    let sql = format!("{REVIEW_SELECT} WHERE r.id = $1");
    let row = sqlx::query(&sql).bind(review_id).fetch_optional(&self.pool).await?;
    row.as_ref().map(review_from_row).transpose()
  }

  #[instrument(skip(self))]
  async fn list_pending_reviews(&self) -> Result<Vec<ReviewRow>> {
    let sql = format!("{REVIEW_SELECT} WHERE r.status = 'pending' ORDER BY r.created_at, r.id");
    let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
    rows.iter().map(review_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn update_review_status(&self, review_id: i64, status: ReviewStatus, moderator_id: i64) -> Result<bool> {
    let result = sqlx::query(
      r#"
      UPDATE reviews
      SET status = $2, moderated_by = $3, moderated_at = NOW()
      WHERE id = $1 AND status = 'pending'
      "#,
    )
    .bind(review_id)
    .bind(status.as_str())
    .bind(moderator_id)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(skip(self))]
  async fn stats(&self) -> Result<StatsRow> {
    let row = sqlx::query(
      r#"
      SELECT
        (SELECT COUNT(*) FROM users) AS users,
        (SELECT COUNT(*) FROM vets) AS vets,
        (SELECT COUNT(*) FROM clinics) AS clinics,
        (SELECT COUNT(*) FROM reviews WHERE status = 'pending') AS pending_reviews,
        (SELECT COUNT(*) FROM reviews WHERE status = 'approved') AS approved_reviews,
        (SELECT COUNT(*) FROM reviews WHERE status = 'rejected') AS rejected_reviews
      "#,
    )
    .fetch_one(&self.pool)
    .await?;
    Ok(StatsRow {
      users: row.try_get("users")?,
      vets: row.try_get("vets")?,
      clinics: row.try_get("clinics")?,
      pending_reviews: row.try_get("pending_reviews")?,
      approved_reviews: row.try_get("approved_reviews")?,
      rejected_reviews: row.try_get("rejected_reviews")?,
    })
  }

  #[instrument(skip(self))]
  async fn export_reference_data(&self) -> Result<ReferenceData> {
    let cities = sqlx::query(r#"SELECT id, name FROM cities ORDER BY id"#)
      .fetch_all(&self.pool)
      .await?
      .iter()
      .map(|row| city_from_row(row).map(|city| CityRecord { id: city.id, name: city.name }))
      .collect::<Result<Vec<_>>>()?;

    let specializations = sqlx::query(r#"SELECT id, name FROM specializations ORDER BY id"#)
      .fetch_all(&self.pool)
      .await?
      .iter()
      .map(|row| specialization_from_row(row).map(|spec| SpecializationRecord { id: spec.id, name: spec.name }))
      .collect::<Result<Vec<_>>>()?;

    let clinics = sqlx::query(r#"SELECT id, city_id, name, address, phone FROM clinics ORDER BY id"#)
      .fetch_all(&self.pool)
      .await?
      .iter()
      .map(clinic_record_from_row)
      .collect::<Result<Vec<_>>>()?;

    let vets = sqlx::query(
      r#"
      SELECT
        v.id,
        v.full_name,
        v.description,
        COALESCE(string_agg(vs.specialization_id::TEXT, ';' ORDER BY vs.specialization_id), '') AS specializations
      FROM vets v
      LEFT JOIN vet_specializations vs ON vs.vet_id = v.id
      GROUP BY v.id
      ORDER BY v.id
      "#,
    )
    .fetch_all(&self.pool)
    .await?
    .iter()
    .map(vet_record_from_row)
    .collect::<Result<Vec<_>>>()?;

    let schedules = sqlx::query(r#"SELECT vet_id, clinic_id, weekday FROM vet_schedules ORDER BY vet_id, weekday, clinic_id"#)
      .fetch_all(&self.pool)
      .await?
      .iter()
      .map(schedule_record_from_row)
      .collect::<Result<Vec<_>>>()?;

    Ok(ReferenceData {
      cities,
      specializations,
      clinics,
      vets,
      schedules,
    })
  }

  #[instrument(skip(self, rows), fields(table = %rows.table(), count = rows.len()))]
  async fn import_reference_rows(&self, rows: ReferenceRows) -> Result<usize> {
    let mut tx = self.pool.begin().await?;
    match &rows {
      ReferenceRows::Cities(records) => import_cities(&mut tx, records).await?,
      ReferenceRows::Specializations(records) => import_specializations(&mut tx, records).await?,
      ReferenceRows::Clinics(records) => import_clinics(&mut tx, records).await?,
      ReferenceRows::Vets(records) => import_vets(&mut tx, records).await?,
      ReferenceRows::Schedules(records) => import_schedules(&mut tx, records).await?,
    }
    tx.commit().await?;
    info!("reference rows imported");
    Ok(rows.len())
  }
}
