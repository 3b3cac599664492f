//! The production [`Store`] implementation, backed by PostgreSQL via
//! `sqlx`. Every operation is a single short transaction; none hold the
//! connection across remote I/O (§5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetq_core::{AuthType, Host, Job, JobPatch, JobStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{Store, StoreError};

/// Connects to Postgres and runs [`ensure_schema`].
pub async fn connect(database_url: &str) -> Result<PgStore, StoreError> {
    let pool = PgPool::connect(database_url)
        .await
        .map_err(|err| StoreError::Unavailable(err.to_string()))?;
    let store = PgStore { pool };
    store.ensure_schema().await?;
    Ok(store)
}

/// A `Store` backed by a pooled Postgres connection.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool (used by callers that already manage
    /// connection lifecycle, e.g. integration tests against a test
    /// database).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `jobs` and `hosts` tables and their indexes if absent.
    /// Idempotent, safe to call on every startup.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id             UUID PRIMARY KEY,
                name           TEXT NOT NULL UNIQUE,
                hostname       TEXT NOT NULL,
                port           INTEGER NOT NULL DEFAULT 22,
                "user"         TEXT NOT NULL,
                auth_type      TEXT NOT NULL,
                password       TEXT,
                private_key    TEXT,
                pem_file_url   TEXT,
                is_active      BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id               UUID PRIMARY KEY,
                command          TEXT NOT NULL,
                args             TEXT,
                original_script  TEXT,
                shell            TEXT,
                server_id        UUID NOT NULL REFERENCES hosts(id),
                timeout_seconds  BIGINT NOT NULL,
                priority         INTEGER NOT NULL,
                status           TEXT NOT NULL,
                exit_code        INTEGER,
                stdout           TEXT NOT NULL DEFAULT '',
                stderr           TEXT NOT NULL DEFAULT '',
                error            TEXT,
                created_at       TIMESTAMPTZ NOT NULL,
                started_at       TIMESTAMPTZ,
                finished_at      TIMESTAMPTZ,
                updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        for stmt in [
            "CREATE INDEX IF NOT EXISTS jobs_status_idx ON jobs(status)",
            "CREATE INDEX IF NOT EXISTS jobs_server_id_idx ON jobs(server_id)",
            "CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs(created_at)",
            "CREATE INDEX IF NOT EXISTS jobs_priority_idx ON jobs(priority)",
        ] {
            sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    tracing::warn!(error = %err, "postgres operation failed");
    StoreError::Unavailable(err.to_string())
}

fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Canceled => "canceled",
    }
}

fn status_from_str(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        "canceled" => JobStatus::Canceled,
        _ => JobStatus::Queued,
    }
}

fn auth_type_to_str(auth_type: AuthType) -> &'static str {
    match auth_type {
        AuthType::Password => "password",
        AuthType::Key => "key",
    }
}

fn auth_type_from_str(s: &str) -> AuthType {
    match s {
        "key" => AuthType::Key,
        _ => AuthType::Password,
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Job {
    Job {
        id: row.get("id"),
        command: row.get("command"),
        args: row.get("args"),
        original_script: row.get("original_script"),
        shell: row.get("shell"),
        server_id: row.get("server_id"),
        timeout_seconds: row.get("timeout_seconds"),
        priority: row.get("priority"),
        status: status_from_str(row.get::<String, _>("status").as_str()),
        exit_code: row.get("exit_code"),
        stdout: row.get("stdout"),
        stderr: row.get("stderr"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    }
}

fn host_from_row(row: &sqlx::postgres::PgRow) -> Host {
    let port: i32 = row.get("port");
    Host {
        id: row.get("id"),
        name: row.get("name"),
        hostname: row.get("hostname"),
        port: port as u16,
        user: row.get("user"),
        auth_type: auth_type_from_str(row.get::<String, _>("auth_type").as_str()),
        password: row.get("password"),
        private_key: row.get("private_key"),
        pem_file_url: row.get("pem_file_url"),
        is_active: row.get("is_active"),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs
                (id, command, args, original_script, shell, server_id, timeout_seconds,
                 priority, status, exit_code, stdout, stderr, error,
                 created_at, started_at, finished_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now())
            "#,
        )
        .bind(job.id)
        .bind(&job.command)
        .bind(&job.args)
        .bind(&job.original_script)
        .bind(&job.shell)
        .bind(job.server_id)
        .bind(job.timeout_seconds)
        .bind(job.priority)
        .bind(status_to_str(job.status))
        .bind(job.exit_code)
        .bind(&job.stdout)
        .bind(&job.stderr)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::JobNotFound(id))?;
        Ok(job_from_row(&row))
    }

    async fn update_job(&self, id: Uuid, patch: JobPatch) -> Result<(), StoreError> {
        // A single short UPDATE per call; unspecified fields keep their
        // current value via `COALESCE`-free `column = column` defaults.
        let status = patch.status.map(status_to_str);
        let exit_code: Option<Option<i32>> = patch.exit_code;
        let stdout = patch.stdout;
        let stderr = patch.stderr;
        let error: Option<Option<String>> = patch.error;
        let started_at: Option<DateTime<Utc>> = patch.started_at;
        let finished_at: Option<DateTime<Utc>> = patch.finished_at;

        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status      = COALESCE($2, status),
                exit_code   = CASE WHEN $3 THEN $4 ELSE exit_code END,
                stdout      = COALESCE($5, stdout),
                stderr      = COALESCE($6, stderr),
                error       = CASE WHEN $7 THEN $8 ELSE error END,
                started_at  = COALESCE($9, started_at),
                finished_at = COALESCE($10, finished_at),
                updated_at  = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(exit_code.is_some())
        .bind(exit_code.flatten())
        .bind(stdout)
        .bind(stderr)
        .bind(error.is_some())
        .bind(error.flatten())
        .bind(started_at)
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn get_host(&self, id: Uuid) -> Result<Host, StoreError> {
        let row = sqlx::query("SELECT * FROM hosts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::HostNotFound(id))?;
        Ok(host_from_row(&row))
    }

    async fn count_jobs_by_status(&self, status: JobStatus, server_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE status = $1 AND server_id = $2")
            .bind(status_to_str(status))
            .bind(server_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.get("n"))
    }

    async fn put_host(&self, host: &Host) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO hosts (id, name, hostname, port, "user", auth_type, password, private_key, pem_file_url, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                hostname = EXCLUDED.hostname,
                port = EXCLUDED.port,
                "user" = EXCLUDED."user",
                auth_type = EXCLUDED.auth_type,
                password = EXCLUDED.password,
                private_key = EXCLUDED.private_key,
                pem_file_url = EXCLUDED.pem_file_url,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(host.id)
        .bind(&host.name)
        .bind(&host.hostname)
        .bind(host.port as i32)
        .bind(&host.user)
        .bind(auth_type_to_str(host.auth_type))
        .bind(&host.password)
        .bind(&host.private_key)
        .bind(&host.pem_file_url)
        .bind(host.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
