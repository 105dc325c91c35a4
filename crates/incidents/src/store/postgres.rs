use super::Store;
use crate::StoreResult;
use anyhow::Context;
use chrono::{DateTime, Utc};
use models::{
    AccountId, Event, Id, Incident, IncidentFilter, IncidentState, Resource, ResourceKind,
    TestRun,
};
use sqlx::FromRow;

/// PgStore is the Postgres implementation of `Store`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending schema migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running database migrations")
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[derive(Debug, FromRow)]
struct ResourceRow {
    id: Id,
    owner_id: AccountId,
    name: String,
    url: String,
}

#[derive(Debug, FromRow)]
struct IncidentRow {
    id: Id,
    kind: String,
    resource_id: Id,
    owner_id: Option<AccountId>,
    cause: Option<String>,
    http_status: Option<i32>,
    started_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    last_update_at: DateTime<Utc>,
    screenshot_ref: Option<String>,
}

impl TryFrom<IncidentRow> for Incident {
    type Error = anyhow::Error;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        Ok(Incident {
            id: row.id,
            kind: row.kind.parse()?,
            resource_id: row.resource_id,
            owner_id: row.owner_id,
            cause: row.cause,
            http_status: row
                .http_status
                .map(u16::try_from)
                .transpose()
                .context("incident http_status is out of range")?,
            started_at: row.started_at,
            resolved_at: row.resolved_at,
            last_update_at: row.last_update_at,
            screenshot_ref: row.screenshot_ref,
        })
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Id,
    incident_id: Id,
    actor_id: Option<AccountId>,
    event_type: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            incident_id: row.incident_id,
            actor_id: row.actor_id,
            event_type: row.event_type.parse()?,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TestRunRow {
    id: Id,
    owner_id: AccountId,
    kind: String,
    status: String,
    target_url: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<TestRunRow> for TestRun {
    type Error = anyhow::Error;

    fn try_from(row: TestRunRow) -> Result<Self, Self::Error> {
        Ok(TestRun {
            id: row.id,
            owner_id: row.owner_id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            target_url: row.target_url,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

const INCIDENT_COLUMNS: &str = "id, kind, resource_id, owner_id, cause, http_status, \
    started_at, resolved_at, last_update_at, screenshot_ref";

const EVENT_COLUMNS: &str =
    "id, incident_id, actor_id, event_type, content, created_at, updated_at";

fn incident(row: Option<IncidentRow>) -> StoreResult<Option<Incident>> {
    Ok(row.map(Incident::try_from).transpose()?)
}

fn event(row: Option<EventRow>) -> StoreResult<Option<Event>> {
    Ok(row.map(Event::try_from).transpose()?)
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn fetch_resource(&self, kind: ResourceKind, id: Id) -> StoreResult<Option<Resource>> {
        let query = match kind {
            ResourceKind::Monitor => "select id, owner_id, name, url from monitors where id = $1",
            ResourceKind::Cron => "select id, owner_id, name, url from cron_jobs where id = $1",
        };
        let row = sqlx::query_as::<_, ResourceRow>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Resource {
            kind,
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            url: row.url,
        }))
    }

    async fn fetch_incident(&self, id: Id) -> StoreResult<Option<Incident>> {
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "select {INCIDENT_COLUMNS} from incidents where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        incident(row)
    }

    async fn find_open_incident(
        &self,
        kind: ResourceKind,
        resource_id: Id,
    ) -> StoreResult<Option<Incident>> {
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "select {INCIDENT_COLUMNS} from incidents
            where kind = $1 and resource_id = $2 and resolved_at is null"
        ))
        .bind(kind.name())
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await?;

        incident(row)
    }

    async fn list_incidents(
        &self,
        owner_id: AccountId,
        filter: &IncidentFilter,
    ) -> StoreResult<Vec<Incident>> {
        let open = filter.state.map(|state| state == IncidentState::Open);

        let rows = sqlx::query_as::<_, IncidentRow>(&format!(
            "select {INCIDENT_COLUMNS} from incidents
            where owner_id = $1
                and ($2::text is null or kind = $2)
                and ($3::bool is null or (resolved_at is null) = $3)
            order by last_update_at desc, id desc
            limit $4 offset $5"
        ))
        .bind(owner_id)
        .bind(filter.kind.map(|kind| kind.name()))
        .bind(open)
        .bind(filter.limit() as i64)
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Incident::try_from)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn insert_incident(&self, incident: &Incident) -> StoreResult<()> {
        sqlx::query(
            "insert into incidents (
                id, kind, resource_id, owner_id, cause, http_status,
                started_at, resolved_at, last_update_at, screenshot_ref
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(incident.id)
        .bind(incident.kind.name())
        .bind(incident.resource_id)
        .bind(incident.owner_id)
        .bind(incident.cause.as_deref())
        .bind(incident.http_status.map(i32::from))
        .bind(incident.started_at)
        .bind(incident.resolved_at)
        .bind(incident.last_update_at)
        .bind(incident.screenshot_ref.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn resolve_incident(
        &self,
        id: Id,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<Option<Incident>> {
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "update incidents set resolved_at = $2, last_update_at = $2
            where id = $1 and resolved_at is null
            returning {INCIDENT_COLUMNS}"
        ))
        .bind(id)
        .bind(resolved_at)
        .fetch_optional(&self.pool)
        .await?;

        incident(row)
    }

    async fn reopen_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<Option<Incident>> {
        let row = sqlx::query_as::<_, IncidentRow>(&format!(
            "update incidents set resolved_at = null, last_update_at = $2
            where id = $1 and resolved_at is not null
            returning {INCIDENT_COLUMNS}"
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        incident(row)
    }

    async fn touch_incident(&self, id: Id, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "update incidents set last_update_at = greatest(last_update_at, $2) where id = $1",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_screenshot_ref(&self, id: Id, reference: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "update incidents set screenshot_ref = $2 where id = $1 and screenshot_ref is null",
        )
        .bind(id)
        .bind(reference)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_incident(&self, id: Id) -> StoreResult<bool> {
        let mut txn = self.pool.begin().await?;

        sqlx::query("delete from incident_events where incident_id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;
        let result = sqlx::query("delete from incidents where id = $1")
            .bind(id)
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            "insert into incident_events (
                id, incident_id, actor_id, event_type, content, created_at, updated_at
            ) values ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(event.incident_id)
        .bind(event.actor_id)
        .bind(event.event_type.name())
        .bind(&event.content)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_event(&self, id: Id) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "select {EVENT_COLUMNS} from incident_events where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        event(row)
    }

    async fn list_events(&self, incident_id: Id) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "select {EVENT_COLUMNS} from incident_events
            where incident_id = $1
            order by created_at desc, id desc"
        ))
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(Event::try_from)
            .collect::<anyhow::Result<_>>()?)
    }

    async fn update_comment(
        &self,
        id: Id,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "update incident_events set content = $2, updated_at = $3
            where id = $1 and event_type = 'comment'
            returning {EVENT_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .bind(updated_at)
        .fetch_optional(&self.pool)
        .await?;

        event(row)
    }

    async fn delete_comment(&self, id: Id) -> StoreResult<bool> {
        let result =
            sqlx::query("delete from incident_events where id = $1 and event_type = 'comment'")
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fetch_test_run(&self, id: Id) -> StoreResult<Option<TestRun>> {
        let row = sqlx::query_as::<_, TestRunRow>(
            "select id, owner_id, kind, status, target_url, started_at, finished_at
            from test_runs where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TestRun::try_from).transpose()?)
    }

    async fn abandon_test_run(&self, id: Id, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "update test_runs set status = 'abandoned', finished_at = $2
            where id = $1 and status = 'running'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
