use std::str::FromStr;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, query};

use super::{EntityStore, StoreError};
use crate::config::DatabaseConfig;
use crate::model::{
    AsnRecord, BgpPrefixRecord, Collection, Counter, DocId, IpBlockRecord, IpRecord, KeyKind,
    LinkArray, OrgRecord, Record, RefValue, Reference,
};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ip (
        id TEXT PRIMARY KEY,
        bgppref TEXT,
        ipblock TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS bgppref (
        id TEXT PRIMARY KEY,
        ref_cnt INTEGER NOT NULL DEFAULT 0,
        asn TEXT NOT NULL DEFAULT '[]'
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS ipblock (
        id TEXT PRIMARY KEY,
        ref_cnt INTEGER NOT NULL DEFAULT 0,
        org TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS asn (
        id INTEGER PRIMARY KEY,
        bgppref TEXT NOT NULL DEFAULT '[]',
        org TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS org (
        id TEXT PRIMARY KEY,
        ref_cnt INTEGER NOT NULL DEFAULT 0
    )"#,
    "CREATE INDEX IF NOT EXISTS ip_bgppref_idx ON ip (bgppref)",
    "CREATE INDEX IF NOT EXISTS ip_ipblock_idx ON ip (ipblock)",
    "CREATE INDEX IF NOT EXISTS ipblock_org_idx ON ipblock (org)",
    "CREATE INDEX IF NOT EXISTS asn_org_idx ON asn (org)",
];

/// [`EntityStore`] backed by a SQLite database.
///
/// Every collection is a table keyed by `id`; link arrays are stored as JSON
/// text. Table and column names come from the closed relation enums, never
/// from user input.
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    /// Connect to the configured database and create missing tables.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        log::info!("Connecting to entity datastore with DSN: {}", config.dsn);

        let options = SqliteConnectOptions::from_str(&config.dsn)?.create_if_missing(true);

        // A private in-memory database only exists on the connection that
        // created it, so the pool must hold exactly one connection forever.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| {
                log::error!(
                    "Failed to connect to SQLite database with DSN '{}': {e}",
                    config.dsn
                );
                e
            })?;

        let store = Self { pool };
        store.init().await.map_err(|e| {
            log::error!("Failed to initialize entity schema: {e}");
            e
        })?;
        log::info!("Entity datastore schema initialized");
        Ok(store)
    }

    /// Open a fresh private in-memory database.
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn bind_id<'q>(statement: SqliteQuery<'q>, id: &'q DocId) -> SqliteQuery<'q> {
    match id {
        DocId::Int(value) => statement.bind(*value),
        DocId::Text(value) => statement.bind(value.as_str()),
    }
}

fn decode_id(row: &SqliteRow, column: &str, collection: Collection) -> Result<DocId, StoreError> {
    let decoded = match collection.key_kind() {
        KeyKind::Integer => row.try_get::<i64, _>(column).map(DocId::Int),
        KeyKind::Text => row.try_get::<String, _>(column).map(DocId::Text),
    };
    decoded.map_err(|e| StoreError::InvalidKey {
        collection,
        detail: e.to_string(),
    })
}

fn decode_array(raw: Option<String>) -> Result<Vec<RefValue>, StoreError> {
    match raw {
        Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
        _ => Ok(Vec::new()),
    }
}

fn decode_count(row: &SqliteRow, column: &str) -> Result<u64, StoreError> {
    let count: i64 = row.try_get(column)?;
    Ok(count.max(0) as u64)
}

fn decode_record(collection: Collection, row: &SqliteRow) -> Result<Record, StoreError> {
    let record = match collection {
        Collection::Ip => Record::Ip(IpRecord {
            id: row.try_get("id")?,
            bgppref: row.try_get("bgppref")?,
            ipblock: row.try_get("ipblock")?,
        }),
        Collection::BgpPrefix => Record::BgpPrefix(BgpPrefixRecord {
            id: row.try_get("id")?,
            ref_cnt: row.try_get("ref_cnt")?,
            asn: decode_array(row.try_get("asn")?)?,
        }),
        Collection::IpBlock => Record::IpBlock(IpBlockRecord {
            id: row.try_get("id")?,
            ref_cnt: row.try_get("ref_cnt")?,
            org: row.try_get("org")?,
        }),
        Collection::Asn => Record::Asn(AsnRecord {
            id: row.try_get("id")?,
            bgppref: decode_array(row.try_get("bgppref")?)?,
            org: row.try_get("org")?,
        }),
        Collection::Org => Record::Org(OrgRecord {
            id: row.try_get("id")?,
            ref_cnt: row.try_get("ref_cnt")?,
        }),
    };
    Ok(record)
}

fn select_columns(collection: Collection) -> &'static str {
    match collection {
        Collection::Ip => "id, bgppref, ipblock",
        Collection::BgpPrefix => "id, ref_cnt, asn",
        Collection::IpBlock => "id, ref_cnt, org",
        Collection::Asn => "id, bgppref, org",
        Collection::Org => "id, ref_cnt",
    }
}

impl SqlStore {
    async fn apply_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
        increment: bool,
    ) -> Result<u64, StoreError> {
        let sql = if increment {
            format!(
                "UPDATE {table} SET {field} = {field} + ? WHERE id = ?",
                table = counter.collection().name(),
                field = counter.field()
            )
        } else {
            format!(
                "UPDATE {table} SET {field} = ? WHERE id = ?",
                table = counter.collection().name(),
                field = counter.field()
            )
        };

        let mut tx = self.pool.begin().await?;
        let mut matched = 0;
        for (id, count) in counts {
            let value = i64::try_from(*count).unwrap_or(i64::MAX);
            let result = bind_id(query(&sql).bind(value), id)
                .execute(&mut *tx)
                .await?;
            matched += result.rows_affected();
        }
        tx.commit().await?;
        Ok(matched)
    }
}

#[async_trait]
impl EntityStore for SqlStore {
    async fn insert(&self, record: Record) -> Result<(), StoreError> {
        match &record {
            Record::Ip(r) => {
                query("INSERT OR REPLACE INTO ip (id, bgppref, ipblock) VALUES (?, ?, ?)")
                    .bind(&r.id)
                    .bind(&r.bgppref)
                    .bind(&r.ipblock)
                    .execute(&self.pool)
                    .await?;
            }
            Record::BgpPrefix(r) => {
                query("INSERT OR REPLACE INTO bgppref (id, ref_cnt, asn) VALUES (?, ?, ?)")
                    .bind(&r.id)
                    .bind(r.ref_cnt)
                    .bind(serde_json::to_string(&r.asn)?)
                    .execute(&self.pool)
                    .await?;
            }
            Record::IpBlock(r) => {
                query("INSERT OR REPLACE INTO ipblock (id, ref_cnt, org) VALUES (?, ?, ?)")
                    .bind(&r.id)
                    .bind(r.ref_cnt)
                    .bind(&r.org)
                    .execute(&self.pool)
                    .await?;
            }
            Record::Asn(r) => {
                query("INSERT OR REPLACE INTO asn (id, bgppref, org) VALUES (?, ?, ?)")
                    .bind(r.id)
                    .bind(serde_json::to_string(&r.bgppref)?)
                    .bind(&r.org)
                    .execute(&self.pool)
                    .await?;
            }
            Record::Org(r) => {
                query("INSERT OR REPLACE INTO org (id, ref_cnt) VALUES (?, ?)")
                    .bind(&r.id)
                    .bind(r.ref_cnt)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn fetch(
        &self,
        collection: Collection,
        id: &DocId,
    ) -> Result<Option<Record>, StoreError> {
        if id.kind() != collection.key_kind() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {columns} FROM {table} WHERE id = ?",
            columns = select_columns(collection),
            table = collection.name()
        );
        let row = bind_id(query(&sql), id).fetch_optional(&self.pool).await?;
        row.map(|row| decode_record(collection, &row)).transpose()
    }

    async fn count_documents(&self, collection: Collection) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}", collection.name());
        let row = query(&sql).fetch_one(&self.pool).await?;
        decode_count(&row, "cnt")
    }

    async fn list_ids(&self, collection: Collection) -> Result<Vec<DocId>, StoreError> {
        let sql = format!("SELECT id FROM {} ORDER BY id", collection.name());
        let rows = query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| decode_id(row, "id", collection))
            .collect()
    }

    async fn reset_counter(&self, counter: Counter) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET {} = 0",
            counter.collection().name(),
            counter.field()
        );
        let result = query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn group_references(
        &self,
        reference: Reference,
    ) -> Result<Vec<(DocId, u64)>, StoreError> {
        let sql = format!(
            "SELECT {field} AS target, COUNT(*) AS cnt FROM {table} \
             WHERE {field} IS NOT NULL GROUP BY {field} ORDER BY {field}",
            field = reference.field(),
            table = reference.source().name()
        );
        let rows = query(&sql).fetch_all(&self.pool).await?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let target = decode_id(&row, "target", reference.target())?;
            groups.push((target, decode_count(&row, "cnt")?));
        }
        Ok(groups)
    }

    async fn set_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError> {
        self.apply_counters(counter, counts, false).await
    }

    async fn increment_counters(
        &self,
        counter: Counter,
        counts: &[(DocId, u64)],
    ) -> Result<u64, StoreError> {
        self.apply_counters(counter, counts, true).await
    }

    async fn load_counters(&self, counter: Counter) -> Result<Vec<(DocId, i64)>, StoreError> {
        let sql = format!(
            "SELECT id, {field} AS cnt FROM {table} ORDER BY id",
            field = counter.field(),
            table = counter.collection().name()
        );
        let rows = query(&sql).fetch_all(&self.pool).await?;

        let mut counters = Vec::with_capacity(rows.len());
        for row in rows {
            let id = decode_id(&row, "id", counter.collection())?;
            counters.push((id, row.try_get::<i64, _>("cnt")?));
        }
        Ok(counters)
    }

    async fn reset_array(&self, array: LinkArray) -> Result<u64, StoreError> {
        let sql = format!("UPDATE {} SET {} = '[]'", array.owner().name(), array.field());
        let result = query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn array_entries(
        &self,
        array: LinkArray,
    ) -> Result<Vec<(DocId, Vec<RefValue>)>, StoreError> {
        let sql = format!(
            "SELECT id, {field} AS arr FROM {table} ORDER BY id",
            field = array.field(),
            table = array.owner().name()
        );
        let rows = query(&sql).fetch_all(&self.pool).await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id = decode_id(&row, "id", array.owner())?;
            entries.push((id, decode_array(row.try_get("arr")?)?));
        }
        Ok(entries)
    }

    async fn set_arrays(
        &self,
        array: LinkArray,
        links: &[(DocId, Vec<DocId>)],
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE id = ?",
            array.owner().name(),
            array.field()
        );

        let mut tx = self.pool.begin().await?;
        let mut matched = 0;
        for (id, targets) in links {
            let encoded = serde_json::to_string(targets)?;
            let result = bind_id(query(&sql).bind(encoded), id)
                .execute(&mut *tx)
                .await?;
            matched += result.rows_affected();
        }
        tx.commit().await?;
        Ok(matched)
    }

    async fn delete_zero_counter(&self, counter: Counter) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = 0",
            counter.collection().name(),
            counter.field()
        );
        let result = query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_empty_array(&self, array: LinkArray) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {table} WHERE {field} IS NULL OR json_array_length({field}) = 0",
            table = array.owner().name(),
            field = array.field()
        );
        let result = query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
