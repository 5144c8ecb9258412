// Path and File Name : /root/crate/gateway/src/cache/mod.rs
// Details of functionality of this file: the Metadata Cache (spec §4.11). A small TTL cache for
// cheap-but-frequent lookups (max date per table/column, row-count estimates) that would otherwise
// hit the database on every generated query.

use dashmap::DashMap;
use tokio::time::Instant;

use crate::db::DbPools;
use crate::error::GatewayResult;

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
}

pub struct MetadataCache {
    ttl_minutes: i64,
    max_date: DashMap<String, CacheEntry<Option<String>>>,
    row_estimate: DashMap<String, CacheEntry<i64>>,
}

impl MetadataCache {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            ttl_minutes,
            max_date: DashMap::new(),
            row_estimate: DashMap::new(),
        }
    }

    fn is_fresh(&self, inserted_at: Instant) -> bool {
        inserted_at.elapsed() < std::time::Duration::from_secs((self.ttl_minutes.max(0) as u64) * 60)
    }

    pub async fn get_max_date(
        &self,
        pools: &DbPools,
        schema: &str,
        table: &str,
        column: &str,
    ) -> GatewayResult<Option<String>> {
        let key = format!("max_date:{table}:{column}");
        if let Some(entry) = self.max_date.get(&key) {
            if self.is_fresh(entry.inserted_at) {
                return Ok(entry.value.clone());
            }
        }

        let conn = pools.acquire_metadata_connection().await?;
        let query = format!("SELECT MAX({column})::text FROM {schema}.{table}");
        let row = conn.query_opt(&query, &[]).await?;
        let value = row.and_then(|r| r.get::<_, Option<String>>(0));

        self.max_date.insert(key, CacheEntry { value: value.clone(), inserted_at: Instant::now() });
        Ok(value)
    }

    pub async fn get_table_row_estimate(&self, pools: &DbPools, schema: &str, table: &str) -> GatewayResult<i64> {
        let key = format!("row_estimate:{table}");
        if let Some(entry) = self.row_estimate.get(&key) {
            if self.is_fresh(entry.inserted_at) {
                return Ok(entry.value);
            }
        }

        let conn = pools.acquire_metadata_connection().await?;
        let row = conn
            .query_one(
                "SELECT reltuples::bigint FROM pg_class c \
                 JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relname = $2",
                &[&schema, &table],
            )
            .await?;
        let estimate: i64 = row.get(0);

        self.row_estimate.insert(key, CacheEntry { value: estimate, inserted_at: Instant::now() });
        Ok(estimate)
    }

    /// Drops every entry whose key contains `table`, or everything when `table` is None.
    pub fn invalidate(&self, table: Option<&str>) {
        match table {
            Some(t) => {
                self.max_date.retain(|k, _| !k.contains(t));
                self.row_estimate.retain(|k, _| !k.contains(t));
            }
            None => {
                self.max_date.clear();
                self.row_estimate.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_with_table_only_removes_matching_keys() {
        let cache = MetadataCache::new(15);
        cache.row_estimate.insert(
            "row_estimate:loans".to_string(),
            CacheEntry { value: 100, inserted_at: Instant::now() },
        );
        cache.row_estimate.insert(
            "row_estimate:borrowers".to_string(),
            CacheEntry { value: 50, inserted_at: Instant::now() },
        );

        cache.invalidate(Some("loans"));

        assert!(!cache.row_estimate.contains_key("row_estimate:loans"));
        assert!(cache.row_estimate.contains_key("row_estimate:borrowers"));
    }

    #[test]
    fn invalidate_with_none_clears_everything() {
        let cache = MetadataCache::new(15);
        cache.row_estimate.insert(
            "row_estimate:loans".to_string(),
            CacheEntry { value: 100, inserted_at: Instant::now() },
        );
        cache.invalidate(None);
        assert!(cache.row_estimate.is_empty());
    }
}
