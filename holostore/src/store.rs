use crate::config::CacheConfig;
use crate::errors::{CacheError, Result};
use crate::models::{Address, CacheRecord, ChainId, CredentialService, Holo, HoloField};
use crate::sanitize::FieldUpdate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const USERS_TABLE: &str = "users";

/// The local holo cache: one table per chain plus the cross-chain `users` table.
///
/// Every write is a single `INSERT .. ON CONFLICT DO UPDATE` (or a keyed
/// `UPDATE`) inside one transaction, so concurrent writers for the same
/// (chain, address) can never both insert.
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
    chains: Vec<ChainId>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::open(&config.db_path, config.chain_ids()?)
    }

    pub fn open(path: &Path, chains: Vec<ChainId>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            chains,
        })
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let columns = HoloField::ALL
            .iter()
            .map(|field| format!("{} TEXT", field.column()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut ddl = String::from("BEGIN;\n");
        for table in self.chains.iter().map(ChainId::as_str).chain([USERS_TABLE]) {
            ddl.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (address TEXT PRIMARY KEY, {columns});\n"
            ));
        }
        ddl.push_str("COMMIT;");

        let conn = self.conn()?;
        conn.execute_batch(&ddl)?;
        Ok(())
    }

    pub fn chains(&self) -> &[ChainId] {
        &self.chains
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    fn table<'a>(&self, chain: &'a ChainId) -> Result<&'a str> {
        if self.chains.contains(chain) {
            Ok(chain.as_str())
        } else {
            Err(CacheError::InvalidInput(format!(
                "chain '{chain}' is not configured"
            )))
        }
    }

    /// Inserts the record if absent, otherwise overwrites exactly the fields in
    /// `update`. The `users` row for the address is maintained in the same
    /// transaction.
    pub fn upsert(&self, chain: &ChainId, address: &Address, update: &FieldUpdate) -> Result<()> {
        let table = self.table(chain)?;
        if update.fields().is_empty() {
            return Ok(());
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for target in [table, USERS_TABLE] {
            tx.execute(&upsert_sql(target, update), params_from_iter(upsert_params(address, update)))?;
        }
        tx.commit()?;

        log::debug!(
            "Upserted {} field(s) for {} on {}",
            update.fields().len(),
            address,
            chain
        );
        Ok(())
    }

    /// Nulls `fields` on an existing record without creating or deleting rows.
    /// Returns whether the chain record existed.
    pub fn clear(&self, chain: &ChainId, address: &Address, fields: &[HoloField]) -> Result<bool> {
        let table = self.table(chain)?;
        if fields.is_empty() {
            return Ok(self.get(chain, address)?.is_some());
        }
        let assignments = fields
            .iter()
            .map(|field| format!("{} = NULL", field.column()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let touched = tx.execute(
            &format!("UPDATE {table} SET {assignments} WHERE address = ?1"),
            params![address.as_str()],
        )?;
        if touched > 0 {
            tx.execute(
                &format!("UPDATE {USERS_TABLE} SET {assignments} WHERE address = ?1"),
                params![address.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(touched > 0)
    }

    /// `Ok(None)` means nothing has been observed for this chain yet.
    pub fn get(&self, chain: &ChainId, address: &Address) -> Result<Option<CacheRecord>> {
        let table = self.table(chain)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {table} WHERE address = ?1",
            select_columns()
        ))?;
        let holo = stmt
            .query_row(params![address.as_str()], row_to_holo)
            .optional()?;
        Ok(holo.map(|holo| CacheRecord {
            chain: chain.clone(),
            address: address.clone(),
            holo,
        }))
    }

    /// Snapshot of every record cached for `chain`; order is unspecified.
    pub fn get_all(&self, chain: &ChainId) -> Result<Vec<CacheRecord>> {
        let table = self.table(chain)?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT address, {} FROM {table}",
            select_columns()
        ))?;
        let rows = stmt.query_map([], |row| {
            let raw: String = row.get(0)?;
            let mut holo = Holo::default();
            for (idx, field) in HoloField::ALL.iter().enumerate() {
                holo.set(*field, row.get(idx + 1)?);
            }
            Ok((raw, holo))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (raw, holo) = row?;
            match Address::parse(&raw) {
                Ok(address) => records.push(CacheRecord {
                    chain: chain.clone(),
                    address,
                    holo,
                }),
                Err(err) => log::warn!("Skipping unreadable cached address '{}': {}", raw, err),
            }
        }
        Ok(records)
    }

    /// Every address with at least one record on any configured chain.
    pub fn all_known_addresses(&self) -> Result<BTreeSet<Address>> {
        if self.chains.is_empty() {
            return Ok(BTreeSet::new());
        }
        let query = self
            .chains
            .iter()
            .map(|chain| format!("SELECT address FROM {}", chain.as_str()))
            .collect::<Vec<_>>()
            .join(" UNION ");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut known = BTreeSet::new();
        for raw in rows {
            let raw = raw?;
            if let Ok(address) = Address::parse(&raw) {
                known.insert(address);
            }
        }
        Ok(known)
    }

    /// Looks up which address holds `credentials` for `service` in the `users` table.
    pub fn address_for_credential(
        &self,
        service: CredentialService,
        credentials: &str,
    ) -> Result<Option<Address>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT address FROM {USERS_TABLE} WHERE {} = ?1 LIMIT 1",
                    service.field().column()
                ),
                params![credentials],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| Address::parse(&raw)).transpose()
    }
}

fn select_columns() -> String {
    HoloField::ALL
        .iter()
        .map(|field| field.column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_holo(row: &Row<'_>) -> rusqlite::Result<Holo> {
    let mut holo = Holo::default();
    for (idx, field) in HoloField::ALL.iter().enumerate() {
        holo.set(*field, row.get(idx)?);
    }
    Ok(holo)
}

fn upsert_sql(table: &str, update: &FieldUpdate) -> String {
    let columns: Vec<&str> = update.fields().iter().map(|(field, _)| field.column()).collect();
    let placeholders = (2..=columns.len() + 1)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    let assignments = columns
        .iter()
        .map(|column| format!("{column} = excluded.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} (address, {}) VALUES (?1, {placeholders})
         ON CONFLICT(address) DO UPDATE SET {assignments}",
        columns.join(", ")
    )
}

fn upsert_params(address: &Address, update: &FieldUpdate) -> Vec<Option<String>> {
    std::iter::once(Some(address.as_str().to_string()))
        .chain(update.fields().iter().map(|(_, value)| value.clone()))
        .collect()
}
