use crate::{
    auth::Level,
    config::{Config, DatabaseConfig},
    transfer::Plan,
};
use anyhow::Result;
use chrono::NaiveDate;
use rand::{distributions::Alphanumeric, Rng};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree},
    Db, IVec, Transactional, Tree,
};
use std::convert::TryInto;
use tokio::task;

const GROUPS: &str = "groups";
const ENTRIES: &str = "entries";
const USERS: &str = "users";
const SESSIONS: &str = "sessions";

#[tracing::instrument(level = "debug")]
pub fn connect(config: &DatabaseConfig) -> Result<&'static Db> {
    let db = sled::Config::default()
        .path(&config.path)
        .mode(config.mode.into())
        .cache_capacity(config.cache_capacity)
        .open()?;
    Ok(Box::leak(Box::new(db)))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Group {
    pub name: String,
    /// Ids of the group's entries in creation order
    pub entries: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Entry {
    pub title: String,
    pub creator: String,
    pub notes: String,
    pub date_added: NaiveDate,
    pub group_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub level: Level,
    pub password_hash: String,
}

/// Identity stored server side for a logged in browser
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Session {
    pub name: String,
    pub level: Level,
}

/// Reasons a multi-record write gives up
#[derive(Debug, thiserror::Error)]
pub enum AbortError {
    #[error("group {0} no longer exists")]
    MissingGroup(u64),
    #[error("entry {0} no longer exists")]
    MissingEntry(u64),
    #[error(transparent)]
    Encoding(#[from] bincode::Error),
}

type TxResult<T> = ConflictableTransactionResult<T, AbortError>;

fn key(id: u64) -> IVec {
    IVec::from(&id.to_be_bytes()[..])
}

fn decode_key(bytes: &[u8]) -> Result<u64> {
    Ok(u64::from_be_bytes(bytes.try_into()?))
}

fn get<T: DeserializeOwned>(tree: &Tree, id: u64) -> Result<Option<T>> {
    match tree.get(key(id))? {
        Some(b) => Ok(Some(bincode::deserialize(&b)?)),
        None => Ok(None),
    }
}

fn tx_get<T: DeserializeOwned>(tree: &TransactionalTree, id: u64) -> TxResult<Option<T>> {
    match tree.get(key(id))? {
        Some(b) => Ok(Some(
            bincode::deserialize(&b).map_err(|e| ConflictableTransactionError::Abort(e.into()))?,
        )),
        None => Ok(None),
    }
}

fn tx_insert<T: Serialize>(tree: &TransactionalTree, id: u64, value: &T) -> TxResult<()> {
    let bytes =
        bincode::serialize(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
    tree.insert(key(id), bytes)?;
    Ok(())
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn groups(db: &Db) -> Result<Vec<(u64, Group)>> {
    task::block_in_place(move || {
        let groups = db.open_tree(GROUPS)?;
        groups
            .iter()
            .map(|kv| -> Result<(u64, Group)> {
                let (k, v) = kv?;
                Ok((decode_key(&k)?, bincode::deserialize(&v)?))
            })
            .collect()
    })
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn group(id: u64, db: &Db) -> Result<Option<Group>> {
    task::block_in_place(move || get(&db.open_tree(GROUPS)?, id))
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn insert_group(name: &str, db: &Db) -> Result<u64> {
    task::block_in_place(move || {
        let groups = db.open_tree(GROUPS)?;
        let id = db.generate_id()?;
        let group = Group {
            name: name.to_owned(),
            entries: Vec::new(),
        };
        groups.insert(key(id), bincode::serialize(&group)?)?;
        Ok(id)
    })
}

/// Deletes a group along with all of its entries
#[tracing::instrument(level = "debug", skip(db))]
pub fn delete_group(id: u64, db: &Db) -> Result<bool> {
    task::block_in_place(move || {
        let groups = db.open_tree(GROUPS)?;
        let entries = db.open_tree(ENTRIES)?;

        let deleted = (&groups, &entries).transaction(|(groups, entries)| -> TxResult<bool> {
            let group: Group = match tx_get(groups, id)? {
                Some(g) => g,
                None => return Ok(false),
            };
            for entry_id in group.entries {
                entries.remove(key(entry_id))?;
            }
            groups.remove(key(id))?;
            Ok(true)
        })?;
        Ok(deleted)
    })
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn entry(id: u64, db: &Db) -> Result<Option<Entry>> {
    task::block_in_place(move || get(&db.open_tree(ENTRIES)?, id))
}

/// Loads every entry of a group
#[tracing::instrument(level = "debug", skip(group, db))]
pub fn entries(group: &Group, db: &Db) -> Result<Vec<(u64, Entry)>> {
    task::block_in_place(move || {
        let entries = db.open_tree(ENTRIES)?;
        let mut loaded = Vec::with_capacity(group.entries.len());
        for &id in &group.entries {
            if let Some(e) = get(&entries, id)? {
                loaded.push((id, e));
            }
        }
        Ok(loaded)
    })
}

/// Loads every group along with its entries
#[tracing::instrument(level = "debug", skip(db))]
pub fn store(db: &Db) -> Result<Vec<(u64, Group, Vec<(u64, Entry)>)>> {
    let mut store = Vec::new();
    for (id, group) in groups(db)? {
        let entries = entries(&group, db)?;
        store.push((id, group, entries));
    }
    Ok(store)
}

/// Adds an entry to a group, returning `None` if the group doesn't exist
#[tracing::instrument(level = "debug", skip(notes, db))]
pub fn insert_entry(
    group_id: u64,
    title: &str,
    creator: &str,
    notes: &str,
    date_added: NaiveDate,
    db: &Db,
) -> Result<Option<u64>> {
    task::block_in_place(move || {
        let groups = db.open_tree(GROUPS)?;
        let entries = db.open_tree(ENTRIES)?;
        let id = db.generate_id()?;
        let entry = Entry {
            title: title.to_owned(),
            creator: creator.to_owned(),
            notes: notes.to_owned(),
            date_added,
            group_id,
        };

        let inserted = (&groups, &entries).transaction(|(groups, entries)| -> TxResult<bool> {
            let mut group: Group = match tx_get(groups, group_id)? {
                Some(g) => g,
                None => return Ok(false),
            };
            group.entries.push(id);
            tx_insert(groups, group_id, &group)?;
            tx_insert(entries, id, &entry)?;
            Ok(true)
        })?;
        Ok(if inserted { Some(id) } else { None })
    })
}

/// Replaces the editable fields of an entry, keeping its creation date
#[tracing::instrument(level = "debug", skip(notes, db))]
pub fn update_entry(id: u64, title: &str, creator: &str, notes: &str, db: &Db) -> Result<bool> {
    task::block_in_place(move || {
        let entries = db.open_tree(ENTRIES)?;
        let updated = entries.transaction(|entries| -> TxResult<bool> {
            let mut entry: Entry = match tx_get(entries, id)? {
                Some(e) => e,
                None => return Ok(false),
            };
            entry.title = title.to_owned();
            entry.creator = creator.to_owned();
            entry.notes = notes.to_owned();
            tx_insert(entries, id, &entry)?;
            Ok(true)
        })?;
        Ok(updated)
    })
}

/// Counts of what a merge changed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub groups_created: usize,
    pub entries_created: usize,
    pub entries_updated: usize,
}

/// Applies an upload plan in a single transaction
#[tracing::instrument(level = "debug", skip(plan, db))]
pub fn merge(plan: &Plan, db: &Db) -> Result<MergeReport> {
    task::block_in_place(move || {
        let groups = db.open_tree(GROUPS)?;
        let entries = db.open_tree(ENTRIES)?;

        // Ids are allocated up front since the transaction body may run more than once
        let mut group_ids = Vec::with_capacity(plan.groups.len());
        for gp in &plan.groups {
            let id = match gp.existing {
                Some(id) => id,
                None => db.generate_id()?,
            };
            let mut entry_ids = Vec::with_capacity(gp.created.len());
            for _ in &gp.created {
                entry_ids.push(db.generate_id()?);
            }
            group_ids.push((id, entry_ids));
        }

        let report = (&groups, &entries).transaction(|(groups, entries)| -> TxResult<MergeReport> {
            let mut report = MergeReport::default();
            for (gp, (group_id, entry_ids)) in plan.groups.iter().zip(&group_ids) {
                let mut group = match gp.existing {
                    Some(id) => tx_get::<Group>(groups, id)?
                        .ok_or(ConflictableTransactionError::Abort(AbortError::MissingGroup(id)))?,
                    None => {
                        report.groups_created += 1;
                        Group {
                            name: gp.name.clone(),
                            entries: Vec::new(),
                        }
                    }
                };

                for (entry_id, notes) in &gp.updated {
                    let mut entry = tx_get::<Entry>(entries, *entry_id)?.ok_or(
                        ConflictableTransactionError::Abort(AbortError::MissingEntry(*entry_id)),
                    )?;
                    entry.notes = notes.clone();
                    tx_insert(entries, *entry_id, &entry)?;
                    report.entries_updated += 1;
                }

                for (new, &entry_id) in gp.created.iter().zip(entry_ids) {
                    let entry = Entry {
                        title: new.title.clone(),
                        creator: new.creator.clone(),
                        notes: new.notes.clone(),
                        date_added: new.date_added,
                        group_id: *group_id,
                    };
                    tx_insert(entries, entry_id, &entry)?;
                    group.entries.push(entry_id);
                    report.entries_created += 1;
                }

                tx_insert(groups, *group_id, &group)?;
            }
            Ok(report)
        })?;
        Ok(report)
    })
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn user(name: &str, db: &Db) -> Result<Option<User>> {
    task::block_in_place(move || {
        let users = db.open_tree(USERS)?;
        let bytes = match users.get(name)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let user = bincode::deserialize(&bytes)?;
        Ok(Some(user))
    })
}

/// Creates a user, or replaces an existing one when `replace` is set
#[tracing::instrument(level = "debug", skip(password, db, config))]
pub fn insert_user(
    name: &str,
    password: &str,
    level: Level,
    replace: bool,
    db: &Db,
    config: &Config,
) -> Result<bool> {
    task::block_in_place(move || {
        let users = db.open_tree(USERS)?;
        if !replace && users.contains_key(name)? {
            return Ok(false);
        }

        let password_hash = crate::auth::hash(password.as_bytes(), &config.password)?;
        let user = User {
            level,
            password_hash,
        };

        let bytes = bincode::serialize(&user)?;
        users.insert(name, bytes)?;
        Ok(true)
    })
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn session(token: &str, db: &Db) -> Result<Option<Session>> {
    task::block_in_place(move || {
        let sessions = db.open_tree(SESSIONS)?;
        let bytes = match sessions.get(token)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let session = bincode::deserialize(&bytes)?;
        Ok(Some(session))
    })
}

/// Stores a session under a fresh random token and returns the token
#[tracing::instrument(level = "debug", skip(db))]
pub fn create_session(session: &Session, db: &Db) -> Result<String> {
    task::block_in_place(move || {
        let sessions = db.open_tree(SESSIONS)?;
        let bytes = bincode::serialize(session)?;
        loop {
            let token: String = rand::thread_rng()
                .sample_iter(Alphanumeric)
                .take(32)
                .map(char::from)
                .collect();
            if sessions
                .compare_and_swap(&token, None as Option<&[u8]>, Some(bytes.clone()))?
                .is_ok()
            {
                break Ok(token);
            }
        }
    })
}

#[tracing::instrument(level = "debug", skip(db))]
pub fn delete_session(token: &str, db: &Db) -> Result<()> {
    task::block_in_place(move || {
        db.open_tree(SESSIONS)?.remove(token)?;
        Ok(())
    })
}
