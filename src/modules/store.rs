// Account file persistence: primary store plus a read-only legacy fallback.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::{AccountRecord, AccountStore};

const DATA_DIR: &str = ".gemini-bridge";
const ACCOUNTS_FILE: &str = "accounts.json";
const FALLBACK_DIR: &str = ".antigravity";

pub struct CredentialStore {
    primary: PathBuf,
    fallback: PathBuf,
}

impl CredentialStore {
    /// Store rooted in the user home directory. The primary parent dir is
    /// created eagerly so later saves cannot fail on a missing directory.
    pub fn open_default() -> AppResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("cannot resolve home directory".into()))?;
        let data_dir = home.join(DATA_DIR);
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        Ok(Self {
            primary: data_dir.join(ACCOUNTS_FILE),
            fallback: home.join(FALLBACK_DIR).join(ACCOUNTS_FILE),
        })
    }

    pub fn with_paths(primary: PathBuf, fallback: PathBuf) -> Self {
        Self { primary, fallback }
    }

    /// Loads the account list. Reads the primary file first; when it is
    /// absent or holds zero accounts, the fallback file is consulted
    /// (never written). Malformed content at either location is reported to
    /// `diag` and treated as "no accounts" — this never fails the caller.
    pub fn load_with<F>(&self, mut diag: F) -> Vec<AccountRecord>
    where
        F: FnMut(String),
    {
        let primary = Self::read_store(&self.primary).unwrap_or_else(|e| {
            diag(format!("primary account store unreadable: {}", e));
            AccountStore::default()
        });
        if !primary.accounts.is_empty() {
            return primary.accounts;
        }

        let fallback = Self::read_store(&self.fallback).unwrap_or_else(|e| {
            diag(format!("fallback account store unreadable: {}", e));
            AccountStore::default()
        });
        fallback.accounts
    }

    pub fn load(&self) -> Vec<AccountRecord> {
        self.load_with(|msg| tracing::warn!("{}", msg))
    }

    /// Accounts eligible for selection: `enabled` and not `invalid`.
    pub fn enabled_accounts(&self) -> Vec<AccountRecord> {
        filter_enabled(self.load())
    }

    fn read_store(path: &Path) -> Result<AccountStore, String> {
        if !path.exists() {
            return Ok(AccountStore::default());
        }
        let content =
            fs::read_to_string(path).map_err(|e| format!("read {:?} failed: {}", path, e))?;
        serde_json::from_str(&content).map_err(|e| format!("parse {:?} failed: {}", path, e))
    }

    /// Atomic write to the primary store (tmp file + rename). The fallback
    /// location is never touched.
    pub fn save(&self, store: &AccountStore) -> AppResult<()> {
        if let Some(parent) = self.primary.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(store)?;
        let tmp = self.primary.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.primary)?;
        Ok(())
    }

    /// Adds or replaces the record with the same email, then persists.
    pub fn upsert(&self, account: AccountRecord) -> AppResult<()> {
        let mut store = Self::read_store(&self.primary).unwrap_or_default();
        match store.accounts.iter_mut().find(|a| a.email == account.email) {
            Some(existing) => {
                let added_at = existing.added_at;
                *existing = account;
                existing.added_at = added_at;
                existing.updated_at = Some(chrono::Utc::now().timestamp());
            }
            None => store.accounts.push(account),
        }
        self.save(&store)
    }

    pub fn remove(&self, email: &str) -> AppResult<bool> {
        let mut store = Self::read_store(&self.primary).unwrap_or_default();
        let before = store.accounts.len();
        store.accounts.retain(|a| a.email != email);
        let removed = store.accounts.len() != before;
        if removed {
            self.save(&store)?;
        }
        Ok(removed)
    }

    pub fn set_enabled(&self, email: &str, enabled: bool) -> AppResult<bool> {
        let mut store = Self::read_store(&self.primary).unwrap_or_default();
        let mut found = false;
        for account in store.accounts.iter_mut() {
            if account.email == email {
                account.enabled = enabled;
                account.updated_at = Some(chrono::Utc::now().timestamp());
                found = true;
            }
        }
        if found {
            self.save(&store)?;
        }
        Ok(found)
    }
}

/// Pure filter over a loaded account list; selection operates only on this
/// subsequence.
pub fn filter_enabled(accounts: Vec<AccountRecord>) -> Vec<AccountRecord> {
    accounts.into_iter().filter(|a| a.selectable()).collect()
}
