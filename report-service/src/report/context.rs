//! Per-build snapshot of the reference data a report is rendered with.

use crate::models::{Account, Currency, ReportJob, TransactionTag};
use crate::report::BuildError;
use crate::services::ReferenceSource;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Separator between names in a resolved tag path.
pub const TAG_PATH_SEPARATOR: &str = " > ";

/// Immutable id-keyed lookups built once at the start of a build. Owned by a
/// single worker for the lifetime of that build.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    tags: HashMap<i64, TransactionTag>,
    accounts: HashMap<i64, Account>,
    currencies: HashMap<i64, Currency>,
    lang: HashMap<String, String>,
}

impl ReportContext {
    /// Load the owner's tags, accounts and currencies (root currencies
    /// included) plus the job's lang map. Any read failure aborts the build.
    #[instrument(skip(reference, job), fields(owner_id = job.owner_id))]
    pub async fn load(
        reference: &dyn ReferenceSource,
        job: &ReportJob,
    ) -> Result<Self, BuildError> {
        let (tags, accounts, currencies) = tokio::try_join!(
            reference.list_tags(job.owner_id),
            reference.list_accounts(job.owner_id),
            reference.list_currencies_with_root(job.owner_id),
        )?;

        debug!(
            tags = tags.len(),
            accounts = accounts.len(),
            currencies = currencies.len(),
            "Report context loaded"
        );

        Ok(Self::from_snapshot(tags, accounts, currencies, job.lang_map()))
    }

    pub fn from_snapshot(
        tags: Vec<TransactionTag>,
        accounts: Vec<Account>,
        currencies: Vec<Currency>,
        lang: HashMap<String, String>,
    ) -> Self {
        Self {
            tags: tags.into_iter().map(|t| (t.id, t)).collect(),
            accounts: accounts.into_iter().map(|a| (a.id, a)).collect(),
            currencies: currencies.into_iter().map(|c| (c.id, c)).collect(),
            lang,
        }
    }

    pub fn tag(&self, id: i64) -> Result<&TransactionTag, BuildError> {
        self.tags.get(&id).ok_or_else(|| BuildError::missing("tag", id))
    }

    pub fn account(&self, id: i64) -> Result<&Account, BuildError> {
        self.accounts
            .get(&id)
            .ok_or_else(|| BuildError::missing("account", id))
    }

    pub fn currency(&self, id: i64) -> Result<&Currency, BuildError> {
        self.currencies
            .get(&id)
            .ok_or_else(|| BuildError::missing("currency", id))
    }

    /// Human-readable path of a tag: ancestor names root first, then the
    /// tag's own name, joined with `" > "`.
    pub fn tag_full_path(&self, id: i64) -> Result<String, BuildError> {
        let tag = self.tag(id)?;
        let parent_ids = self.parent_ids(tag)?;

        if parent_ids.is_empty() {
            return Ok(tag.name.clone());
        }

        let mut names = parent_ids
            .into_iter()
            .map(|parent_id| self.tag(parent_id).map(|parent| parent.name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        names.push(tag.name.as_str());

        Ok(names.join(TAG_PATH_SEPARATOR))
    }

    /// The top-level ancestor of a tag (the tag itself when it has no parents).
    pub fn root_tag(&self, id: i64) -> Result<&TransactionTag, BuildError> {
        let tag = self.tag(id)?;
        let root_id = tag.root_id().map_err(|_| Self::malformed(tag))?;
        self.tag(root_id)
    }

    /// Localized label for `key`, or `default` when the lang map lacks it.
    pub fn label<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.lang.get(key).map(String::as_str).unwrap_or(default)
    }

    fn parent_ids(&self, tag: &TransactionTag) -> Result<Vec<i64>, BuildError> {
        tag.parent_ids().map_err(|_| Self::malformed(tag))
    }

    fn malformed(tag: &TransactionTag) -> BuildError {
        BuildError::MalformedTagTree {
            id: tag.id,
            tree: tag.parents_tree.clone(),
        }
    }
}
