//! Per-URL memoization of [`PolicyTable`] lookups.

// self
use crate::{
	_prelude::*,
	policy::{PolicyRule, PolicyTable},
};

type RuleMap = RwLock<HashMap<String, Option<Arc<PolicyRule>>>>;

/// Memoizes which rule (if any) applies to each URL template.
///
/// Entries are never invalidated; URL templates are static for the lifetime of the host client.
/// Negative results are cached too. Concurrent first lookups of the same URL may both scan the
/// table; the scan runs outside the lock and the later insert wins with an equal value.
#[derive(Debug, Default)]
pub struct PolicyCache {
	table: PolicyTable,
	entries: RuleMap,
}
impl PolicyCache {
	/// Wraps `table` with an empty cache.
	pub fn new(table: PolicyTable) -> Self {
		Self { table, entries: Default::default() }
	}

	/// Returns the rule for `url`, scanning the table only on the first lookup.
	pub fn resolve(&self, url: &str) -> Option<Arc<PolicyRule>> {
		if let Some(cached) = self.entries.read().get(url) {
			return cached.clone();
		}

		let resolved = self.table.find_rule(url);

		self.entries.write().insert(url.to_owned(), resolved.clone());

		resolved
	}

	/// Underlying rule table.
	pub fn table(&self) -> &PolicyTable {
		&self.table
	}

	/// Number of memoized URLs (positive and negative).
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing has been resolved yet.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
