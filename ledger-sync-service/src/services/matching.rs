//! Customer name matching.
//!
//! Matching is deliberately conservative: two names match only when their
//! normalized forms are byte-identical. A wrong match silently misattributes
//! revenue, so there is no edit-distance scoring and no partial credit; the
//! manual link path covers the names normalization cannot bridge.

use crate::models::CustomerRecord;
use std::collections::HashMap;
use uuid::Uuid;

/// Legal-entity suffixes dropped during normalization. Compared against
/// whole tokens after punctuation stripping, so "Cole Co" loses "co" but
/// keeps "cole", and "p.c." / "l.l.c." reduce to "pc" / "llc" here.
const LEGAL_ENTITY_SUFFIXES: &[&str] = &[
    "llc",
    "inc",
    "corp",
    "corporation",
    "company",
    "co",
    "ltd",
    "limited",
    "llp",
    "pllc",
    "pc",
    "the",
];

fn strip_punctuation(token: &str) -> String {
    token
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '\'' | '"'))
        .collect()
}

/// Reduces a business name to its canonical comparable form: lowercased,
/// legal-entity suffixes removed token-wise, punctuation stripped, whitespace
/// collapsed. Total and deterministic.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let mut kept: Vec<String> = Vec::new();

    for token in lowered.split_whitespace() {
        let bare = strip_punctuation(token);
        if bare.is_empty() || LEGAL_ENTITY_SUFFIXES.contains(&bare.as_str()) {
            continue;
        }
        kept.push(bare);
    }

    kept.join(" ")
}

/// Finds the first candidate whose display name or organization name
/// normalizes to the same form as `ledger_name`. Candidates must already be
/// in a stable order (the store reads them ordered by customer id), which
/// makes first-match-wins deterministic across runs.
pub fn find_match<'a>(
    ledger_name: &str,
    candidates: &'a [CustomerRecord],
) -> Option<&'a CustomerRecord> {
    let target = normalize_name(ledger_name);
    if target.is_empty() {
        return None;
    }

    candidates.iter().find(|candidate| {
        if normalize_name(&candidate.display_name) == target {
            return true;
        }
        candidate
            .organization
            .as_deref()
            .is_some_and(|org| normalize_name(org) == target)
    })
}

/// Run-scoped memo of ledger customer id to resolved CRM customer (or an
/// explicit "no match"). Owned by a single sync run and discarded with it;
/// never persisted.
#[derive(Debug, Default)]
pub struct MatchCache {
    entries: HashMap<i64, Option<Uuid>>,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the cache from links already stored on customer
    /// records, so previously resolved ledger customers skip name matching
    /// entirely.
    pub fn seed_from_customers<'a, I>(&mut self, customers: I)
    where
        I: IntoIterator<Item = &'a CustomerRecord>,
    {
        for customer in customers {
            if let Some(ledger_customer_id) = customer.ledger_customer_id {
                self.entries
                    .entry(ledger_customer_id)
                    .or_insert(Some(customer.customer_id));
            }
        }
    }

    /// Outer `None` means "not yet resolved this run"; `Some(None)` is a
    /// cached no-match.
    pub fn get(&self, ledger_customer_id: i64) -> Option<Option<Uuid>> {
        self.entries.get(&ledger_customer_id).copied()
    }

    pub fn insert(&mut self, ledger_customer_id: i64, resolution: Option<Uuid>) {
        self.entries.insert(ledger_customer_id, resolution);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn customer(display_name: &str, organization: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            customer_id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            organization: organization.map(|s| s.to_string()),
            ledger_customer_id: None,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn normalization_equates_suffix_and_punctuation_variants() {
        assert_eq!(normalize_name("Acme, Inc."), "acme");
        assert_eq!(normalize_name("ACME INC"), "acme");
        assert_eq!(normalize_name("acme inc."), "acme");
        assert_eq!(normalize_name("The Acme Company"), "acme");
        assert_eq!(normalize_name("Smith & Jones, L.L.C."), "smith & jones");
    }

    #[test]
    fn suffixes_are_removed_as_whole_tokens_only() {
        assert_eq!(normalize_name("Cole Co"), "cole");
        assert_eq!(normalize_name("Colectivo"), "colectivo");
        assert_eq!(normalize_name("Incline Partners"), "incline partners");
    }

    #[test]
    fn normalization_collapses_whitespace() {
        assert_eq!(normalize_name("  Acme   Widget   Works  "), "acme widget works");
    }

    #[test]
    fn name_of_only_suffixes_normalizes_to_empty_and_never_matches() {
        assert_eq!(normalize_name("The Co."), "");

        let candidates = vec![customer("Co", None)];
        assert!(find_match("The Co.", &candidates).is_none());
    }

    #[test]
    fn find_match_returns_first_candidate_in_order() {
        let first = customer("Acme", None);
        let second = customer("Acme LLC", None);
        let candidates = vec![first.clone(), second];

        for _ in 0..10 {
            let matched = find_match("Acme, Inc.", &candidates).expect("should match");
            assert_eq!(matched.customer_id, first.customer_id);
        }
    }

    #[test]
    fn find_match_considers_organization_name() {
        let candidates = vec![customer("Jane Smith", Some("Smith Consulting LLC"))];

        let matched = find_match("Smith Consulting", &candidates);
        assert!(matched.is_some());
        assert!(find_match("Jane Smith", &candidates).is_some());
        assert!(find_match("Unrelated Corp", &candidates).is_none());
    }

    #[test]
    fn cache_distinguishes_unresolved_from_cached_no_match() {
        let mut cache = MatchCache::new();
        assert_eq!(cache.get(77), None);

        cache.insert(77, None);
        assert_eq!(cache.get(77), Some(None));

        let id = Uuid::new_v4();
        cache.insert(88, Some(id));
        assert_eq!(cache.get(88), Some(Some(id)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn seeding_uses_stored_links_without_overwriting_run_entries() {
        let mut linked = customer("Acme", None);
        linked.ledger_customer_id = Some(42);
        let unlinked = customer("Other", None);

        let mut cache = MatchCache::new();
        cache.seed_from_customers([&linked, &unlinked]);

        assert_eq!(cache.get(42), Some(Some(linked.customer_id)));
        assert_eq!(cache.get(99), None);
        assert_eq!(cache.len(), 1);
    }
}
