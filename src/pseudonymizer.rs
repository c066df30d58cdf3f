//! Dictionary pseudonymization
//!
//! Replaces known exact values (names, account ids, project codenames) with
//! stable aliases before text leaves the process, and restores them on the
//! way back. Dictionary rows are scoped; for the same
//! `(lowercased original, data type)` key an agent row beats an organization
//! row, which beats a global row.
//!
//! The merged dictionary is cached process-wide for a fixed TTL. The cache
//! is not keyed by scope: the TTL is the only freshness guarantee.

use crate::context::Scope;
use crate::error::{PipelineError, Result};
use crate::store::{DictionaryEntry, DictionaryQuery, DictionaryStore};
use crate::types::{DictionaryPseudonymMapping, PseudonymizationResult, ReversalResult};
use regex::{Regex, RegexBuilder, RegexSet, RegexSetBuilder};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Default cache lifetime for the merged dictionary
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Case-insensitive alternation over literal values, longest literal first
///
/// `any` finds the next occurrence of any literal in one left-to-right
/// pass; `exact` tells which literal a found span belongs to. Index order
/// matches the order the literals were given in.
#[derive(Debug)]
struct LiteralMatcher {
    any: Regex,
    exact: RegexSet,
}

impl LiteralMatcher {
    /// `literals` must be ordered longest first; `None` when there are none
    fn new<'a>(
        literals: impl IntoIterator<Item = &'a str>,
    ) -> std::result::Result<Option<Self>, regex::Error> {
        let escaped: Vec<String> = literals.into_iter().map(regex::escape).collect();
        if escaped.is_empty() {
            return Ok(None);
        }

        let any = RegexBuilder::new(&escaped.join("|"))
            .case_insensitive(true)
            .build()?;
        let exact = RegexSetBuilder::new(escaped.iter().map(|e| format!("^(?:{})$", e)))
            .case_insensitive(true)
            .build()?;
        Ok(Some(Self { any, exact }))
    }

    /// Index of the first literal equal to `found`, ignoring case
    fn which(&self, found: &str) -> Option<usize> {
        self.exact.matches(found).iter().next()
    }
}

/// Scope-merged dictionary with a precompiled matcher
///
/// Entries are ordered longest original value first. They are applied in a
/// single pass over the input, so a full name wins over any shorter entry
/// it contains and no entry ever matches inside an inserted pseudonym.
#[derive(Debug, Default)]
pub struct MergedDictionary {
    entries: Vec<DictionaryEntry>,
    matcher: Option<LiteralMatcher>,
}

impl MergedDictionary {
    /// Merge scope layers; later layers take priority over earlier ones
    ///
    /// Each layer is `(scope label, rows)`, lowest priority first.
    pub fn merge(layers: Vec<(&str, Vec<DictionaryEntry>)>) -> Result<Self> {
        let mut merged: HashMap<(String, String), (DictionaryEntry, &str)> = HashMap::new();

        for (label, rows) in layers {
            for entry in rows.into_iter().filter(|e| e.is_active) {
                if entry.original_value.is_empty() {
                    continue;
                }
                let key = (entry.original_value.to_lowercase(), entry.data_type.clone());
                if let Some((previous, previous_label)) = merged.get(&key) {
                    if previous.pseudonym != entry.pseudonym {
                        tracing::warn!(
                            data_type = %entry.data_type,
                            overridden_scope = %previous_label,
                            winning_scope = %label,
                            overridden_pseudonym = %previous.pseudonym,
                            pseudonym = %entry.pseudonym,
                            "Dictionary entry overridden by higher-priority scope"
                        );
                    }
                }
                merged.insert(key, (entry, label));
            }
        }

        let mut entries: Vec<DictionaryEntry> =
            merged.into_values().map(|(entry, _)| entry).collect();
        entries.sort_by(|a, b| {
            b.original_value
                .chars()
                .count()
                .cmp(&a.original_value.chars().count())
                .then_with(|| a.original_value.to_lowercase().cmp(&b.original_value.to_lowercase()))
                .then_with(|| a.data_type.cmp(&b.data_type))
        });

        let matcher = LiteralMatcher::new(entries.iter().map(|e| e.original_value.as_str()))
            .map_err(|e| {
                PipelineError::Dictionary(format!("Failed to compile dictionary matcher: {}", e))
            })?;

        Ok(Self { entries, matcher })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merged entries in priority order
    pub fn entries(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.iter()
    }

    /// Substitute every entry's original value, case-insensitively
    ///
    /// Records one mapping per entry that matched at least once, with the
    /// surface forms it replaced in text order.
    pub fn apply(&self, text: &str) -> PseudonymizationResult {
        let Some(ref matcher) = self.matcher else {
            return PseudonymizationResult {
                pseudonymized_text: text.to_string(),
                mappings: Vec::new(),
            };
        };

        let mut occurrences: Vec<Vec<String>> = vec![Vec::new(); self.entries.len()];
        let mut output = String::with_capacity(text.len());
        let mut cursor = 0;

        for found in matcher.any.find_iter(text) {
            let Some(index) = matcher.which(found.as_str()) else {
                continue;
            };
            output.push_str(&text[cursor..found.start()]);
            output.push_str(&self.entries[index].pseudonym);
            occurrences[index].push(found.as_str().to_string());
            cursor = found.end();
        }
        output.push_str(&text[cursor..]);

        let mappings = self
            .entries
            .iter()
            .zip(occurrences)
            .filter(|(_, found)| !found.is_empty())
            .map(|(entry, occurrences)| DictionaryPseudonymMapping {
                original_value: entry.original_value.clone(),
                pseudonym: entry.pseudonym.clone(),
                data_type: entry.data_type.clone(),
                category: entry.category.clone(),
                occurrences,
            })
            .collect();

        PseudonymizationResult {
            pseudonymized_text: output,
            mappings,
        }
    }
}

struct CachedDictionary {
    dictionary: Arc<MergedDictionary>,
    expires_at: Instant,
}

/// Process-wide merged-dictionary cache
///
/// Holds one snapshot plus its expiry. Reloads are single-flight: while one
/// task reloads, other tasks are served the stale snapshot if there is one,
/// and wait for the reload otherwise.
pub struct DictionaryCache {
    ttl: Duration,
    snapshot: RwLock<Option<CachedDictionary>>,
    reload: tokio::sync::Mutex<()>,
}

impl Default for DictionaryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl DictionaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: RwLock::new(None),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Drop the cached snapshot so the next read reloads
    pub fn invalidate(&self) {
        if let Ok(mut snapshot) = self.snapshot.write() {
            *snapshot = None;
        }
    }

    fn current(&self, require_fresh: bool) -> Option<Arc<MergedDictionary>> {
        let snapshot = self.snapshot.read().ok()?;
        snapshot
            .as_ref()
            .filter(|cached| !require_fresh || cached.expires_at > Instant::now())
            .map(|cached| Arc::clone(&cached.dictionary))
    }

    /// Return the cached dictionary, reloading through `load` when expired
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<MergedDictionary>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MergedDictionary>>,
    {
        if let Some(dictionary) = self.current(true) {
            return Ok(dictionary);
        }

        let _guard = match self.reload.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(stale) = self.current(false) {
                    tracing::debug!("Dictionary reload in flight, serving stale snapshot");
                    return Ok(stale);
                }
                self.reload.lock().await
            }
        };

        // Another task may have finished a reload while we waited
        if let Some(dictionary) = self.current(true) {
            return Ok(dictionary);
        }

        let dictionary = Arc::new(load().await?);
        {
            let mut snapshot = self.snapshot.write().map_err(|e| {
                PipelineError::Dictionary(format!("Failed to acquire cache lock: {}", e))
            })?;
            *snapshot = Some(CachedDictionary {
                dictionary: Arc::clone(&dictionary),
                expires_at: Instant::now() + self.ttl,
            });
        }

        tracing::debug!(
            entries = dictionary.len(),
            ttl_secs = self.ttl.as_secs(),
            "Dictionary cache refreshed"
        );
        Ok(dictionary)
    }
}

/// Scoped dictionary pseudonymizer
///
/// Loading the dictionary is mandatory: a store failure is returned to the
/// caller rather than letting unprotected text through.
pub struct DictionaryPseudonymizer {
    store: Arc<dyn DictionaryStore>,
    cache: Arc<DictionaryCache>,
}

impl DictionaryPseudonymizer {
    pub fn new(store: Arc<dyn DictionaryStore>, cache: Arc<DictionaryCache>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<DictionaryCache> {
        &self.cache
    }

    /// Load (or reuse) the merged dictionary for `scope`
    pub async fn dictionary(&self, scope: &Scope) -> Result<Arc<MergedDictionary>> {
        let store = Arc::clone(&self.store);
        let scope = scope.clone();
        self.cache
            .get_or_load(|| async move { load_merged(store.as_ref(), &scope).await })
            .await
    }

    /// Replace dictionary values in `text`
    pub async fn pseudonymize(&self, text: &str, scope: &Scope) -> Result<PseudonymizationResult> {
        let dictionary = self.dictionary(scope).await?;
        let result = dictionary.apply(text);

        if !result.mappings.is_empty() {
            tracing::debug!(
                mappings = result.mappings.len(),
                "Dictionary pseudonymization applied"
            );
        }
        Ok(result)
    }

    /// Restore original values
    pub fn reverse(&self, text: &str, mappings: &[DictionaryPseudonymMapping]) -> ReversalResult {
        reverse_pseudonyms(text, mappings)
    }
}

/// Run the three scoped queries and merge them (agent > organization > global)
async fn load_merged(store: &dyn DictionaryStore, scope: &Scope) -> Result<MergedDictionary> {
    let mut agent_rows = Vec::new();
    let mut organization_rows = Vec::new();

    if let Some(ref organization_slug) = scope.organization_slug {
        if let Some(ref agent_slug) = scope.agent_slug {
            agent_rows = store
                .fetch_entries(&DictionaryQuery::Agent {
                    organization_slug: organization_slug.clone(),
                    agent_slug: agent_slug.clone(),
                })
                .await?;
        }
        organization_rows = store
            .fetch_entries(&DictionaryQuery::Organization {
                organization_slug: organization_slug.clone(),
            })
            .await?;
    } else if scope.agent_slug.is_some() {
        tracing::debug!("Agent scope without organization, skipping agent dictionary");
    }

    let global_rows = store.fetch_entries(&DictionaryQuery::Global).await?;

    MergedDictionary::merge(vec![
        ("global", global_rows),
        ("organization", organization_rows),
        ("agent", agent_rows),
    ])
}

/// Replace pseudonyms with their originals in one pass, case-insensitively
///
/// Longer pseudonyms are matched first, so `PERSON_10` is never read as
/// `PERSON_1` followed by a `0`. When the text still holds exactly as many
/// occurrences of a pseudonym as were replaced, the recorded surface forms
/// are restored in order; otherwise every occurrence becomes the canonical
/// original value.
pub fn reverse_pseudonyms(text: &str, mappings: &[DictionaryPseudonymMapping]) -> ReversalResult {
    let unchanged = || ReversalResult {
        original_text: text.to_string(),
        reversal_count: 0,
    };

    let mut order: Vec<usize> = (0..mappings.len())
        .filter(|&i| !mappings[i].pseudonym.is_empty())
        .collect();
    order.sort_by(|&a, &b| {
        mappings[b]
            .pseudonym
            .chars()
            .count()
            .cmp(&mappings[a].pseudonym.chars().count())
    });

    let matcher = match LiteralMatcher::new(order.iter().map(|&i| mappings[i].pseudonym.as_str())) {
        Ok(Some(matcher)) => matcher,
        Ok(None) => return unchanged(),
        Err(e) => {
            tracing::warn!(error = %e, "Pseudonyms cannot be matched, leaving text unchanged");
            return unchanged();
        }
    };
    let mapping_at = |found: &str| matcher.which(found).map(|i| order[i]);

    let mut found = vec![0usize; mappings.len()];
    for m in matcher.any.find_iter(text) {
        if let Some(i) = mapping_at(m.as_str()) {
            found[i] += 1;
        }
    }

    let mut surface_forms: Vec<Option<std::slice::Iter<'_, String>>> = mappings
        .iter()
        .zip(&found)
        .map(|(mapping, &count)| (count == mapping.occurrences.len()).then(|| mapping.occurrences.iter()))
        .collect();

    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    for m in matcher.any.find_iter(text) {
        let Some(i) = mapping_at(m.as_str()) else {
            continue;
        };
        let original = surface_forms[i]
            .as_mut()
            .and_then(|forms| forms.next())
            .unwrap_or(&mappings[i].original_value);
        output.push_str(&text[cursor..m.start()]);
        output.push_str(original);
        cursor = m.end();
    }
    output.push_str(&text[cursor..]);

    ReversalResult {
        original_text: output,
        reversal_count: found.iter().sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn pseudonymizer(entries: Vec<DictionaryEntry>) -> (DictionaryPseudonymizer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(entries, Vec::new()));
        let pseudonymizer =
            DictionaryPseudonymizer::new(store.clone(), Arc::new(DictionaryCache::default()));
        (pseudonymizer, store)
    }

    #[tokio::test]
    async fn test_case_insensitive_single_mapping() {
        let (p, _) = pseudonymizer(vec![DictionaryEntry::new("John Doe", "PERSON_1", "person")]);
        let text = "JOHN DOE is a person. John Doe is here.";

        let result = p.pseudonymize(text, &Scope::global()).await.unwrap();
        assert_eq!(
            result.pseudonymized_text,
            "PERSON_1 is a person. PERSON_1 is here."
        );
        assert_eq!(result.mappings.len(), 1);
        assert_eq!(result.mappings[0].original_value, "John Doe");
        assert_eq!(result.mappings[0].occurrences, vec!["JOHN DOE", "John Doe"]);

        let reversed = p.reverse(&result.pseudonymized_text, &result.mappings);
        assert_eq!(reversed.original_text, text);
        assert_eq!(reversed.reversal_count, 2);
    }

    #[tokio::test]
    async fn test_no_match_is_identity() {
        let (p, _) = pseudonymizer(vec![DictionaryEntry::new("John Doe", "PERSON_1", "person")]);
        let result = p.pseudonymize("nothing to see", &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "nothing to see");
        assert!(result.mappings.is_empty());
    }

    #[tokio::test]
    async fn test_empty_dictionary_is_identity() {
        let (p, _) = pseudonymizer(Vec::new());
        let result = p.pseudonymize("John Doe", &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "John Doe");
        assert!(result.mappings.is_empty());
    }

    #[tokio::test]
    async fn test_scope_precedence() {
        let (p, _) = pseudonymizer(vec![
            DictionaryEntry::new("Jane Roe", "GLOBAL_P", "person"),
            DictionaryEntry::new("jane roe", "ORG_P", "person").for_organization("acme"),
            DictionaryEntry::new("JANE ROE", "AGENT_P", "person").for_agent("acme", "helpdesk"),
        ]);

        let result = p
            .pseudonymize("ask Jane Roe", &Scope::agent("acme", "helpdesk"))
            .await
            .unwrap();
        assert_eq!(result.pseudonymized_text, "ask AGENT_P");
        assert_eq!(result.mappings.len(), 1);
    }

    #[tokio::test]
    async fn test_organization_beats_global() {
        let (p, _) = pseudonymizer(vec![
            DictionaryEntry::new("Jane Roe", "GLOBAL_P", "person"),
            DictionaryEntry::new("Jane Roe", "ORG_P", "person").for_organization("acme"),
        ]);
        let result = p
            .pseudonymize("Jane Roe", &Scope::organization("acme"))
            .await
            .unwrap();
        assert_eq!(result.pseudonymized_text, "ORG_P");
    }

    #[tokio::test]
    async fn test_same_value_different_data_types_kept_apart() {
        let merged = MergedDictionary::merge(vec![(
            "global",
            vec![
                DictionaryEntry::new("Jordan", "PERSON_9", "person"),
                DictionaryEntry::new("Jordan", "COUNTRY_3", "location"),
            ],
        )])
        .unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_longer_values_applied_first() {
        let (p, _) = pseudonymizer(vec![
            DictionaryEntry::new("John", "FIRST_1", "person"),
            DictionaryEntry::new("John Doe", "PERSON_1", "person"),
        ]);
        let text = "John Doe and John";
        let result = p.pseudonymize(text, &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "PERSON_1 and FIRST_1");

        let reversed = p.reverse(&result.pseudonymized_text, &result.mappings);
        assert_eq!(reversed.original_text, text);
    }

    #[tokio::test]
    async fn test_regex_metacharacters_are_literal() {
        let (p, _) = pseudonymizer(vec![DictionaryEntry::new("C++ (v2.0)", "LANG_$1", "tech")]);
        let text = "we use c++ (V2.0) daily";
        let result = p.pseudonymize(text, &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "we use LANG_$1 daily");

        let reversed = p.reverse(&result.pseudonymized_text, &result.mappings);
        assert_eq!(reversed.original_text, text);
    }

    #[test]
    fn test_reverse_uses_canonical_value_when_counts_differ() {
        let mappings = vec![DictionaryPseudonymMapping {
            original_value: "John Doe".into(),
            pseudonym: "PERSON_1".into(),
            data_type: "person".into(),
            category: String::new(),
            occurrences: vec!["JOHN DOE".into()],
        }];
        let reversed = reverse_pseudonyms("person_1 met PERSON_1", &mappings);
        assert_eq!(reversed.original_text, "John Doe met John Doe");
        assert_eq!(reversed.reversal_count, 2);
    }

    #[tokio::test]
    async fn test_prefix_pseudonyms_round_trip() {
        let (p, _) = pseudonymizer(vec![
            DictionaryEntry::new("John Doe", "PERSON_10", "person"),
            DictionaryEntry::new("Jo", "PERSON_1", "person"),
        ]);
        let text = "John Doe and Jo";
        let result = p.pseudonymize(text, &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "PERSON_10 and PERSON_1");

        let reversed = p.reverse(&result.pseudonymized_text, &result.mappings);
        assert_eq!(reversed.original_text, text);
        assert_eq!(reversed.reversal_count, 2);
    }

    #[tokio::test]
    async fn test_inserted_pseudonym_is_not_rewritten() {
        let (p, _) = pseudonymizer(vec![
            DictionaryEntry::new("Acme", "ORG_PERSON", "company"),
            DictionaryEntry::new("person", "ROLE_1", "role"),
        ]);
        let text = "Acme hired a person";
        let result = p.pseudonymize(text, &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "ORG_PERSON hired a ROLE_1");

        let reversed = p.reverse(&result.pseudonymized_text, &result.mappings);
        assert_eq!(reversed.original_text, text);
    }

    #[tokio::test]
    async fn test_load_failure_propagates() {
        let (p, store) = pseudonymizer(vec![DictionaryEntry::new("x", "y", "z")]);
        store.set_unavailable(true);
        let err = p.pseudonymize("x", &Scope::global()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Dictionary(_)));
    }

    #[tokio::test]
    async fn test_cache_reused_within_ttl() {
        let (p, store) = pseudonymizer(vec![DictionaryEntry::new("Acme", "ORG_1", "org")]);
        p.pseudonymize("Acme", &Scope::global()).await.unwrap();
        p.pseudonymize("Acme", &Scope::global()).await.unwrap();
        // one global query for the first load only
        assert_eq!(store.dictionary_fetches(), 1);

        store
            .insert_entry(DictionaryEntry::new("Globex", "ORG_2", "org"))
            .unwrap();
        let result = p.pseudonymize("Globex", &Scope::global()).await.unwrap();
        assert!(result.mappings.is_empty(), "stale until TTL or invalidation");

        p.cache().invalidate();
        let result = p.pseudonymize("Globex", &Scope::global()).await.unwrap();
        assert_eq!(result.pseudonymized_text, "ORG_2");
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let store = Arc::new(MemoryStore::new(
            vec![DictionaryEntry::new("Acme", "ORG_1", "org")],
            Vec::new(),
        ));
        let cache = Arc::new(DictionaryCache::new(Duration::from_millis(20)));
        let p = DictionaryPseudonymizer::new(store.clone(), cache);

        p.pseudonymize("Acme", &Scope::global()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        p.pseudonymize("Acme", &Scope::global()).await.unwrap();
        assert_eq!(store.dictionary_fetches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_are_single_flight() {
        let store = Arc::new(MemoryStore::new(
            vec![DictionaryEntry::new("Acme", "ORG_1", "org")],
            Vec::new(),
        ));
        let p = Arc::new(DictionaryPseudonymizer::new(
            store.clone(),
            Arc::new(DictionaryCache::default()),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let p = Arc::clone(&p);
                tokio::spawn(async move { p.pseudonymize("Acme", &Scope::global()).await })
            })
            .collect();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.pseudonymized_text, "ORG_1");
        }

        assert_eq!(store.dictionary_fetches(), 1);
    }
}
