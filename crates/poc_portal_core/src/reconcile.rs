//! crates/poc_portal_core/src/reconcile.rs
//!
//! Brings the links of one POC in line with a full status snapshot.
//!
//! The snapshot replaces the active set: every entity it lists ends with the
//! link state it states, and every link whose entity is absent from it ends inactive.
//! Entities are resolved first, then only links that are active and no longer listed
//! are switched off, so listed links are never flipped off and back on.

use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::domain::{CommentKind, LinkUpdate, PocUseCase, Rating, UseCaseSpec};
use crate::ports::PortResult;
use crate::upsert::{link_create_body, link_patch, CommentDraft, Patch, Upserter};

/// One entity as listed in a status snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEntry {
    pub use_case: UseCaseSpec,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
    /// Defaults to `false`.
    pub is_completed: Option<bool>,
    pub order: Option<i64>,
    pub rating: Option<Rating>,
    pub feedback: Vec<String>,
    pub questions: Vec<String>,
}

impl StatusEntry {
    fn link_update(&self) -> LinkUpdate {
        LinkUpdate {
            is_active: Some(self.is_active.unwrap_or(true)),
            is_completed: Some(self.is_completed.unwrap_or(false)),
            restamp_completion: false,
            order: self.order,
            rating: self.rating,
            is_customer_prep: self.use_case.is_customer_prep,
            estimate_hours: self.use_case.estimate_hours,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub processed: usize,
    pub skipped: usize,
    pub deactivated: usize,
    pub links_created: usize,
    pub comments_created: usize,
}

/// Applies `entries` to the links of `poc_id`. Comments are authored by `author_id`.
pub async fn reconcile(
    upserter: &Upserter,
    poc_id: &str,
    author_id: Option<&str>,
    entries: &[StatusEntry],
    page_size: u32,
) -> PortResult<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();
    let existing = upserter.list_links(poc_id, page_size).await?;

    let mut resolved: Vec<(&StatusEntry, String)> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.use_case.code.trim().is_empty() {
            warn!(poc_id = %poc_id, "Skipping status entry without code");
            summary.skipped += 1;
            continue;
        }
        let use_case = upserter.resolve_use_case(&entry.use_case).await?;
        resolved.push((entry, use_case.record.id));
    }
    let listed: HashSet<&str> = resolved.iter().map(|(_, id)| id.as_str()).collect();

    // The first link per entity is canonical; any later duplicate is stale.
    let mut canonical: HashMap<String, PocUseCase> = HashMap::new();
    let mut stale: Vec<&PocUseCase> = Vec::new();
    for link in &existing {
        if !listed.contains(link.use_case.as_str()) || canonical.contains_key(&link.use_case) {
            if link.is_active {
                stale.push(link);
            }
        } else {
            canonical.insert(link.use_case.clone(), link.clone());
        }
    }

    for link in stale {
        let mut patch = Patch::new();
        patch.set("is_active", false);
        upserter.update::<PocUseCase>(&link.id, patch).await?;
        summary.deactivated += 1;
    }

    for (entry, use_case_id) in resolved {
        let update = entry.link_update();
        let now = upserter.now();
        let link = match canonical.get(&use_case_id) {
            Some(current) => {
                let patch = link_patch(current, &update, &now);
                if patch.is_empty() {
                    current.clone()
                } else {
                    upserter.update::<PocUseCase>(&current.id, patch).await?
                }
            }
            None => {
                let body = link_create_body(poc_id, &use_case_id, &update, &now);
                summary.links_created += 1;
                upserter.create::<PocUseCase>(body).await?
            }
        };

        let comments = entry
            .feedback
            .iter()
            .map(|text| (CommentKind::Feedback, text, entry.rating))
            .chain(entry.questions.iter().map(|text| (CommentKind::Question, text, None)));
        for (kind, text, rating) in comments {
            if text.trim().is_empty() {
                continue;
            }
            let draft = CommentDraft {
                poc_id: poc_id.to_string(),
                link_id: Some(link.id.clone()),
                author_id: author_id.map(str::to_string),
                kind,
                text: text.clone(),
                rating,
            };
            upserter.add_comment(&draft).await?;
            summary.comments_created += 1;
        }

        canonical.insert(use_case_id, link);
        summary.processed += 1;
    }

    info!(
        poc_id = %poc_id,
        processed = summary.processed,
        deactivated = summary.deactivated,
        created = summary.links_created,
        comments = summary.comments_created,
        "Reconciled use case links"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::collections;
    use crate::memory::{ManualClock, MemoryStore};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn upserter() -> (Arc<MemoryStore>, Upserter) {
        let store = Arc::new(MemoryStore::new());
        let upserter = Upserter::new(store.clone(), Arc::new(ManualClock::default()));
        (store, upserter)
    }

    fn entry(code: &str) -> StatusEntry {
        StatusEntry {
            use_case: UseCaseSpec::new(code),
            ..Default::default()
        }
    }

    fn link_for<'a>(links: &'a [Value], store: &MemoryStore, code: &str) -> &'a Value {
        let use_case = store
            .records(collections::USE_CASES)
            .into_iter()
            .find(|u| u["code"] == code)
            .unwrap();
        links
            .iter()
            .find(|l| l["use_case"] == use_case["id"])
            .unwrap()
    }

    #[tokio::test]
    async fn snapshot_replaces_active_set() {
        let (store, upserter) = upserter();

        reconcile(&upserter, "p1", None, &[entry("a"), entry("b")], 500)
            .await
            .unwrap();
        let summary = reconcile(&upserter, "p1", None, &[entry("b"), entry("c")], 500)
            .await
            .unwrap();

        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.links_created, 1);
        let links = store.records(collections::POC_USE_CASES);
        assert_eq!(links.len(), 3);
        assert_eq!(link_for(&links, &store, "a")["is_active"], false);
        assert_eq!(link_for(&links, &store, "b")["is_active"], true);
        assert_eq!(link_for(&links, &store, "c")["is_active"], true);
    }

    #[tokio::test]
    async fn listed_links_are_never_deactivated() {
        let (store, upserter) = upserter();
        reconcile(&upserter, "p1", None, &[entry("a")], 500).await.unwrap();

        reconcile(&upserter, "p1", None, &[entry("a")], 500).await.unwrap();

        // Nothing changed, so the second pass writes nothing to the links.
        assert!(store.updates(collections::POC_USE_CASES).is_empty());
    }

    #[tokio::test]
    async fn completion_is_stamped_on_transition() {
        let (store, upserter) = upserter();
        reconcile(&upserter, "p1", None, &[entry("dash")], 500).await.unwrap();

        let done = StatusEntry {
            is_completed: Some(true),
            ..entry("dash")
        };
        reconcile(&upserter, "p1", None, std::slice::from_ref(&done), 500)
            .await
            .unwrap();
        let stamped = store.records(collections::POC_USE_CASES)[0]["completed_at"].clone();
        assert!(stamped.as_str().is_some_and(|s| !s.is_empty()));

        // Already completed: no new stamp.
        reconcile(&upserter, "p1", None, &[done], 500).await.unwrap();
        assert_eq!(store.records(collections::POC_USE_CASES)[0]["completed_at"], stamped);
    }

    #[tokio::test]
    async fn other_pocs_are_untouched() {
        let (store, upserter) = upserter();
        reconcile(&upserter, "p1", None, &[entry("a")], 500).await.unwrap();

        reconcile(&upserter, "p2", None, &[entry("b")], 500).await.unwrap();

        let links = store.records(collections::POC_USE_CASES);
        assert!(links.iter().all(|l| l["is_active"] == true));
    }

    #[tokio::test]
    async fn duplicate_links_are_collapsed() {
        let (store, upserter) = upserter();
        reconcile(&upserter, "p1", None, &[entry("a")], 500).await.unwrap();
        let use_case = store.records(collections::USE_CASES)[0]["id"].clone();
        store.insert(
            collections::POC_USE_CASES,
            json!({"poc": "p1", "use_case": use_case, "is_active": true}),
        );

        let summary = reconcile(&upserter, "p1", None, &[entry("a")], 500).await.unwrap();

        assert_eq!(summary.deactivated, 1);
        let active = store
            .records(collections::POC_USE_CASES)
            .into_iter()
            .filter(|l| l["is_active"] == true)
            .count();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn comments_skip_empty_strings_and_questions_carry_no_rating() {
        let (store, upserter) = upserter();
        let with_comments = StatusEntry {
            rating: Some(Rating::new(4).unwrap()),
            feedback: vec!["".into(), "ok".into()],
            questions: vec!["why?".into(), "  ".into()],
            ..entry("dash")
        };

        let summary = reconcile(&upserter, "p1", Some("u1"), &[with_comments], 500)
            .await
            .unwrap();

        assert_eq!(summary.comments_created, 2);
        let comments = store.records(collections::COMMENTS);
        let feedback = comments.iter().find(|c| c["kind"] == "feedback").unwrap();
        let question = comments.iter().find(|c| c["kind"] == "question").unwrap();
        assert_eq!(feedback["text"], "ok");
        assert_eq!(feedback["rating"], 4);
        assert_eq!(feedback["author"], "u1");
        assert!(question.get("rating").is_none());
    }

    #[tokio::test]
    async fn entries_without_code_are_skipped() {
        let (store, upserter) = upserter();

        let summary = reconcile(&upserter, "p1", None, &[entry(""), entry("a")], 500)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(store.records(collections::USE_CASES).len(), 1);
    }
}
