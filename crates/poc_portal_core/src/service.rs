//! crates/poc_portal_core/src/service.rs
//!
//! The public operations of the portal. Each one is a fixed sequence of resolver
//! calls and patches against the record store. Nothing is rolled back when a later
//! step fails; the store keeps whatever the earlier steps wrote.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::domain::{CommentKind, LinkUpdate, Poc, Rating, UseCaseSpec, ValidationError};
use crate::ports::{Clock, PortError, PortResult, RecordStore};
use crate::reconcile::{reconcile, ReconcileSummary, StatusEntry};
use crate::upsert::{CommentDraft, Patch, PocDetails, PocDraft, Upserter};

/// Page size used when listing the links of one POC.
pub const DEFAULT_LINK_PAGE_SIZE: u32 = 500;

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{details}")]
    Validation { tag: &'static str, details: String },
    #[error("{0}")]
    MissingFields(String),
    #[error("{details}")]
    NotFound { tag: &'static str, details: String },
    #[error(transparent)]
    Port(#[from] PortError),
}

impl ServiceError {
    fn poc_not_found(poc_uid: &str) -> Self {
        ServiceError::NotFound {
            tag: "poc_not_found",
            details: format!("POC {poc_uid} not found"),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation {
            tag: err.tag(),
            details: err.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Rejects blank natural-key fields before anything is looked up.
fn require_keys(fields: &[(&str, &str)]) -> ServiceResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::MissingFields(format!("{} required", missing.join(", "))))
    }
}

//=========================================================================================
// Commands and Outcomes
//=========================================================================================

/// Register-or-lookup by `(owner e-mail, customer, product)`.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub se_email: String,
    pub se_name: Option<String>,
    pub customer_name: String,
    pub product: String,
    pub details: PocDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub poc_uid: String,
    pub is_new: bool,
    pub user_created: bool,
    pub user_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deregistered {
    pub poc_uid: String,
    pub found: bool,
}

/// A full daily snapshot that also upserts the owner and the POC itself.
#[derive(Debug, Clone, Default)]
pub struct DailyUpdate {
    pub se_email: String,
    pub poc_uid: String,
    pub poc_name: Option<String>,
    pub customer_name: Option<String>,
    pub details: PocDetails,
    pub entries: Vec<StatusEntry>,
    /// The inbound payload, kept verbatim in the audit snapshot.
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusApplied {
    pub poc_uid: String,
    pub summary: ReconcileSummary,
    /// `Some(false)` when the audit snapshot could not be written.
    pub snapshot_written: Option<bool>,
}

/// Owner details that let a single-action call create the POC it names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerRef {
    pub se_email: String,
    pub poc_name: Option<String>,
    pub customer_name: Option<String>,
    pub partner: Option<String>,
}

/// A POC referenced by external id. Without an owner it must already exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PocRef {
    pub poc_uid: String,
    pub owner: Option<OwnerRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub poc: PocRef,
    pub use_case: UseCaseSpec,
    pub completed: bool,
    pub rating: Option<Rating>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingChange {
    pub poc: PocRef,
    pub use_case: UseCaseSpec,
    pub rating: Rating,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentSubmission {
    pub poc: PocRef,
    pub use_case: UseCaseSpec,
    pub kind: CommentKind,
    pub text: String,
    pub rating: Option<Rating>,
}

/// Result of an operation that touched exactly one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkChanged {
    pub poc_uid: String,
    pub use_case_code: String,
    pub version: i64,
    pub link_id: String,
    pub comment_id: Option<String>,
}

//=========================================================================================
// The Service
//=========================================================================================

#[derive(Clone)]
pub struct PortalService {
    upserter: Upserter,
    link_page_size: u32,
}

impl PortalService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            upserter: Upserter::new(store, clock),
            link_page_size: DEFAULT_LINK_PAGE_SIZE,
        }
    }

    pub fn with_link_page_size(mut self, link_page_size: u32) -> Self {
        self.link_page_size = link_page_size.max(1);
        self
    }

    pub fn upserter(&self) -> &Upserter {
        &self.upserter
    }

    pub async fn backend_health(&self) -> PortResult<()> {
        self.upserter.store().health().await
    }

    // --- Registration ---

    pub async fn register(&self, registration: &Registration) -> ServiceResult<Registered> {
        require_keys(&[
            ("se_email", registration.se_email.as_str()),
            ("customer_name", registration.customer_name.as_str()),
            ("product", registration.product.as_str()),
        ])?;
        let user = self
            .upserter
            .resolve_user(&registration.se_email, registration.se_name.as_deref())
            .await?;
        let poc = self
            .upserter
            .resolve_poc_by_composite(
                user.id(),
                &registration.customer_name,
                &registration.product,
                &registration.details,
            )
            .await?;

        Ok(Registered {
            poc_uid: poc.record.poc_uid,
            is_new: poc.is_new,
            user_created: user.is_new,
            user_email: user.record.email,
        })
    }

    /// Marks a POC inactive. Unknown ids are not an error.
    pub async fn deregister(&self, poc_uid: &str) -> ServiceResult<Deregistered> {
        let Some(poc) = self.upserter.find_poc_by_uid(poc_uid).await? else {
            info!(poc_uid = %poc_uid, "Deregister for unknown POC");
            return Ok(Deregistered {
                poc_uid: poc_uid.to_string(),
                found: false,
            });
        };

        let mut patch = Patch::new();
        patch.set("is_active", false);
        patch.set("deregistered_at", self.upserter.now());
        self.upserter.update::<Poc>(&poc.id, patch).await?;
        info!(poc_uid = %poc_uid, "Deregistered POC");

        Ok(Deregistered {
            poc_uid: poc_uid.to_string(),
            found: true,
        })
    }

    // --- Full snapshots ---

    /// Status snapshot for an already registered POC.
    pub async fn heartbeat(&self, poc_uid: &str, entries: &[StatusEntry]) -> ServiceResult<StatusApplied> {
        let poc = self
            .upserter
            .find_poc_by_uid(poc_uid)
            .await?
            .ok_or_else(|| ServiceError::poc_not_found(poc_uid))?;

        let mut patch = Patch::new();
        patch.set("last_daily_update_at", self.upserter.now());
        self.upserter.update::<Poc>(&poc.id, patch).await?;

        let author = Some(poc.se.as_str()).filter(|se| !se.is_empty());
        let summary = reconcile(&self.upserter, &poc.id, author, entries, self.link_page_size).await?;

        Ok(StatusApplied {
            poc_uid: poc_uid.to_string(),
            summary,
            snapshot_written: None,
        })
    }

    /// Status snapshot that creates the owner and POC on first sight and keeps an
    /// audit copy of the payload.
    pub async fn daily_update(&self, update: &DailyUpdate) -> ServiceResult<StatusApplied> {
        require_keys(&[("se_email", update.se_email.as_str()), ("poc_uid", update.poc_uid.as_str())])?;
        let user = self.upserter.resolve_user(&update.se_email, None).await?;
        let draft = PocDraft {
            poc_uid: update.poc_uid.clone(),
            owner_id: user.id().to_string(),
            name: update.poc_name.clone(),
            customer_name: update.customer_name.clone(),
            partner: update.details.partner.clone(),
        };
        let poc = self.upserter.resolve_poc_by_uid(&draft).await?.record;

        let mut patch = update.details.patch_for(&poc);
        patch.set("last_daily_update_at", self.upserter.now());
        self.upserter.update::<Poc>(&poc.id, patch).await?;

        let snapshot_written = self.upserter.record_snapshot(&poc.id, user.id(), &update.raw).await;

        let summary = reconcile(
            &self.upserter,
            &poc.id,
            Some(user.id()),
            &update.entries,
            self.link_page_size,
        )
        .await?;

        Ok(StatusApplied {
            poc_uid: update.poc_uid.clone(),
            summary,
            snapshot_written: Some(snapshot_written),
        })
    }

    // --- Single-link actions ---

    /// Returns the POC and the user that comments on it are authored by.
    async fn resolve_poc(&self, poc_ref: &PocRef) -> ServiceResult<(Poc, Option<String>)> {
        match &poc_ref.owner {
            Some(owner) => {
                let user = self.upserter.resolve_user(&owner.se_email, None).await?;
                let draft = PocDraft {
                    poc_uid: poc_ref.poc_uid.clone(),
                    owner_id: user.id().to_string(),
                    name: owner.poc_name.clone(),
                    customer_name: owner.customer_name.clone(),
                    partner: owner.partner.clone(),
                };
                let poc = self.upserter.resolve_poc_by_uid(&draft).await?.record;
                Ok((poc, Some(user.record.id)))
            }
            None => {
                let poc = self
                    .upserter
                    .find_poc_by_uid(&poc_ref.poc_uid)
                    .await?
                    .ok_or_else(|| ServiceError::poc_not_found(&poc_ref.poc_uid))?;
                let author = Some(poc.se.clone()).filter(|se| !se.is_empty());
                Ok((poc, author))
            }
        }
    }

    async fn append_comment(
        &self,
        poc: &Poc,
        link_id: &str,
        author: Option<String>,
        kind: CommentKind,
        text: String,
        rating: Option<Rating>,
    ) -> ServiceResult<String> {
        let draft = CommentDraft {
            poc_id: poc.id.clone(),
            link_id: Some(link_id.to_string()),
            author_id: author,
            kind,
            text,
            rating,
        };
        Ok(self.upserter.add_comment(&draft).await?.id)
    }

    /// Marks one use case completed (or reopens it). The completion time is written
    /// on every call, last write wins.
    pub async fn complete_use_case(&self, completion: &Completion) -> ServiceResult<LinkChanged> {
        let (poc, author) = self.resolve_poc(&completion.poc).await?;
        let use_case = self.upserter.resolve_use_case(&completion.use_case).await?;
        let update = LinkUpdate {
            is_active: Some(true),
            is_completed: Some(completion.completed),
            restamp_completion: completion.completed,
            rating: completion.rating,
            ..Default::default()
        };
        let link = self.upserter.resolve_link(&poc.id, use_case.id(), &update).await?;

        let text = completion.text.clone().unwrap_or_default();
        let comment_id = if !text.trim().is_empty() || completion.rating.is_some() {
            let id = self
                .append_comment(&poc, link.id(), author, CommentKind::Feedback, text, completion.rating)
                .await?;
            Some(id)
        } else {
            None
        };

        info!(
            poc_uid = %poc.poc_uid,
            use_case = %completion.use_case.code,
            completed = completion.completed,
            "Updated use case completion"
        );
        Ok(LinkChanged {
            poc_uid: poc.poc_uid,
            use_case_code: completion.use_case.code.clone(),
            version: completion.use_case.version(),
            link_id: link.record.id,
            comment_id,
        })
    }

    /// Sets the rating of one link. Nothing else on the link changes.
    pub async fn rate_use_case(&self, change: &RatingChange) -> ServiceResult<LinkChanged> {
        let (poc, author) = self.resolve_poc(&change.poc).await?;
        let use_case = self.upserter.resolve_use_case(&change.use_case).await?;
        let update = LinkUpdate {
            rating: Some(change.rating),
            ..Default::default()
        };
        let link = self.upserter.resolve_link(&poc.id, use_case.id(), &update).await?;

        let comment_id = match change.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => Some(
                self.append_comment(
                    &poc,
                    link.id(),
                    author,
                    CommentKind::Feedback,
                    text.to_string(),
                    Some(change.rating),
                )
                .await?,
            ),
            None => None,
        };

        info!(poc_uid = %poc.poc_uid, use_case = %change.use_case.code, rating = change.rating.value(), "Rated use case");
        Ok(LinkChanged {
            poc_uid: poc.poc_uid,
            use_case_code: change.use_case.code.clone(),
            version: change.use_case.version(),
            link_id: link.record.id,
            comment_id,
        })
    }

    /// Appends one feedback comment. Blank text is rejected before anything is written.
    pub async fn submit_feedback(
        &self,
        poc: &PocRef,
        use_case: &UseCaseSpec,
        text: &str,
        rating: Option<Rating>,
    ) -> ServiceResult<LinkChanged> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::Validation {
                tag: "missing_text",
                details: "Feedback text must not be empty".to_string(),
            });
        }
        let submission = CommentSubmission {
            poc: poc.clone(),
            use_case: use_case.clone(),
            kind: CommentKind::Feedback,
            text: text.to_string(),
            rating,
        };
        self.add_comment(&submission).await
    }

    /// Appends one comment. The link is created if it does not exist yet.
    pub async fn add_comment(&self, submission: &CommentSubmission) -> ServiceResult<LinkChanged> {
        let (poc, author) = self.resolve_poc(&submission.poc).await?;
        let use_case = self.upserter.resolve_use_case(&submission.use_case).await?;
        let link = self
            .upserter
            .resolve_link(&poc.id, use_case.id(), &LinkUpdate::default())
            .await?;

        let comment_id = self
            .append_comment(
                &poc,
                link.id(),
                author,
                submission.kind,
                submission.text.clone(),
                submission.rating,
            )
            .await?;

        info!(poc_uid = %poc.poc_uid, use_case = %submission.use_case.code, kind = %submission.kind, "Added comment");
        Ok(LinkChanged {
            poc_uid: poc.poc_uid,
            use_case_code: submission.use_case.code.clone(),
            version: submission.use_case.version(),
            link_id: link.record.id,
            comment_id: Some(comment_id),
        })
    }
}
