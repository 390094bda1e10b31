//! services/api/src/web/protocol.rs
//!
//! Defines the JSON bodies accepted and returned by the REST API, and how each
//! request body is checked and turned into a core command.
//!
//! Every check here runs before the service is called, so a rejected request never
//! reaches the record store.

use poc_portal_core::{
    CommentKind, CommentSubmission, Completion, DailyUpdate, Deregistered, LinkChanged, OwnerRef,
    PocDetails, PocRef, Rating, RatingChange, Registered, Registration, StatusApplied, StatusEntry,
    UseCaseSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::ApiError;

//=========================================================================================
// Field Helpers
//=========================================================================================

/// A trimmed, non-empty string, or `None`.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn require(fields: &[(&'static str, &Option<String>)]) -> Result<(), ApiError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::missing_fields(&missing))
    }
}

/// Accepts integers and integer strings.
fn parse_rating(value: Option<&Value>) -> Result<Option<Rating>, ApiError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    let raw = raw.ok_or_else(|| ApiError::BadRequest {
        tag: "invalid_rating",
        details: "Rating must be an integer between 1 and 5".to_string(),
    })?;
    Ok(Some(Rating::new(raw)?))
}

//=========================================================================================
// Registration
//=========================================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[serde(alias = "sa_email")]
    pub se_email: Option<String>,
    #[serde(alias = "sa_name")]
    pub se_name: Option<String>,
    #[serde(alias = "prospect")]
    pub customer_name: Option<String>,
    pub product: Option<String>,
    pub partner: Option<String>,
    pub prep_start_date: Option<String>,
    pub poc_start_date: Option<String>,
    #[serde(alias = "poc_end_date")]
    pub poc_end_date_plan: Option<String>,
}

impl RegisterRequest {
    pub fn into_registration(self) -> Result<Registration, ApiError> {
        require(&[
            ("se_email", &self.se_email),
            ("customer_name", &self.customer_name),
            ("product", &self.product),
        ])?;

        Ok(Registration {
            se_email: present(&self.se_email).unwrap_or_default(),
            se_name: present(&self.se_name),
            customer_name: present(&self.customer_name).unwrap_or_default(),
            product: present(&self.product).unwrap_or_default(),
            details: PocDetails {
                partner: present(&self.partner),
                prep_start_date: present(&self.prep_start_date),
                poc_start_date: present(&self.poc_start_date),
                poc_end_date_plan: present(&self.poc_end_date_plan),
                poc_end_date_actual: None,
            },
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub status: String,
    pub poc_uid: String,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Registered> for RegisterResponse {
    fn from(registered: Registered) -> Self {
        let created = registered.user_created;
        Self {
            status: "ok".to_string(),
            poc_uid: registered.poc_uid,
            is_new: registered.is_new,
            user_created: created.then_some(true),
            message: created
                .then(|| format!("A password reset email has been sent to {}", registered.user_email)),
            user_email: created.then_some(registered.user_email),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DeregisterRequest {
    pub poc_uid: Option<String>,
}

impl DeregisterRequest {
    pub fn poc_uid(&self) -> Result<String, ApiError> {
        present(&self.poc_uid).ok_or_else(missing_poc_uid)
    }
}

fn missing_poc_uid() -> ApiError {
    ApiError::BadRequest {
        tag: "missing_poc_uid",
        details: "poc_uid is required".to_string(),
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeregisterResponse {
    pub status: String,
    pub poc_uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Deregistered> for DeregisterResponse {
    fn from(outcome: Deregistered) -> Self {
        Self {
            status: "ok".to_string(),
            message: (!outcome.found)
                .then(|| "POC not found (already deregistered or never existed)".to_string()),
            poc_uid: outcome.poc_uid,
        }
    }
}

//=========================================================================================
// Status Snapshots
//=========================================================================================

/// One use case as listed in a heartbeat or daily update.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UseCaseStatus {
    pub code: Option<String>,
    pub version: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub product_family: Option<String>,
    pub product: Option<String>,
    pub category: Option<String>,
    pub estimate_hours: Option<f64>,
    pub is_customer_prep: Option<bool>,
    pub author: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
    /// Defaults to `false`.
    pub is_completed: Option<bool>,
    pub order: Option<i64>,
    #[schema(value_type = Option<i64>)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}

impl UseCaseStatus {
    pub fn into_entry(self) -> Result<StatusEntry, ApiError> {
        let rating = parse_rating(self.rating.as_ref())?;
        Ok(StatusEntry {
            use_case: UseCaseSpec {
                code: present(&self.code).unwrap_or_default(),
                version: self.version,
                title: present(&self.title),
                description: self.description,
                product_family: self.product_family,
                product: self.product,
                category: self.category,
                estimate_hours: self.estimate_hours,
                is_customer_prep: self.is_customer_prep,
                author: self.author,
            },
            is_active: self.is_active,
            is_completed: self.is_completed,
            order: self.order,
            rating,
            feedback: self.feedback,
            questions: self.questions,
        })
    }
}

fn into_entries(use_cases: Vec<UseCaseStatus>) -> Result<Vec<StatusEntry>, ApiError> {
    use_cases.into_iter().map(UseCaseStatus::into_entry).collect()
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    pub poc_uid: Option<String>,
    pub use_cases: Option<Vec<UseCaseStatus>>,
}

impl HeartbeatRequest {
    pub fn into_parts(self) -> Result<(String, Vec<StatusEntry>), ApiError> {
        let poc_uid = present(&self.poc_uid).ok_or_else(missing_poc_uid)?;
        let use_cases = self
            .use_cases
            .filter(|list| !list.is_empty())
            .ok_or_else(|| ApiError::BadRequest {
                tag: "missing_use_cases",
                details: "use_cases array is required".to_string(),
            })?;
        Ok((poc_uid, into_entries(use_cases)?))
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct DailyUpdateRequest {
    pub se_email: Option<String>,
    pub poc_uid: Option<String>,
    pub poc_name: Option<String>,
    pub customer_name: Option<String>,
    pub partner: Option<String>,
    pub prep_start_date: Option<String>,
    pub poc_start_date: Option<String>,
    #[serde(alias = "poc_end_date_planned")]
    pub poc_end_date_plan: Option<String>,
    pub poc_end_date_actual: Option<String>,
    #[serde(default)]
    pub use_cases: Vec<UseCaseStatus>,
}

impl DailyUpdateRequest {
    /// `raw` is the body as received; it is stored verbatim in the audit snapshot.
    pub fn into_daily_update(self, raw: Value) -> Result<DailyUpdate, ApiError> {
        require(&[("se_email", &self.se_email), ("poc_uid", &self.poc_uid)])?;

        Ok(DailyUpdate {
            se_email: present(&self.se_email).unwrap_or_default(),
            poc_uid: present(&self.poc_uid).unwrap_or_default(),
            poc_name: present(&self.poc_name),
            customer_name: present(&self.customer_name),
            details: PocDetails {
                partner: present(&self.partner),
                prep_start_date: present(&self.prep_start_date),
                poc_start_date: present(&self.poc_start_date),
                poc_end_date_plan: present(&self.poc_end_date_plan),
                poc_end_date_actual: present(&self.poc_end_date_actual),
            },
            entries: into_entries(self.use_cases)?,
            raw,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub poc_uid: String,
    pub use_cases_processed: usize,
    pub use_cases_skipped: usize,
    pub links_created: usize,
    pub links_deactivated: usize,
    pub comments_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_written: Option<bool>,
}

impl From<StatusApplied> for StatusResponse {
    fn from(applied: StatusApplied) -> Self {
        Self {
            status: "ok".to_string(),
            poc_uid: applied.poc_uid,
            use_cases_processed: applied.summary.processed,
            use_cases_skipped: applied.summary.skipped,
            links_created: applied.summary.links_created,
            links_deactivated: applied.summary.deactivated,
            comments_created: applied.summary.comments_created,
            snapshot_written: applied.snapshot_written,
        }
    }
}

//=========================================================================================
// Single Use Case Actions
//=========================================================================================

/// Names one POC and one use case. With `se_email` the POC is created when missing.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UseCaseTarget {
    pub poc_uid: Option<String>,
    pub se_email: Option<String>,
    pub poc_name: Option<String>,
    pub customer_name: Option<String>,
    pub partner: Option<String>,
    pub use_case_code: Option<String>,
    pub version: Option<i64>,
    pub title: Option<String>,
    pub product_family: Option<String>,
    pub product: Option<String>,
}

impl UseCaseTarget {
    fn require(&self) -> Result<(), ApiError> {
        require(&[("poc_uid", &self.poc_uid), ("use_case_code", &self.use_case_code)])
    }

    fn poc_ref(&self) -> PocRef {
        PocRef {
            poc_uid: present(&self.poc_uid).unwrap_or_default(),
            owner: present(&self.se_email).map(|se_email| OwnerRef {
                se_email,
                poc_name: present(&self.poc_name),
                customer_name: present(&self.customer_name),
                partner: present(&self.partner),
            }),
        }
    }

    fn use_case(&self) -> UseCaseSpec {
        UseCaseSpec {
            code: present(&self.use_case_code).unwrap_or_default(),
            version: self.version,
            title: present(&self.title),
            product_family: present(&self.product_family),
            product: present(&self.product),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CompleteRequest {
    #[serde(flatten)]
    pub target: UseCaseTarget,
    /// Defaults to `true`; `false` reopens the use case.
    pub completed: Option<bool>,
    #[schema(value_type = Option<i64>)]
    pub rating: Option<Value>,
    pub text: Option<String>,
}

impl CompleteRequest {
    pub fn into_completion(self) -> Result<Completion, ApiError> {
        self.target.require()?;
        Ok(Completion {
            poc: self.target.poc_ref(),
            use_case: self.target.use_case(),
            completed: self.completed.unwrap_or(true),
            rating: parse_rating(self.rating.as_ref())?,
            text: present(&self.text),
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RatingRequest {
    #[serde(flatten)]
    pub target: UseCaseTarget,
    #[schema(value_type = i64)]
    pub rating: Option<Value>,
    pub text: Option<String>,
}

impl RatingRequest {
    pub fn into_rating_change(self) -> Result<RatingChange, ApiError> {
        self.target.require()?;
        let rating =
            parse_rating(self.rating.as_ref())?.ok_or_else(|| ApiError::missing_fields(&["rating"]))?;
        Ok(RatingChange {
            poc: self.target.poc_ref(),
            use_case: self.target.use_case(),
            rating,
            text: present(&self.text),
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    #[serde(flatten)]
    pub target: UseCaseTarget,
    pub text: Option<String>,
    #[schema(value_type = Option<i64>)]
    pub rating: Option<Value>,
}

/// A checked feedback request, ready for `PortalService::submit_feedback`.
#[derive(Debug)]
pub struct Feedback {
    pub poc: PocRef,
    pub use_case: UseCaseSpec,
    pub text: String,
    pub rating: Option<Rating>,
}

impl FeedbackRequest {
    pub fn into_feedback(self) -> Result<Feedback, ApiError> {
        self.target.require()?;
        Ok(Feedback {
            poc: self.target.poc_ref(),
            use_case: self.target.use_case(),
            text: self.text.unwrap_or_default(),
            rating: parse_rating(self.rating.as_ref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CommentRequest {
    #[serde(flatten)]
    pub target: UseCaseTarget,
    /// `feedback` (default) or `question`.
    pub kind: Option<String>,
    pub text: Option<String>,
    #[schema(value_type = Option<i64>)]
    pub rating: Option<Value>,
}

impl CommentRequest {
    pub fn into_submission(self) -> Result<CommentSubmission, ApiError> {
        self.target.require()?;
        let kind = match self.kind.as_deref() {
            None => CommentKind::Feedback,
            Some(kind) => kind.parse::<CommentKind>()?,
        };
        let rating = parse_rating(self.rating.as_ref())?;
        let text = present(&self.text).ok_or_else(|| ApiError::BadRequest {
            tag: "missing_text",
            details: "text is required".to_string(),
        })?;

        Ok(CommentSubmission {
            poc: self.target.poc_ref(),
            use_case: self.target.use_case(),
            kind,
            text,
            rating,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LinkResponse {
    pub status: String,
    pub poc_uid: String,
    pub use_case_code: String,
    pub version: i64,
    pub poc_use_case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i64>,
}

impl From<LinkChanged> for LinkResponse {
    fn from(changed: LinkChanged) -> Self {
        Self {
            status: "ok".to_string(),
            poc_uid: changed.poc_uid,
            use_case_code: changed.use_case_code,
            version: changed.version,
            poc_use_case_id: changed.link_id,
            comment_id: changed.comment_id,
            completed: None,
            rating: None,
        }
    }
}

//=========================================================================================
// Health
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_accepts_legacy_field_names() {
        let request: RegisterRequest = serde_json::from_value(json!({
            "sa_email": "a@x.com",
            "prospect": "Acme",
            "product": "P1",
            "poc_end_date": "2026-01-03"
        }))
        .unwrap();

        let registration = request.into_registration().unwrap();

        assert_eq!(registration.se_email, "a@x.com");
        assert_eq!(registration.customer_name, "Acme");
        assert_eq!(registration.details.poc_end_date_plan.as_deref(), Some("2026-01-03"));
    }

    #[test]
    fn register_reports_all_missing_fields() {
        let request: RegisterRequest =
            serde_json::from_value(json!({ "se_email": "a@x.com", "product": " " })).unwrap();

        let err = request.into_registration().unwrap_err();

        assert_eq!(err.to_string(), "customer_name, product required");
    }

    #[test]
    fn ratings_accept_numeric_strings_only_in_range() {
        assert_eq!(parse_rating(Some(&json!("4"))).unwrap().map(Rating::value), Some(4));
        assert_eq!(parse_rating(Some(&json!(null))).unwrap(), None);
        assert!(parse_rating(Some(&json!(6))).is_err());
        assert!(parse_rating(Some(&json!("five"))).is_err());
        assert!(parse_rating(Some(&json!(4.5))).is_err());
    }

    #[test]
    fn daily_update_accepts_planned_end_alias() {
        let raw = json!({
            "se_email": "se@x.com",
            "poc_uid": "ACME-POC-1",
            "poc_end_date_planned": "2026-02-01",
            "use_cases": [{ "code": "dash", "feedback": ["ok"] }]
        });
        let request: DailyUpdateRequest = serde_json::from_value(raw.clone()).unwrap();

        let update = request.into_daily_update(raw.clone()).unwrap();

        assert_eq!(update.details.poc_end_date_plan.as_deref(), Some("2026-02-01"));
        assert_eq!(update.entries.len(), 1);
        assert_eq!(update.entries[0].feedback, vec!["ok".to_string()]);
        assert_eq!(update.raw, raw);
    }

    #[test]
    fn heartbeat_requires_a_use_case_list() {
        let request: HeartbeatRequest =
            serde_json::from_value(json!({ "poc_uid": "POC-1", "use_cases": [] })).unwrap();

        let err = request.into_parts().unwrap_err();

        assert!(matches!(err, ApiError::BadRequest { tag: "missing_use_cases", .. }));
    }

    #[test]
    fn target_with_email_carries_an_owner() {
        let request: CompleteRequest = serde_json::from_value(json!({
            "poc_uid": "ACME-POC-1",
            "se_email": "se@x.com",
            "use_case_code": "dash",
            "version": 2
        }))
        .unwrap();

        let completion = request.into_completion().unwrap();

        assert!(completion.completed);
        assert_eq!(completion.use_case.version(), 2);
        assert_eq!(completion.poc.owner.unwrap().se_email, "se@x.com");
    }

    #[test]
    fn comment_kind_defaults_to_feedback_and_rejects_unknown_tags() {
        let ok: CommentRequest = serde_json::from_value(json!({
            "poc_uid": "P", "use_case_code": "dash", "text": "hi"
        }))
        .unwrap();
        assert_eq!(ok.into_submission().unwrap().kind, CommentKind::Feedback);

        let bad: CommentRequest = serde_json::from_value(json!({
            "poc_uid": "P", "use_case_code": "dash", "text": "hi", "kind": "praise"
        }))
        .unwrap();
        assert!(matches!(
            bad.into_submission().unwrap_err(),
            ApiError::BadRequest { tag: "invalid_kind", .. }
        ));
    }
}
