//! crates/poc_portal_core/src/domain.rs
//!
//! Typed views of the records kept by the backend record store, together with the
//! small value types (ratings, comment kinds) that the public operations validate.
//!
//! The backend owns the actual storage. These structs are decoded from its generic
//! JSON records and ignore any field they do not know about.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Collection Names and Defaults
//=========================================================================================

pub mod collections {
    pub const USERS: &str = "users";
    pub const USE_CASES: &str = "use_cases";
    pub const POCS: &str = "pocs";
    pub const POC_USE_CASES: &str = "poc_use_cases";
    pub const COMMENTS: &str = "comments";
    pub const DAILY_STATUS: &str = "daily_status";
}

/// Role assigned to service engineers created on first reference.
pub const DEFAULT_ROLE: &str = "se";

/// Risk status every new POC starts with.
pub const DEFAULT_RISK_STATUS: &str = "on_track";

/// Version assumed when a use case reference omits one.
pub const DEFAULT_USE_CASE_VERSION: i64 = 1;

/// Generates a fresh external POC identifier, e.g. `POC-3F2A9C01B7D4`.
pub fn generate_poc_uid() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("POC-{}", hex[..12].to_uppercase())
}

//=========================================================================================
// Records
//=========================================================================================

/// A record type stored in one backend collection.
pub trait Record: DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

/// A service engineer (or any other portal user).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

/// A versioned use case, identified by `(code, version)`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UseCase {
    pub id: String,
    pub code: String,
    pub version: i64,
    pub title: String,
    pub description: Option<String>,
    pub product_family: Option<String>,
    pub product: Option<String>,
    pub category: Option<String>,
    pub estimate_hours: Option<f64>,
    pub is_customer_prep: Option<bool>,
    pub author: Option<String>,
}

/// A proof-of-concept project owned by one service engineer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Poc {
    pub id: String,
    pub poc_uid: String,
    pub name: String,
    pub customer_name: Option<String>,
    pub partner: Option<String>,
    pub product: Option<String>,
    /// Id of the owning user.
    pub se: String,
    pub prep_start_date: Option<String>,
    pub poc_start_date: Option<String>,
    pub poc_end_date_plan: Option<String>,
    pub poc_end_date_actual: Option<String>,
    pub is_active: bool,
    pub is_completed: bool,
    pub risk_status: Option<String>,
    pub last_daily_update_at: Option<String>,
    pub deregistered_at: Option<String>,
}

/// The join record between a POC and a use case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PocUseCase {
    pub id: String,
    pub poc: String,
    pub use_case: String,
    pub is_active: bool,
    pub is_completed: bool,
    pub completed_at: Option<String>,
    pub rating: Option<i64>,
    pub order: Option<i64>,
    pub is_customer_prep: Option<bool>,
    pub estimate_hours: Option<f64>,
}

impl PocUseCase {
    /// Whether a completion timestamp is present. The backend reports unset dates as "".
    pub fn has_completion_stamp(&self) -> bool {
        self.completed_at.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// An append-only feedback or question entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    pub poc: String,
    pub poc_use_case: Option<String>,
    pub author: Option<String>,
    pub kind: String,
    pub text: String,
    pub rating: Option<i64>,
    pub created: Option<String>,
}

macro_rules! impl_record {
    ($ty:ty, $collection:expr) => {
        impl Record for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

impl_record!(User, collections::USERS);
impl_record!(UseCase, collections::USE_CASES);
impl_record!(Poc, collections::POCS);
impl_record!(PocUseCase, collections::POC_USE_CASES);
impl_record!(Comment, collections::COMMENTS);

//=========================================================================================
// Validated Values
//=========================================================================================

/// Rejections raised while validating inbound values, before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),
    #[error("kind must be 'feedback' or 'question', got '{0}'")]
    InvalidKind(String),
}

impl ValidationError {
    pub fn tag(&self) -> &'static str {
        match self {
            ValidationError::InvalidRating(_) => "invalid_rating",
            ValidationError::InvalidKind(_) => "invalid_kind",
        }
    }
}

/// A star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::InvalidRating(value))
        }
    }

    /// Validates an optional rating, passing `None` through.
    pub fn parse_optional(value: Option<i64>) -> Result<Option<Self>, ValidationError> {
        value.map(Self::new).transpose()
    }

    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Feedback,
    Question,
}

impl CommentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentKind::Feedback => "feedback",
            CommentKind::Question => "question",
        }
    }
}

impl FromStr for CommentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feedback" => Ok(CommentKind::Feedback),
            "question" => Ok(CommentKind::Question),
            other => Err(ValidationError::InvalidKind(other.to_string())),
        }
    }
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Natural-Key Inputs
//=========================================================================================

/// Everything a caller may say about a use case. Only `code` is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UseCaseSpec {
    pub code: String,
    pub version: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub product_family: Option<String>,
    pub product: Option<String>,
    pub category: Option<String>,
    pub estimate_hours: Option<f64>,
    pub is_customer_prep: Option<bool>,
    pub author: Option<String>,
}

impl UseCaseSpec {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn version(&self) -> i64 {
        match self.version {
            Some(v) if v > 0 => v,
            _ => DEFAULT_USE_CASE_VERSION,
        }
    }

    /// Title used when creating a record without one: the last path segment of the
    /// code with dashes turned into spaces, title-cased.
    pub fn default_title(&self) -> String {
        let last = self.code.rsplit('/').next().unwrap_or(&self.code);
        title_case(&last.replace('-', " "))
    }
}

/// Desired state of a POC/use-case link. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkUpdate {
    pub is_active: Option<bool>,
    pub is_completed: Option<bool>,
    /// Stamp `completed_at` even when the link already is completed.
    pub restamp_completion: bool,
    pub order: Option<i64>,
    pub rating: Option<Rating>,
    pub is_customer_prep: Option<bool>,
    pub estimate_hours: Option<f64>,
}

/// Turns `"jane.doe"` into `"Jane Doe"`.
pub fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email);
    title_case(&local.replace('.', " "))
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_accepts_only_one_to_five() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert_eq!(Rating::new(6), Err(ValidationError::InvalidRating(6)));
        assert_eq!(Rating::parse_optional(None), Ok(None));
    }

    #[test]
    fn comment_kind_parses_known_tags() {
        assert_eq!("feedback".parse::<CommentKind>(), Ok(CommentKind::Feedback));
        assert_eq!("question".parse::<CommentKind>(), Ok(CommentKind::Question));
        let err = "praise".parse::<CommentKind>().unwrap_err();
        assert_eq!(err.tag(), "invalid_kind");
    }

    #[test]
    fn default_title_uses_last_code_segment() {
        let spec = UseCaseSpec::new("machine-identity/cert-dashboard");
        assert_eq!(spec.default_title(), "Cert Dashboard");
        assert_eq!(UseCaseSpec::new("dash").default_title(), "Dash");
    }

    #[test]
    fn version_defaults_to_one() {
        assert_eq!(UseCaseSpec::new("dash").version(), 1);
        let mut spec = UseCaseSpec::new("dash");
        spec.version = Some(3);
        assert_eq!(spec.version(), 3);
    }

    #[test]
    fn display_name_is_derived_from_local_part() {
        assert_eq!(display_name_from_email("jane.doe@example.com"), "Jane Doe");
    }

    #[test]
    fn poc_uid_has_expected_shape() {
        let uid = generate_poc_uid();
        assert!(uid.starts_with("POC-"));
        assert_eq!(uid.len(), 16);
        assert!(uid[4..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn link_decodes_backend_empty_dates() {
        let link: PocUseCase = serde_json::from_value(serde_json::json!({
            "id": "l1", "poc": "p1", "use_case": "u1", "completed_at": "", "rating": 0
        }))
        .unwrap();
        assert!(!link.has_completion_stamp());
        assert!(!link.is_active);
    }
}
