//! crates/poc_portal_core/src/upsert.rs
//!
//! Idempotent "find by natural key, else create" resolvers.
//!
//! Every resolver goes through the same routine: query the first matching record,
//! patch only the fields whose supplied value differs from the stored one, or create
//! the record with defaults when nothing matches. Sequential calls with the same key
//! converge on one record. Concurrent calls are not coordinated and can race into
//! duplicate creates.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{
    collections, display_name_from_email, generate_poc_uid, Comment, CommentKind, LinkUpdate,
    Poc, PocUseCase, Rating, Record, UseCase, UseCaseSpec, User, DEFAULT_RISK_STATUS,
    DEFAULT_ROLE,
};
use crate::filter::Filter;
use crate::ports::{timestamp, Clock, PortError, PortResult, RecordStore};

const USER_LOOKUP_PAGE: u32 = 20;
const GENERATED_PASSWORD_LEN: usize = 16;

//=========================================================================================
// Patch Builder
//=========================================================================================

/// A partial-update body. Only fields that actually change are added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Sets `field` when a value is supplied and it differs from `current`.
    pub fn set_if_changed<T>(&mut self, field: &str, current: &T, desired: Option<T>)
    where
        T: PartialEq + Into<Value>,
    {
        if let Some(desired) = desired {
            if *current != desired {
                self.set(field, desired);
            }
        }
    }

    /// Like `set_if_changed` for fields that may be absent on the stored record.
    pub fn set_if_differs<T>(&mut self, field: &str, current: &Option<T>, desired: Option<T>)
    where
        T: PartialEq + Into<Value>,
    {
        if let Some(desired) = desired {
            if current.as_ref() != Some(&desired) {
                self.set(field, desired);
            }
        }
    }

    /// Date fields come back as `2025-12-04 00:00:00.000Z` while callers send
    /// `2025-12-04`, so a stored value that starts with the supplied one is unchanged.
    pub fn set_date_if_changed(&mut self, field: &str, current: &Option<String>, desired: Option<&str>) {
        let Some(desired) = desired.filter(|d| !d.is_empty()) else {
            return;
        };
        let unchanged = current
            .as_deref()
            .is_some_and(|c| !c.is_empty() && c.starts_with(desired));
        if !unchanged {
            self.set(field, desired);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

//=========================================================================================
// Resolver Inputs and Outputs
//=========================================================================================

/// The outcome of a resolver call.
#[derive(Debug, Clone)]
pub struct Upserted<R> {
    pub record: R,
    pub is_new: bool,
}

impl<R: Record> Upserted<R> {
    pub fn id(&self) -> &str {
        self.record.id()
    }
}

/// Optional POC attributes that callers may (re)state on every call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PocDetails {
    pub partner: Option<String>,
    pub prep_start_date: Option<String>,
    pub poc_start_date: Option<String>,
    pub poc_end_date_plan: Option<String>,
    pub poc_end_date_actual: Option<String>,
}

impl PocDetails {
    /// Patch-if-changed over the detail fields of an existing POC.
    pub fn patch_for(&self, poc: &Poc) -> Patch {
        let mut patch = Patch::new();
        patch.set_if_differs("partner", &poc.partner, non_empty(&self.partner));
        patch.set_date_if_changed("prep_start_date", &poc.prep_start_date, self.prep_start_date.as_deref());
        patch.set_date_if_changed("poc_start_date", &poc.poc_start_date, self.poc_start_date.as_deref());
        patch.set_date_if_changed("poc_end_date_plan", &poc.poc_end_date_plan, self.poc_end_date_plan.as_deref());
        patch.set_date_if_changed(
            "poc_end_date_actual",
            &poc.poc_end_date_actual,
            self.poc_end_date_actual.as_deref(),
        );
        patch
    }

    fn write_into(&self, body: &mut Patch) {
        let fields = [
            ("partner", &self.partner),
            ("prep_start_date", &self.prep_start_date),
            ("poc_start_date", &self.poc_start_date),
            ("poc_end_date_plan", &self.poc_end_date_plan),
            ("poc_end_date_actual", &self.poc_end_date_actual),
        ];
        for (field, value) in fields {
            if let Some(value) = non_empty(value) {
                body.set(field, value);
            }
        }
    }
}

/// A POC addressed by its external unique id, created on first reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PocDraft {
    pub poc_uid: String,
    pub owner_id: String,
    pub name: Option<String>,
    pub customer_name: Option<String>,
    pub partner: Option<String>,
}

/// A comment row to append.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentDraft {
    pub poc_id: String,
    pub link_id: Option<String>,
    pub author_id: Option<String>,
    pub kind: CommentKind,
    pub text: String,
    pub rating: Option<Rating>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn decode<R: Record>(value: Value) -> PortResult<R> {
    serde_json::from_value(value)
        .map_err(|e| PortError::Unexpected(format!("Malformed {} record: {}", R::COLLECTION, e)))
}

//=========================================================================================
// Link Field Rules
//=========================================================================================

/// Patch-if-changed for a link. Completion is stamped on the transition into
/// "completed" (or always, with `restamp_completion`) and cleared when reopened.
pub fn link_patch(existing: &PocUseCase, update: &LinkUpdate, now: &str) -> Patch {
    let mut patch = Patch::new();
    patch.set_if_changed("is_active", &existing.is_active, update.is_active);
    match update.is_completed {
        Some(true)
            if !existing.is_completed
                || update.restamp_completion
                || !existing.has_completion_stamp() =>
        {
            patch.set("is_completed", true);
            patch.set("completed_at", now);
        }
        Some(false) if existing.is_completed => {
            patch.set("is_completed", false);
            patch.set("completed_at", Value::Null);
        }
        _ => {}
    }
    patch.set_if_differs("order", &existing.order, update.order);
    patch.set_if_differs("rating", &existing.rating, update.rating.map(Rating::value));
    patch.set_if_differs("is_customer_prep", &existing.is_customer_prep, update.is_customer_prep);
    patch.set_if_differs("estimate_hours", &existing.estimate_hours, update.estimate_hours);
    patch
}

/// Create body for a new link: active and not completed unless stated otherwise.
pub fn link_create_body(poc_id: &str, use_case_id: &str, update: &LinkUpdate, now: &str) -> Value {
    let mut body = Patch::new();
    let completed = update.is_completed.unwrap_or(false);
    body.set("poc", poc_id);
    body.set("use_case", use_case_id);
    body.set("is_active", update.is_active.unwrap_or(true));
    body.set("is_completed", completed);
    if completed {
        body.set("completed_at", now);
    }
    if let Some(order) = update.order {
        body.set("order", order);
    }
    if let Some(rating) = update.rating {
        body.set("rating", rating.value());
    }
    if let Some(prep) = update.is_customer_prep {
        body.set("is_customer_prep", prep);
    }
    if let Some(hours) = update.estimate_hours {
        body.set("estimate_hours", hours);
    }
    body.into_value()
}

//=========================================================================================
// The Upserter
//=========================================================================================

/// Runs the resolvers against one record store. Cheap to clone.
#[derive(Clone)]
pub struct Upserter {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Upserter {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// The current instant in the backend's date format.
    pub fn now(&self) -> String {
        timestamp(self.clock.now())
    }

    pub fn today(&self) -> String {
        self.clock.now().date_naive().to_string()
    }

    // --- Typed record access ---

    pub async fn find_first<R: Record>(&self, filter: &Filter) -> PortResult<Option<R>> {
        let items = self.store.list(R::COLLECTION, filter, 1).await?;
        items.into_iter().next().map(decode::<R>).transpose()
    }

    pub async fn list<R: Record>(&self, filter: &Filter, per_page: u32) -> PortResult<Vec<R>> {
        let items = self.store.list(R::COLLECTION, filter, per_page).await?;
        items.into_iter().map(decode::<R>).collect()
    }

    pub async fn create<R: Record>(&self, body: Value) -> PortResult<R> {
        let created = self.store.create(R::COLLECTION, body).await?;
        decode(created)
    }

    pub async fn update<R: Record>(&self, id: &str, patch: Patch) -> PortResult<R> {
        let updated = self.store.update(R::COLLECTION, id, patch.into_value()).await?;
        decode(updated)
    }

    // --- The generic routine ---

    async fn settle<R, C, P>(&self, found: Option<R>, create: C, patch: P) -> PortResult<Upserted<R>>
    where
        R: Record,
        C: FnOnce() -> Value + Send,
        P: FnOnce(&R) -> Patch + Send,
    {
        match found {
            Some(existing) => {
                let patch = patch(&existing);
                if patch.is_empty() {
                    return Ok(Upserted { record: existing, is_new: false });
                }
                let id = existing.id().to_string();
                debug!(
                    collection = R::COLLECTION,
                    id = %id,
                    fields = ?patch.field_names(),
                    "Patching changed fields"
                );
                let record = self.update::<R>(&id, patch).await?;
                Ok(Upserted { record, is_new: false })
            }
            None => {
                let record = self.create::<R>(create()).await?;
                debug!(collection = R::COLLECTION, id = %record.id(), "Created record");
                Ok(Upserted { record, is_new: true })
            }
        }
    }

    /// Finds the first record matching `filter` and patches it, or creates one.
    pub async fn upsert<R, C, P>(&self, filter: &Filter, create: C, patch: P) -> PortResult<Upserted<R>>
    where
        R: Record,
        C: FnOnce() -> Value + Send,
        P: FnOnce(&R) -> Patch + Send,
    {
        let found = self.find_first::<R>(filter).await?;
        self.settle(found, create, patch).await
    }

    // --- Users ---

    /// Finds a user by e-mail. Addresses are stored lower-cased, so an exact match
    /// on the normalised address comes first. Older rows may carry mixed case; for
    /// those the backend's `~` (a case-insensitive substring match) returns a page of
    /// candidates and the exact address is picked on this side.
    pub async fn find_user(&self, email: &str) -> PortResult<Option<User>> {
        if let Some(user) = self.find_first::<User>(&Filter::new().eq("email", email)).await? {
            return Ok(Some(user));
        }
        let candidates: Vec<User> = self
            .list(&Filter::new().like("email", email), USER_LOOKUP_PAGE)
            .await?;
        Ok(candidates
            .into_iter()
            .find(|u| u.email.trim().eq_ignore_ascii_case(email)))
    }

    /// Resolves a user by e-mail (case-insensitive).
    pub async fn resolve_user(&self, email: &str, display_name: Option<&str>) -> PortResult<Upserted<User>> {
        let email = email.trim().to_lowercase();
        if let Some(user) = self.find_user(&email).await? {
            if user.role.as_deref().unwrap_or_default().is_empty() {
                let body = serde_json::json!({ "role": DEFAULT_ROLE });
                match self.store.update(collections::USERS, &user.id, body).await {
                    Ok(_) => info!(user_id = %user.id, "Assigned default role to existing user"),
                    Err(e) => warn!(user_id = %user.id, error = %e, "Failed to assign default role"),
                }
            }
            return Ok(Upserted { record: user, is_new: false });
        }

        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| display_name_from_email(&email));
        let password = generate_password();
        let body = serde_json::json!({
            "email": email,
            "emailVisibility": true,
            "password": password,
            "passwordConfirm": password,
            "role": DEFAULT_ROLE,
            "name": name,
            "displayName": name,
        });
        let mut user: User = self.create(body).await?;
        if user.email.is_empty() {
            user.email = email.clone();
        }
        info!(user_id = %user.id, email = %email, "Created service engineer user");

        if let Err(e) = self.store.request_password_reset(&email).await {
            warn!(email = %email, error = %e, "Could not request password reset mail");
        }
        Ok(Upserted { record: user, is_new: true })
    }

    // --- Use cases ---

    pub async fn resolve_use_case(&self, spec: &UseCaseSpec) -> PortResult<Upserted<UseCase>> {
        let version = spec.version();
        let filter = Filter::new().eq("code", spec.code.as_str()).eq("version", version);

        let create = || {
            let mut body = Patch::new();
            body.set("code", spec.code.as_str());
            body.set(
                "title",
                non_empty(&spec.title).unwrap_or_else(|| spec.default_title()),
            );
            body.set("version", version);
            let texts = [
                ("description", &spec.description),
                ("product_family", &spec.product_family),
                ("product", &spec.product),
                ("category", &spec.category),
                ("author", &spec.author),
            ];
            for (field, value) in texts {
                if let Some(value) = value {
                    body.set(field, value.as_str());
                }
            }
            if let Some(hours) = spec.estimate_hours {
                body.set("estimate_hours", hours);
            }
            if let Some(prep) = spec.is_customer_prep {
                body.set("is_customer_prep", prep);
            }
            body.into_value()
        };

        let patch = |existing: &UseCase| {
            let mut patch = Patch::new();
            patch.set_if_changed("title", &existing.title, non_empty(&spec.title));
            patch.set_if_differs("description", &existing.description, spec.description.clone());
            patch.set_if_differs("product_family", &existing.product_family, spec.product_family.clone());
            patch.set_if_differs("product", &existing.product, spec.product.clone());
            patch.set_if_differs("category", &existing.category, spec.category.clone());
            patch.set_if_differs("estimate_hours", &existing.estimate_hours, spec.estimate_hours);
            patch.set_if_differs("is_customer_prep", &existing.is_customer_prep, spec.is_customer_prep);
            patch.set_if_differs("author", &existing.author, spec.author.clone());
            patch
        };

        let resolved = self.upsert(&filter, create, patch).await?;
        if resolved.is_new {
            info!(code = %spec.code, version, "Created use case");
        }
        Ok(resolved)
    }

    // --- POCs ---

    pub async fn find_poc_by_uid(&self, poc_uid: &str) -> PortResult<Option<Poc>> {
        self.find_first(&Filter::new().eq("poc_uid", poc_uid)).await
    }

    /// Resolves a POC by its external id. An existing POC is returned untouched; the
    /// external id never changes once assigned.
    pub async fn resolve_poc_by_uid(&self, draft: &PocDraft) -> PortResult<Upserted<Poc>> {
        let filter = Filter::new().eq("poc_uid", draft.poc_uid.as_str());
        let create = || {
            let mut body = Patch::new();
            body.set("poc_uid", draft.poc_uid.as_str());
            body.set(
                "name",
                non_empty(&draft.name).unwrap_or_else(|| draft.poc_uid.clone()),
            );
            if let Some(customer) = &draft.customer_name {
                body.set("customer_name", customer.as_str());
            }
            if let Some(partner) = non_empty(&draft.partner) {
                body.set("partner", partner);
            }
            body.set("se", draft.owner_id.as_str());
            body.set("is_active", true);
            body.set("is_completed", false);
            body.set("risk_status", DEFAULT_RISK_STATUS);
            body.set("last_daily_update_at", self.now());
            body.into_value()
        };

        let resolved = self.upsert(&filter, create, |_: &Poc| Patch::new()).await?;
        if resolved.is_new {
            info!(poc_uid = %draft.poc_uid, "Created POC");
        }
        Ok(resolved)
    }

    pub async fn find_poc_by_composite(
        &self,
        owner_id: &str,
        customer_name: &str,
        product: &str,
    ) -> PortResult<Option<Poc>> {
        self.find_first(&composite_filter(owner_id, customer_name, product)).await
    }

    /// Resolves a POC by `(owner, customer, product)`. A new POC gets a generated
    /// external id; an existing one has its details patched where they changed.
    pub async fn resolve_poc_by_composite(
        &self,
        owner_id: &str,
        customer_name: &str,
        product: &str,
        details: &PocDetails,
    ) -> PortResult<Upserted<Poc>> {
        let found = self.find_poc_by_composite(owner_id, customer_name, product).await?;
        let create = || {
            let mut body = Patch::new();
            body.set("poc_uid", generate_poc_uid());
            body.set("product", product);
            body.set("name", format!("{customer_name} - {product}"));
            body.set("customer_name", customer_name);
            body.set("se", owner_id);
            body.set("is_active", true);
            body.set("is_completed", false);
            body.set("risk_status", DEFAULT_RISK_STATUS);
            body.set("last_daily_update_at", self.now());
            details.write_into(&mut body);
            body.into_value()
        };

        let resolved = self.settle(found, create, |poc: &Poc| details.patch_for(poc)).await?;
        if resolved.is_new {
            info!(poc_uid = %resolved.record.poc_uid, customer = %customer_name, product = %product, "Registered POC");
        }
        Ok(resolved)
    }

    // --- Links ---

    pub async fn resolve_link(
        &self,
        poc_id: &str,
        use_case_id: &str,
        update: &LinkUpdate,
    ) -> PortResult<Upserted<PocUseCase>> {
        let filter = Filter::new().eq("poc", poc_id).eq("use_case", use_case_id);
        let now = self.now();
        self.upsert(
            &filter,
            || link_create_body(poc_id, use_case_id, update, &now),
            |existing: &PocUseCase| link_patch(existing, update, &now),
        )
        .await
    }

    pub async fn list_links(&self, poc_id: &str, per_page: u32) -> PortResult<Vec<PocUseCase>> {
        self.list(&Filter::new().eq("poc", poc_id), per_page).await
    }

    // --- Append-only rows ---

    pub async fn add_comment(&self, draft: &CommentDraft) -> PortResult<Comment> {
        let mut body = Patch::new();
        body.set("poc", draft.poc_id.as_str());
        if let Some(link) = &draft.link_id {
            body.set("poc_use_case", link.as_str());
        }
        if let Some(author) = draft.author_id.as_deref().filter(|a| !a.is_empty()) {
            body.set("author", author);
        }
        body.set("kind", draft.kind.as_str());
        body.set("text", draft.text.as_str());
        if let Some(rating) = draft.rating {
            body.set("rating", rating.value());
        }
        let comment: Comment = self.create(body.into_value()).await?;
        debug!(comment_id = %comment.id, kind = %draft.kind, "Appended comment");
        Ok(comment)
    }

    /// Writes the raw inbound payload as a daily audit row. Failures are logged and
    /// swallowed: the snapshot is not part of the request's outcome.
    pub async fn record_snapshot(&self, poc_id: &str, owner_id: &str, payload: &Value) -> bool {
        let body = serde_json::json!({
            "poc": poc_id,
            "se": owner_id,
            "snapshot_date": self.today(),
            "payload": payload.to_string(),
        });
        match self.store.create(collections::DAILY_STATUS, body).await {
            Ok(_) => true,
            Err(e) => {
                warn!(poc_id = %poc_id, error = %e, "Failed to write daily status snapshot");
                false
            }
        }
    }
}

fn composite_filter(owner_id: &str, customer_name: &str, product: &str) -> Filter {
    Filter::new()
        .eq("se", owner_id)
        .eq("customer_name", customer_name)
        .eq("product", product)
}
