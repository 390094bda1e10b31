pub mod domain;
pub mod filter;
pub mod ports;
pub mod reconcile;
pub mod service;
pub mod upsert;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use domain::{Comment, CommentKind, LinkUpdate, Poc, PocUseCase, Rating, UseCase, UseCaseSpec, User, ValidationError};
pub use filter::Filter;
pub use ports::{Clock, PortError, PortResult, RecordStore, SystemClock};
pub use reconcile::{ReconcileSummary, StatusEntry};
pub use service::{
    Completion, CommentSubmission, DailyUpdate, Deregistered, LinkChanged, OwnerRef, PocRef,
    PortalService, RatingChange, Registered, Registration, ServiceError, ServiceResult, StatusApplied,
};
pub use upsert::{PocDetails, Upserted, Upserter};
