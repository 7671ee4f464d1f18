mod check_in;
mod errors;
mod expiry;
mod projection;
mod queries;
mod service;

pub use check_in::{
    CHECK_IN_PREFIX, CheckInAction, CheckInOutcome, ScanPurpose, check_in, check_in_code,
    parse_check_in_code,
};
pub use errors::{LoanRequestError, Result};
pub use expiry::{NeverExpire, PendingDeadline, expire_pending_requests};
pub use projection::{project_request, request_view};
pub use queries::{ListRequestsQuery, allowed_actions, get_request, list_requests, request_history};
pub use service::{
    DEFAULT_CONFLICT_RETRY_LIMIT, EngineSettings, ServiceDependencies, activate_request,
    cancel_request, create_request, return_request, verify_request,
};
