pub mod approval;
pub mod fingerprint;
pub mod pipeline;
pub mod rate_limit;
pub mod tokens;

pub use approval::{ApprovalQueue, ApprovalStatus, PendingApproval};
pub use pipeline::{AccessRequest, Authorizer, DEFAULT_APPROVAL_TIMEOUT, TokenIdentity, parse_bearer};
pub use rate_limit::{RateLimitExceeded, RateLimiter, RateLimits, RateWindow};
pub use tokens::{GlobalRules, NewToken, Scope, TokenRecord, TokenStore, TokenSummary};
