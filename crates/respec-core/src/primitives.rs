//! # System Constants
//!
//! Hardcoded runtime constants for the respec CORE.
//!
//! respec starts with zero schema but fixed limits.
//! These constants are compiled into the binary and are immutable at runtime.
//!
//! ## Constants
//!
//! 1. **Pagination bounds**: Default and ceiling result limits.
//! 2. **Input limits**: Bound untrusted client parameter payloads.
//! 3. **Checkout layout**: Category directory names within a spec checkout.

/// Default number of documents returned when a client omits `limit`.
///
/// - All stored-query executions must be computationally bounded.
/// - Callers treating `count == limit` as "there may be more" rely on this.
pub const DEFAULT_RESULT_LIMIT: u64 = 1000;

/// Hard ceiling for the `limit` parameter.
///
/// Client-supplied limits are clamped to this value regardless of the
/// request, protecting the datastore from oversized result sets.
pub const MAX_RESULT_LIMIT: u64 = 10_000;

/// Default value for the `offset` parameter when omitted.
pub const DEFAULT_RESULT_OFFSET: u64 = 0;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of blocks in a filter expression.
///
/// Filter expressions are a disjunction of conjunction blocks; bounding the
/// block count prevents unbounded query amplification from a single request.
pub const MAX_FILTER_BLOCKS: usize = 64;

/// Maximum number of membership values within one filter condition.
pub const MAX_FILTER_VALUES: usize = 256;

/// Maximum length for a declared stored-query name; enforced by the loader.
pub const MAX_QUERY_NAME_LENGTH: usize = 256;

/// Maximum length for a declared parameter name; enforced by the loader.
pub const MAX_PARAM_NAME_LENGTH: usize = 256;

// =============================================================================
// CHECKOUT LAYOUT
// =============================================================================

/// Category subdirectories parsed from a spec checkout, in load order.
pub const SPEC_CATEGORIES: [&str; 4] = ["analyzers", "collections", "views", "stored_queries"];

/// Subtrees a checkout may carry that the loader tolerates but never parses.
pub const SPEC_IGNORED_SUBTREES: [&str; 2] = ["datasets", "data_sources"];

/// File at the checkout root holding the release identifier.
pub const RELEASE_ID_FILE: &str = ".release_id";

/// Version tag for the release-tracker storage format.
///
/// Increment this when making breaking changes to the stamp encoding.
pub const RELEASE_STAMP_VERSION: u8 = 1;
