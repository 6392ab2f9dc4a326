//! API constants

/// Versioned prefix for every JSON route.
pub const API_PREFIX: &str = "/api/v1";

/// Header carrying the authenticated principal, set by the fronting auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Owner recorded when no principal header is present.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Room for multipart boundaries and the small text fields around a fragment.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub const SSE_KEEP_ALIVE_SECS: u64 = 15;
