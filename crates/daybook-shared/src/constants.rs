/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Name of the HTTP-only cookie carrying the session JWT
pub const SESSION_COOKIE: &str = "token";

/// Session lifetime in days
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Global policy: requests per client per minute
pub const DEFAULT_REQUESTS_PER_MINUTE: u64 = 60;

/// Per-user quota: entries per user per seven days
pub const DEFAULT_WEEKLY_ENTRY_LIMIT: u64 = 5;

/// Counter namespaces, one per admission policy
pub const GLOBAL_RATE_NAMESPACE: &str = "global-ip";
pub const ENTRY_QUOTA_NAMESPACE: &str = "entry-quota";

/// Subject used when no client address can be determined
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Fallbacks used when text derivation fails
pub const DEFAULT_TITLE: &str = "A Moment in Time";
pub const DEFAULT_IMAGE_PROMPT: &str = "A peaceful moment captured in time";
pub const DEFAULT_AUTHOR_STYLE: &str = "In My Own Words";

/// Credential rules
pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Longest accepted value for a single profile field (characters)
pub const MAX_PROFILE_FIELD_LEN: usize = 64;

/// Longest accepted diary entry (characters)
pub const MAX_CONTENT_LEN: usize = 10_000;

/// Folder used on the hosted image service
pub const IMAGE_FOLDER: &str = "diary-entries";

/// Maximum image size accepted by the local image host (20 MiB)
pub const MAX_IMAGE_SIZE: usize = 20 * 1024 * 1024;
