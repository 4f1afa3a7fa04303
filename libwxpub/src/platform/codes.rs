//! Platform error code translation
//!
//! The platform reports failures as a numeric `errcode` plus a terse English
//! `errmsg`. The raw message rarely says what to do about the problem, so
//! every code we surface goes through this table first.
//!
//! # Example
//!
//! ```
//! use libwxpub::platform::codes::describe;
//!
//! assert_eq!(describe(40164), "Caller IP is not on the account's API whitelist");
//! assert_eq!(describe(123456), "Unrecognized platform error");
//! ```

/// Codes that mean the access token itself was rejected.
const TOKEN_REJECTION_CODES: [i64; 3] = [40001, 40014, 42001];

static CODE_TABLE: &[(i64, &str)] = &[
    (-1, "Platform is busy, try again later"),
    (40001, "Invalid credential: app secret is wrong or the access token is invalid"),
    (40002, "Invalid grant_type"),
    (40004, "Invalid media type"),
    (40005, "Unsupported file type for this media kind"),
    (40006, "Invalid file size"),
    (40007, "Invalid media_id"),
    (40009, "Image exceeds the size limit for this media kind"),
    (40010, "Voice file exceeds the size limit"),
    (40011, "Video file exceeds the size limit"),
    (40013, "Invalid app id"),
    (40014, "Invalid access token"),
    (40125, "Invalid app secret"),
    (40164, "Caller IP is not on the account's API whitelist"),
    (40243, "App secret has been frozen, reset it in the platform console"),
    (41001, "Access token is missing"),
    (41002, "App id is missing"),
    (41004, "App secret is missing"),
    (41005, "Media data is missing from the upload"),
    (42001, "Access token has expired"),
    (44001, "Uploaded media is empty"),
    (45001, "Media size is out of limit"),
    (45002, "Article content is too long"),
    (45003, "Title is too long"),
    (45004, "Description is too long"),
    (45009, "Daily API quota reached"),
    (45011, "API called too frequently, slow down"),
    (48001, "API not authorized for this account type"),
    (50001, "User is not authorized for this API"),
    (50002, "User is restricted, possibly for a policy violation"),
];

/// Translate a platform error code into a human-readable cause.
pub fn describe(code: i64) -> &'static str {
    CODE_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| *text)
        .unwrap_or("Unrecognized platform error")
}

/// Whether the code means the cached access token should be discarded.
pub fn is_token_rejection(code: i64) -> bool {
    TOKEN_REJECTION_CODES.contains(&code)
}
