use thiserror::Error;

/// Failures while taking apart a portal page.
///
/// Network and filesystem problems stay `anyhow` at the call sites; this
/// enum is for markup that doesn't look like the fixed templates we walk.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("selector matched nothing on the page: {0}")]
    MissingSelector(String),

    #[error("login form not found on {0}")]
    LoginFormMissing(String),

    #[error("still unauthenticated after submitting credentials for user {0}")]
    LoginRejected(String),

    #[error("could not extract {what} from link: {href}")]
    LinkExtraction { what: &'static str, href: String },

    #[error("could not determine an extension for file activity: {0}")]
    ExtensionUnresolved(String),
}
