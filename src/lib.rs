pub mod activity_scraper;
pub mod config;
pub mod context;
pub mod course_scraper;
pub mod error;
pub mod mask;
pub mod mirror;
pub mod ratelimit;
pub mod requests;
pub mod section_scraper;
pub mod text_manipulators;
pub mod tree;
pub mod urls;

pub use context::SyncContext;
pub use course_scraper::CourseScraper;
pub use error::ScrapeError;
pub use mask::RuleSet;
pub use mirror::{Mirror, SyncReport};
pub use section_scraper::SectionScraper;
pub use tree::RemoteTree;
