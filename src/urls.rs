use anyhow::Context;
use regex::Regex;

use crate::error::ScrapeError;

/// The fixed set of portal pages this tool knows how to walk.
///
/// Everything hangs off the Moodle root, e.g.
/// `https://wuecampus2.uni-wuerzburg.de/moodle`.
pub struct PortalUrls {
    base: String,
}

impl PortalUrls {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn login_page(&self) -> String {
        format!("{}/login/index.php", self.base)
    }

    /// The "my courses" dashboard listing every enrolled course.
    pub fn courses_page(&self) -> String {
        format!("{}/my/index.php", self.base)
    }

    /// Relative hrefs occasionally show up in themed markup.
    pub fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}/{}", self.base, href.trim_start_matches('/'))
        }
    }
}

/// Pulls numeric query ids out of portal hrefs.
pub struct LinkIdExtractor {
    course_id_regex: Regex,
    section_id_regex: Regex,
}

impl LinkIdExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let course_id_regex = Regex::new(r"[?&]id=(\d+)").context("course id regex")?;
        let section_id_regex = Regex::new(r"[?&]section=(\d+)").context("section id regex")?;
        Ok(Self {
            course_id_regex,
            section_id_regex,
        })
    }

    pub fn course_id(&self, href: &str) -> Result<String, ScrapeError> {
        capture(&self.course_id_regex, href, "course id")
    }

    pub fn section_id(&self, href: &str) -> Result<String, ScrapeError> {
        capture(&self.section_id_regex, href, "section id")
    }
}

fn capture(regex: &Regex, href: &str, what: &'static str) -> Result<String, ScrapeError> {
    regex
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ScrapeError::LinkExtraction {
            what,
            href: href.to_string(),
        })
}
