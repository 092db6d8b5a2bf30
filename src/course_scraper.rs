use log::{info, warn};
use scraper::{Html, Selector};

use crate::requests::PortalClient;
use crate::text_manipulators::{extract_text, normalized};
use crate::tree::Course;
use crate::urls::{LinkIdExtractor, PortalUrls};

/// Walks the dashboard and collects every course the user is enrolled in.
#[derive(Debug)]
pub struct CourseScraper {
    pub url: String,
    pub courses: Vec<Course>,
}

impl CourseScraper {
    pub fn new(url: String) -> Self {
        Self {
            url,
            courses: Vec::new(),
        }
    }

    pub async fn scrape(
        &mut self,
        client: &PortalClient,
        ids: &LinkIdExtractor,
        urls: &PortalUrls,
    ) -> anyhow::Result<()> {
        let html = client.fetch_url_body(&self.url).await?;
        self.courses = parse_course_list(&html, ids, urls);
        info!("found {} courses on {}", self.courses.len(), self.url);
        Ok(())
    }
}

fn parse_course_list(html: &str, ids: &LinkIdExtractor, urls: &PortalUrls) -> Vec<Course> {
    // The theme renders each enrolled course as an accordion anchor.
    let course_selector = Selector::parse("a.jmu-accordion").unwrap();

    let document = Html::parse_document(html);
    let mut courses = Vec::new();
    for link in document.select(&course_selector) {
        let title = extract_text(link);
        let Some(href) = link.value().attr("href") else {
            warn!("course entry without href: {}", title.trim());
            continue;
        };
        let id = match ids.course_id(href) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping course entry: {e}");
                continue;
            }
        };
        courses.push(Course {
            title: normalized(title.trim()),
            id,
            url: urls.absolutize(href),
            sections: Vec::new(),
        });
    }
    courses
}

#[cfg(test)]
mod tests {
    use super::*;

    const DASHBOARD: &str = r#"
        <html><body>
        <div class="coursebox">
            <a class="jmu-accordion" href="https://c.test/course/view.php?id=101">Linear Algebra</a>
        </div>
        <div class="coursebox">
            <a class="jmu-accordion" href="/course/view.php?id=102">Topology I/II</a>
        </div>
        <a href="https://c.test/course/view.php?id=999">not a course entry</a>
        </body></html>"#;

    #[test]
    fn only_accordion_anchors_become_courses() {
        let ids = LinkIdExtractor::new().unwrap();
        let urls = PortalUrls::new("https://c.test");
        let courses = parse_course_list(DASHBOARD, &ids, &urls);
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].title, "Linear Algebra");
        assert_eq!(courses[0].id, "101");
        assert_eq!(courses[0].url, "https://c.test/course/view.php?id=101");
        assert_eq!(courses[1].title, "Topology IorII");
        assert_eq!(courses[1].id, "102");
        // Relative hrefs are resolved against the portal base.
        assert_eq!(courses[1].url, "https://c.test/course/view.php?id=102");
    }

    #[test]
    fn entries_without_an_id_are_skipped() {
        let ids = LinkIdExtractor::new().unwrap();
        let urls = PortalUrls::new("https://c.test");
        let html = r#"<a class="jmu-accordion" href="https://c.test/broken">Broken</a>"#;
        assert!(parse_course_list(html, &ids, &urls).is_empty());
    }
}
