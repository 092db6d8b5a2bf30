use log::{debug, warn};
use scraper::{Html, Selector};

use crate::activity_scraper::parse_activities;
use crate::requests::PortalClient;
use crate::text_manipulators::{extract_first_text, extract_text, normalized};
use crate::tree::{Section, SectionSource};
use crate::urls::{LinkIdExtractor, PortalUrls};

/// Walks one course page and collects its sections.
///
/// Two shapes exist side by side: summary entries linking to their own page
/// (content scraped later, see `activity_scraper`), and inline sections
/// whose activities already sit on the course page and get parsed here.
#[derive(Debug)]
pub struct SectionScraper {
    pub url: String,
    pub sections: Vec<Section>,
}

impl SectionScraper {
    pub fn new(url: String) -> Self {
        Self {
            url,
            sections: Vec::new(),
        }
    }

    pub async fn scrape(
        &mut self,
        client: &PortalClient,
        ids: &LinkIdExtractor,
        urls: &PortalUrls,
    ) -> anyhow::Result<()> {
        let html = client.fetch_url_body(&self.url).await?;
        self.sections = parse_course_page(&html, ids, urls);
        debug!("{}: {} sections", self.url, self.sections.len());
        Ok(())
    }
}

fn parse_course_page(html: &str, ids: &LinkIdExtractor, urls: &PortalUrls) -> Vec<Section> {
    let summary_selector = Selector::parse("li.section-summary").unwrap();
    let section_selector = Selector::parse("li.section").unwrap();
    let link_selector = Selector::parse("a").unwrap();
    let name_selector = Selector::parse(".sectionname").unwrap();

    let document = Html::parse_document(html);
    let mut sections = Vec::new();

    for summary in document.select(&summary_selector) {
        let Some(link) = summary.select(&link_selector).next() else {
            continue;
        };
        let title = extract_text(link);
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let id = match ids.section_id(href) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping section entry: {e}");
                continue;
            }
        };
        sections.push(Section {
            title: normalized(title.trim()),
            source: SectionSource::Linked {
                url: urls.absolutize(href),
                id,
            },
            files: Vec::new(),
            assignments: Vec::new(),
        });
    }

    for section in document.select(&section_selector) {
        // Summary entries also carry the plain section class.
        let is_summary = section.value().attr("class").is_some_and(|classes| {
            classes.split_whitespace().any(|token| token == "section-summary")
        });
        if is_summary {
            continue;
        }
        let title = section
            .select(&name_selector)
            .next()
            .map(extract_text)
            .unwrap_or_else(|| extract_first_text(section));
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        let parsed = parse_activities(section, urls);
        sections.push(Section {
            title: normalized(title),
            source: SectionSource::Inline,
            files: parsed.files,
            assignments: parsed.assignments,
        });
    }

    sections
}
