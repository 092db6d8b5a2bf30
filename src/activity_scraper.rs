use std::sync::LazyLock;

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ScrapeError;
use crate::requests::PortalClient;
use crate::text_manipulators::{extract_first_text, extract_text, normalized};
use crate::tree::{Assignment, RemoteFile, RemoteTree, Section, SectionSource};
use crate::urls::PortalUrls;

/// Activity kinds worth mirroring. Everything else (forums, quizzes,
/// wikis) is logged once and skipped.
const KIND_FILE: &str = "resource";
const KIND_ASSIGNMENT: &str = "assign";

// Extensions trusted straight from the icon or link text; anything else
// goes through the redirect probe.
const SIMPLE_EXTENSIONS: [&str; 2] = ["pdf", "zip"];

#[derive(Debug, Default)]
pub struct ParsedActivities {
    pub files: Vec<RemoteFile>,
    pub assignments: Vec<Assignment>,
}

/// Collect file and assignment activities under `scope` (a section `<li>`
/// or the section block of a dedicated section page).
pub fn parse_activities(scope: ElementRef, urls: &PortalUrls) -> ParsedActivities {
    let activity_selector = Selector::parse("li.activity").unwrap();
    let name_selector = Selector::parse(".instancename").unwrap();
    let link_selector = Selector::parse("a").unwrap();

    let mut parsed = ParsedActivities::default();
    for activity in scope.select(&activity_selector) {
        // The kind is the second class token: "activity resource modtype_…".
        let kind = activity
            .value()
            .attr("class")
            .and_then(|classes| classes.split_whitespace().nth(1))
            .unwrap_or("")
            .to_string();
        let Some(name) = activity.select(&name_selector).next() else {
            continue;
        };
        let title = extract_first_text(name);
        let Some(link) = activity.select(&link_selector).next() else {
            continue;
        };
        match kind.as_str() {
            KIND_FILE => {
                let Some(url) = file_link(link) else {
                    warn!("file activity without a link: {title}");
                    continue;
                };
                let guess = guess_extension(link);
                parsed
                    .files
                    .push(RemoteFile::new(&title, urls.absolutize(&url), guess));
            }
            KIND_ASSIGNMENT => {
                let Some(url) = link.value().attr("href") else {
                    warn!("assignment activity without a link: {title}");
                    continue;
                };
                parsed.assignments.push(Assignment {
                    title: normalized(&title),
                    url: urls.absolutize(url),
                    files: Vec::new(),
                });
            }
            other => debug!("unknown activity kind: {other}"),
        }
    }
    parsed
}

/// Resource links sometimes hide behind an `onclick` popup handler instead
/// of the href.
fn file_link(link: ElementRef) -> Option<String> {
    static RESOURCE_URL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"http[^']*resource[^']*").unwrap());
    if let Some(onclick) = link.value().attr("onclick") {
        if let Some(m) = RESOURCE_URL.find(onclick) {
            return Some(m.as_str().to_string());
        }
    }
    link.value().attr("href").map(str::to_string)
}

/// Cheap extension guess from the type icon, falling back to the link text.
/// Only trivially trustworthy answers are kept.
fn guess_extension(link: ElementRef) -> Option<String> {
    let img_selector = Selector::parse("img").unwrap();
    let primitive = match link.select(&img_selector).next() {
        Some(img) => img
            .value()
            .attr("src")
            .and_then(|src| src.rsplit('/').next())
            .unwrap_or("")
            .to_string(),
        None => extract_text(link)
            .rsplit('.')
            .next()
            .unwrap_or("")
            .trim()
            .to_string(),
    };
    if SIMPLE_EXTENSIONS.contains(&primitive.as_str()) {
        Some(primitive)
    } else {
        None
    }
}

/// Fetch a linked section's own page and fill in its activities.
/// A section id that no longer appears on the page yields no activities,
/// matching how the portal hides emptied sections.
pub async fn scrape_linked_section(
    client: &PortalClient,
    urls: &PortalUrls,
    section: &mut Section,
) -> anyhow::Result<()> {
    let SectionSource::Linked { url, id } = &section.source else {
        return Ok(());
    };
    let html = client.fetch_url_body(url).await?;
    let parsed = {
        let section_selector = Selector::parse(&format!("li#section-{id}"))
            .map_err(|_| ScrapeError::MissingSelector(format!("li#section-{id}")))?;
        let document = Html::parse_document(&html);
        match document.select(&section_selector).next() {
            Some(scope) => parse_activities(scope, urls),
            None => ParsedActivities::default(),
        }
    };
    section.files = parsed.files;
    section.assignments.extend(parsed.assignments);
    Ok(())
}

/// Fetch an assignment page and collect its attached files.
pub async fn scrape_assignment_files(
    client: &PortalClient,
    urls: &PortalUrls,
    assignment: &mut Assignment,
) -> anyhow::Result<()> {
    let html = client.fetch_url_body(&assignment.url).await?;
    assignment.files = parse_assignment_page(&html, urls);
    Ok(())
}

/// Fill in every section of the tree in one concurrent batch: the section
/// pages behind summary links, then each section's assignment pages. The
/// sections are independent, so completion order does not matter; the
/// client's rate limiter keeps the portal load bounded.
pub async fn scrape_section_contents(
    client: &PortalClient,
    urls: &PortalUrls,
    tree: &mut RemoteTree,
) {
    let mut jobs = FuturesUnordered::new();
    for course in &mut tree.courses {
        for section in &mut course.sections {
            jobs.push(async move {
                if let Err(e) = scrape_linked_section(client, urls, section).await {
                    warn!("skipping section {}: {e:#}", section.title);
                    return;
                }
                for assignment in &mut section.assignments {
                    if let Err(e) = scrape_assignment_files(client, urls, assignment).await {
                        warn!("skipping assignment {}: {e:#}", assignment.title);
                    }
                }
            });
        }
    }
    while jobs.next().await.is_some() {}
}

/// Attached files sit in the submission table, tagged with a yui html
/// config attribute.
pub fn parse_assignment_page(html: &str, urls: &PortalUrls) -> Vec<RemoteFile> {
    let item_selector = Selector::parse("li").unwrap();
    let link_selector = Selector::parse("a").unwrap();

    let document = Html::parse_document(html);
    let mut files = Vec::new();
    for item in document.select(&item_selector) {
        if item.value().attr("yuiconfig") != Some(r#"{"type":"html"}"#) {
            continue;
        }
        let Some(link) = item.select(&link_selector).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = extract_text(link);
        let guess = guess_extension(link);
        files.push(RemoteFile::new(title.trim(), urls.absolutize(href), guess));
    }
    files
}

/// Resolve every still-unknown extension with a no-redirect probe, batched
/// through the rate limiter.
pub async fn resolve_extensions(
    client: &PortalClient,
    tree: &mut RemoteTree,
) -> anyhow::Result<()> {
    let mut pending: Vec<&mut RemoteFile> = all_files_mut(tree)
        .filter(|file| file.extension.is_none())
        .collect();
    if pending.is_empty() {
        return Ok(());
    }
    debug!("resolving {} file extensions", pending.len());

    let urls: Vec<String> = pending.iter().map(|file| file.url.clone()).collect();
    let mut lookups = FuturesUnordered::new();
    for (idx, url) in urls.iter().enumerate() {
        lookups.push(async move { (idx, probe_extension(client, url).await) });
    }
    while let Some((idx, outcome)) = lookups.next().await {
        match outcome {
            Ok(Some(ext)) => pending[idx].set_extension(ext),
            Ok(None) => warn!(
                "{}",
                ScrapeError::ExtensionUnresolved(pending[idx].title.clone())
            ),
            Err(e) => warn!("extension probe for {} failed: {e:#}", pending[idx].title),
        }
    }
    Ok(())
}

fn all_files_mut(tree: &mut RemoteTree) -> impl Iterator<Item = &mut RemoteFile> + '_ {
    tree.courses.iter_mut().flat_map(|course| {
        course.sections.iter_mut().flat_map(|section| {
            section.files.iter_mut().chain(
                section
                    .assignments
                    .iter_mut()
                    .flat_map(|assignment| assignment.files.iter_mut()),
            )
        })
    })
}

async fn probe_extension(client: &PortalClient, url: &str) -> anyhow::Result<Option<String>> {
    let response = client.fetch_url_no_redirect(url).await?;
    if let Some(location) = response.headers().get(reqwest::header::LOCATION) {
        return Ok(extension_from_location(location.to_str()?));
    }
    if let Some(disposition) = response.headers().get(reqwest::header::CONTENT_DISPOSITION) {
        return Ok(extension_from_disposition(disposition.to_str()?));
    }
    Ok(None)
}

/// `…/pluginfile.php/123/Course Notes.tar.gz?forcedownload=1` → `tar.gz`.
fn extension_from_location(location: &str) -> Option<String> {
    let name = location.rsplit('/').next()?.split('?').next()?;
    let mut parts = name.split('.');
    parts.next()?;
    let ext = parts.collect::<Vec<_>>().join(".");
    (!ext.is_empty()).then_some(ext)
}

/// `attachment; filename="Notes.pdf"` → `pdf`.
fn extension_from_disposition(disposition: &str) -> Option<String> {
    let mut quoted: Vec<&str> = disposition.split('"').collect();
    if quoted.len() < 2 {
        return None;
    }
    quoted.pop();
    let name = quoted.pop()?;
    let mut parts = name.split('.');
    parts.next()?;
    let ext = parts.collect::<Vec<_>>().join(".");
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Course;
    use scraper::Html;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SECTION_FRAGMENT: &str = r##"
        <ul class="topics">
        <li id="section-3" class="section main">
        <ul>
        <li class="activity resource modtype_resource">
            <a href="/mod/resource/view.php?id=41">
                <img src="https://c.test/theme/image.php/f/pdf">
                <span class="instancename">Lecture 1<span class="accesshide"> File</span></span>
            </a>
        </li>
        <li class="activity resource modtype_resource">
            <a href="#" onclick="window.open('https://c.test/mod/resource/view.php?id=42&amp;redirect=1'); return false;">
                <span class="instancename">Script</span>
            </a>
        </li>
        <li class="activity assign modtype_assign">
            <a href="https://c.test/mod/assign/view.php?id=43">
                <span class="instancename">Sheet 1<span class="accesshide"> Assignment</span></span>
            </a>
        </li>
        <li class="activity forum modtype_forum">
            <a href="https://c.test/mod/forum/view.php?id=44">
                <span class="instancename">News</span>
            </a>
        </li>
        </ul>
        </li>
        </ul>"##;

    fn parse_fragment_activities(html: &str) -> ParsedActivities {
        let document = Html::parse_fragment(html);
        let selector = Selector::parse("li#section-3").unwrap();
        let scope = document.select(&selector).next().unwrap();
        parse_activities(scope, &PortalUrls::new("https://c.test"))
    }

    #[test]
    fn resources_and_assignments_are_split_and_forums_dropped() {
        let parsed = parse_fragment_activities(SECTION_FRAGMENT);
        assert_eq!(parsed.files.len(), 2);
        assert_eq!(parsed.assignments.len(), 1);
        assert_eq!(parsed.assignments[0].title, "Sheet 1");
    }

    #[test]
    fn icon_guess_sticks_and_onclick_links_win() {
        let parsed = parse_fragment_activities(SECTION_FRAGMENT);
        let lecture = &parsed.files[0];
        assert_eq!(lecture.title, "Lecture 1");
        assert_eq!(lecture.extension.as_deref(), Some("pdf"));
        // Relative hrefs are resolved against the portal base.
        assert_eq!(lecture.url, "https://c.test/mod/resource/view.php?id=41");

        let script = &parsed.files[1];
        assert!(script.url.contains("resource"));
        assert!(script.url.starts_with("https://c.test/mod/resource/view.php?id=42"));
        assert_eq!(script.extension, None);
    }

    #[test]
    fn assignment_pages_yield_attached_files() {
        let html = r#"
            <table><tr><td><ul>
            <li yuiconfig='{"type":"html"}'>
                <a href="/pluginfile.php/9/sheet01.pdf">sheet01.pdf</a>
            </li>
            <li><a href="https://c.test/other">not an attachment</a></li>
            </ul></td></tr></table>"#;
        let files = parse_assignment_page(html, &PortalUrls::new("https://c.test"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].title, "sheet01");
        assert_eq!(files[0].extension.as_deref(), Some("pdf"));
        assert_eq!(files[0].file_name(), "sheet01.pdf");
        assert_eq!(files[0].url, "https://c.test/pluginfile.php/9/sheet01.pdf");
    }

    fn section_page(id: u32, file_name: &str) -> String {
        format!(
            r##"<html><body><ul class="topics">
            <li id="section-{id}" class="section main"><ul>
            <li class="activity resource modtype_resource">
                <a href="/mod/resource/view.php?id=9{id}">
                    <img src="/theme/image.php/f/pdf">
                    <span class="instancename">{file_name}</span>
                </a>
            </li>
            </ul></li>
            </ul></body></html>"##
        )
    }

    fn linked_section(title: &str, url: String, id: &str) -> Section {
        Section {
            title: title.to_string(),
            source: SectionSource::Linked {
                url,
                id: id.to_string(),
            },
            files: Vec::new(),
            assignments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn section_pages_are_scraped_as_one_batch() {
        let server = MockServer::start().await;
        for (route, id, name) in [("/sec1", 1, "Notes A"), ("/sec2", 2, "Notes B")] {
            Mock::given(method("GET"))
                .and(url_path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(section_page(id, name)))
                .mount(&server)
                .await;
        }

        let urls = PortalUrls::new(&server.uri());
        let mut tree = RemoteTree {
            courses: vec![Course {
                title: "Algebra".to_string(),
                id: "1".to_string(),
                url: format!("{}/course/view.php?id=1", server.uri()),
                sections: vec![
                    linked_section("Week 1", format!("{}/sec1", server.uri()), "1"),
                    linked_section("Week 2", format!("{}/sec2", server.uri()), "2"),
                ],
            }],
        };

        let client = PortalClient::new().unwrap();
        scrape_section_contents(&client, &urls, &mut tree).await;

        let sections = &tree.courses[0].sections;
        assert_eq!(sections[0].files.len(), 1);
        assert_eq!(sections[0].files[0].title, "Notes A");
        assert_eq!(sections[1].files.len(), 1);
        assert_eq!(sections[1].files[0].title, "Notes B");
    }

    #[test]
    fn location_headers_surface_compound_extensions() {
        assert_eq!(
            extension_from_location("https://c.test/pluginfile.php/1/notes.tar.gz?forcedownload=1"),
            Some("tar.gz".to_string())
        );
        assert_eq!(extension_from_location("https://c.test/pluginfile.php/1/"), None);
    }

    #[test]
    fn disposition_headers_surface_the_filename_extension() {
        assert_eq!(
            extension_from_disposition(r#"attachment; filename="Notes.pdf""#),
            Some("pdf".to_string())
        );
        assert_eq!(extension_from_disposition("inline"), None);
    }
}
