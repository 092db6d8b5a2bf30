use scraper::ElementRef;
use unicode_normalization::UnicodeNormalization;

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// The first text node only. Activity titles sit in front of an
/// `accesshide` span that repeats the activity kind ("File", "Assignment"),
/// which `extract_text` would glue onto the title.
pub fn extract_first_text(node: ElementRef) -> String {
    node.text().next().unwrap_or("").trim().to_string()
}

/// Portal titles made safe for the local filesystem: `/` becomes "or",
/// `:` becomes a space, and the result is NFD-normalized so names compare
/// equal with what tools like Dropbox write back to disk.
pub fn normalized(title: &str) -> String {
    title.replace('/', "or").replace(':', " ").nfd().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn normalized_replaces_path_hostile_characters() {
        assert_eq!(normalized("Analysis I/II"), "Analysis IorII");
        assert_eq!(normalized("Lecture: Week 1"), "Lecture  Week 1");
    }

    #[test]
    fn normalized_decomposes_umlauts() {
        // NFD splits a precomposed umlaut into base letter + combining mark.
        let out = normalized("Übung");
        assert_eq!(out.chars().count(), "Übung".chars().count() + 1);
        assert!(out.starts_with('U'));
    }

    #[test]
    fn first_text_skips_trailing_label_span() {
        let html = Html::parse_fragment(
            r#"<span class="instancename">Slides Week 3<span class="accesshide"> File</span></span>"#,
        );
        let sel = Selector::parse(".instancename").unwrap();
        let el = html.select(&sel).next().unwrap();
        assert_eq!(extract_first_text(el), "Slides Week 3");
        assert_eq!(extract_text(el), "Slides Week 3 File");
    }
}
