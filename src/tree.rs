use std::path::{Path, PathBuf};

use crate::text_manipulators::normalized;

/// Everything visible to the logged-in user, materialized up front so the
/// mirroring pass can diff against the disk without touching the network
/// (except for actual downloads).
#[derive(Debug, Default)]
pub struct RemoteTree {
    pub courses: Vec<Course>,
}

#[derive(Debug)]
pub struct Course {
    pub title: String,
    pub id: String,
    pub url: String,
    pub sections: Vec<Section>,
}

/// A course section. Linked sections live on their own page and need a
/// second fetch; inline sections are parsed straight out of the course page.
#[derive(Debug)]
pub struct Section {
    pub title: String,
    pub source: SectionSource,
    pub files: Vec<RemoteFile>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug)]
pub enum SectionSource {
    Linked { url: String, id: String },
    Inline,
}

#[derive(Debug)]
pub struct Assignment {
    pub title: String,
    pub url: String,
    pub files: Vec<RemoteFile>,
}

/// A downloadable file activity.
#[derive(Debug)]
pub struct RemoteFile {
    pub title: String,
    pub url: String,
    /// `None` until resolved; the icon/text guess only covers the trivial
    /// cases and the rest need a redirect probe.
    pub extension: Option<String>,
}

impl RemoteFile {
    pub fn new(title: &str, url: String, extension_guess: Option<String>) -> Self {
        let mut file = Self {
            title: normalized(title),
            url,
            extension: None,
        };
        if let Some(ext) = extension_guess {
            file.set_extension(ext);
        }
        file
    }

    /// Local file name, `title.ext`. Callers resolve the extension first.
    pub fn file_name(&self) -> String {
        match &self.extension {
            Some(ext) if !ext.is_empty() => format!("{}.{}", self.title, ext),
            _ => self.title.clone(),
        }
    }

    /// Portal titles sometimes already carry the extension; drop it once
    /// the real one is known so `file_name` doesn't double it up.
    pub fn set_extension(&mut self, ext: String) {
        if let Some(stripped) = self.title.strip_suffix(&format!(".{ext}")) {
            self.title = stripped.to_string();
        }
        self.extension = Some(ext);
    }
}

/// A uniform directory view over the tree levels, so the sync walk doesn't
/// need one function per level.
#[derive(Debug, Clone, Copy)]
pub enum DirNode<'a> {
    Root(&'a RemoteTree),
    Course(&'a Course),
    Section(&'a Section),
    Assignment(&'a Assignment),
}

#[derive(Debug, Clone, Copy)]
pub enum ChildNode<'a> {
    Dir(DirNode<'a>),
    File(&'a RemoteFile),
}

impl<'a> DirNode<'a> {
    /// Directory name on disk. The root maps onto the sync root itself.
    pub fn name(&self) -> &str {
        match self {
            DirNode::Root(_) => "",
            DirNode::Course(course) => &course.title,
            DirNode::Section(section) => &section.title,
            DirNode::Assignment(assignment) => &assignment.title,
        }
    }

    pub fn children(&self) -> Vec<ChildNode<'a>> {
        match self {
            DirNode::Root(tree) => tree
                .courses
                .iter()
                .map(|c| ChildNode::Dir(DirNode::Course(c)))
                .collect(),
            DirNode::Course(course) => course
                .sections
                .iter()
                .map(|s| ChildNode::Dir(DirNode::Section(s)))
                .collect(),
            DirNode::Section(section) => section
                .files
                .iter()
                .map(ChildNode::File)
                .chain(
                    section
                        .assignments
                        .iter()
                        .map(|a| ChildNode::Dir(DirNode::Assignment(a))),
                )
                .collect(),
            DirNode::Assignment(assignment) => {
                assignment.files.iter().map(ChildNode::File).collect()
            }
        }
    }
}

/// Relative path of a child under its parent directory's path.
pub fn child_path(parent: &Path, child: &ChildNode) -> PathBuf {
    match child {
        ChildNode::Dir(dir) => parent.join(dir.name()),
        ChildNode::File(file) => parent.join(file.file_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RemoteTree {
        RemoteTree {
            courses: vec![Course {
                title: "Algebra".to_string(),
                id: "11".to_string(),
                url: "https://c.test/course/view.php?id=11".to_string(),
                sections: vec![Section {
                    title: "Week 1".to_string(),
                    source: SectionSource::Inline,
                    files: vec![RemoteFile {
                        title: "Notes".to_string(),
                        url: "https://c.test/mod/resource/view.php?id=9".to_string(),
                        extension: Some("pdf".to_string()),
                    }],
                    assignments: vec![Assignment {
                        title: "Sheet 1".to_string(),
                        url: "https://c.test/mod/assign/view.php?id=10".to_string(),
                        files: vec![],
                    }],
                }],
            }],
        }
    }

    #[test]
    fn walk_reaches_every_level() {
        let tree = sample_tree();
        let root = DirNode::Root(&tree);
        let courses = root.children();
        assert_eq!(courses.len(), 1);
        let ChildNode::Dir(course) = courses[0] else {
            panic!("course should be a directory")
        };
        let sections = course.children();
        assert_eq!(sections.len(), 1);
        let ChildNode::Dir(section) = sections[0] else {
            panic!("section should be a directory")
        };
        // One file plus one assignment directory.
        assert_eq!(section.children().len(), 2);
    }

    #[test]
    fn file_paths_include_the_resolved_extension() {
        let tree = sample_tree();
        let section_path = PathBuf::from("Algebra/Week 1");
        let file = &tree.courses[0].sections[0].files[0];
        assert_eq!(
            child_path(&section_path, &ChildNode::File(file)),
            PathBuf::from("Algebra/Week 1/Notes.pdf")
        );
    }

    #[test]
    fn set_extension_strips_a_doubled_title_suffix() {
        let mut file = RemoteFile::new("slides.pdf", "https://x.test/f".to_string(), None);
        file.set_extension("pdf".to_string());
        assert_eq!(file.title, "slides");
        assert_eq!(file.file_name(), "slides.pdf");
    }
}
