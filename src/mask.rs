use std::path::Path;

use anyhow::Context;
use regex::Regex;

/// One line of `mask.txt`: `+ pattern` allows a path, `- pattern` bans it.
///
/// Pattern language: `*` matches within one path component, `#` matches
/// across components (including nothing), `.` is literal. Everything after
/// `//` on a line is a comment.
#[derive(Debug)]
pub struct Rule {
    pub line: String,
    pub is_allowing: bool,
    regex: Regex,
    /// The pattern up to the first `#`, used to decide whether a directory
    /// is worth descending into at all.
    static_root: Regex,
}

fn rule_to_regex(pattern: &str, prefix: &str, suffix: &str) -> anyhow::Result<Regex> {
    let pattern = pattern
        .replace('.', r"\.")
        .replace('*', "[^/]*")
        .replace('#', "(|/|/?.*/?)");
    Regex::new(&format!("{prefix}{pattern}{suffix}"))
        .with_context(|| format!("bad mask pattern: {pattern}"))
}

impl Rule {
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let (sign, matcher) = line
            .split_once(' ')
            .with_context(|| format!("mask rule without a pattern: {line:?}"))?;
        let is_allowing = match sign {
            "+" => true,
            "-" => false,
            other => anyhow::bail!("mask rule must start with + or -, got {other:?}"),
        };
        let matcher = matcher.trim_start();
        let regex = rule_to_regex(matcher, "^", "$")?;
        let static_root = rule_to_regex(matcher.split('#').next().unwrap_or(""), "^", "")?;
        Ok(Self {
            line: line.to_string(),
            is_allowing,
            regex,
            static_root,
        })
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.find(path).is_some_and(|m| m.start() == 0 && !m.is_empty())
    }

    /// Does the static root of this rule cover a prefix of `path`.
    fn matches_root(&self, path: &str) -> bool {
        self.static_root
            .find(path)
            .is_some_and(|m| m.start() == 0 && !m.is_empty())
    }

    fn adds(&self, path: &str) -> bool {
        self.is_allowing && self.matches(path)
    }

    fn removes(&self, path: &str) -> bool {
        !self.is_allowing && self.matches(path)
    }
}

/// The whole mask file, evaluated top to bottom.
#[derive(Debug, Default)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn parse(mask: &str) -> anyhow::Result<Self> {
        let mut rules = Vec::new();
        for line in mask.lines() {
            let line = line.replace('\t', "    ");
            let line = line.split("//").next().unwrap_or("").trim_end();
            if line.is_empty() {
                continue;
            }
            rules.push(Rule::parse(line)?);
        }
        Ok(Self { rules })
    }

    /// later rules override earlier ones:
    /// `sync = (sync || rule.adds) && !rule.removes`, folded in order.
    pub fn sync_file(&self, path: &Path) -> bool {
        let path = slash_path(path);
        let mut sync = false;
        for rule in &self.rules {
            sync = (sync || rule.adds(&path)) && !rule.removes(&path);
        }
        sync
    }

    /// Whether any allowing rule could still match somewhere below `path`.
    pub fn matches_any_root(&self, path: &Path) -> bool {
        let path = slash_path(path);
        self.rules
            .iter()
            .any(|rule| rule.is_allowing && rule.matches_root(&path))
    }
}

/// Rules are written with forward slashes regardless of platform.
fn slash_path(path: &Path) -> String {
    path.iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ruleset(mask: &str) -> RuleSet {
        RuleSet::parse(mask).unwrap()
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let rules = ruleset("// header\n\n+ Algebra# // trailing\n");
        assert_eq!(rules.rules.len(), 1);
        assert!(rules.rules[0].is_allowing);
    }

    #[test]
    fn hash_spans_directories_and_star_does_not() {
        let rules = ruleset("+ Algebra#*.pdf");
        assert!(rules.sync_file(&PathBuf::from("Algebra/Week 1/notes.pdf")));
        assert!(rules.sync_file(&PathBuf::from("Algebra/notes.pdf")));
        assert!(!rules.sync_file(&PathBuf::from("Topology/notes.pdf")));

        let rules = ruleset("+ Algebra/*.pdf");
        assert!(rules.sync_file(&PathBuf::from("Algebra/notes.pdf")));
        assert!(!rules.sync_file(&PathBuf::from("Algebra/Week 1/notes.pdf")));
    }

    #[test]
    fn later_bans_beat_earlier_allows() {
        let rules = ruleset("+ Algebra#\n- Algebra#solutions*.pdf");
        assert!(rules.sync_file(&PathBuf::from("Algebra/Week 1/notes.pdf")));
        assert!(!rules.sync_file(&PathBuf::from("Algebra/Week 1/solutions01.pdf")));
    }

    #[test]
    fn later_allows_rescue_earlier_bans() {
        let rules = ruleset("- Algebra#draft*\n+ Algebra#");
        assert!(rules.sync_file(&PathBuf::from("Algebra/draft01.pdf")));
    }

    #[test]
    fn root_matching_gates_the_descent() {
        let rules = ruleset("+ Algebra#");
        assert!(rules.matches_any_root(&PathBuf::from("Algebra")));
        assert!(rules.matches_any_root(&PathBuf::from("Algebra/Exercises")));
        assert!(!rules.matches_any_root(&PathBuf::from("Topology")));
    }

    #[test]
    fn dots_in_patterns_are_literal() {
        let rules = ruleset("+ Algebra#notes.pdf");
        assert!(rules.sync_file(&PathBuf::from("Algebra/notes.pdf")));
        assert!(!rules.sync_file(&PathBuf::from("Algebra/notesxpdf")));
    }

    #[test]
    fn banning_rules_never_open_a_root() {
        let rules = ruleset("- Algebra#");
        assert!(!rules.matches_any_root(&PathBuf::from("Algebra")));
    }
}
