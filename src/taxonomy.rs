use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const FALLBACK_TAXONOMY: &str = "\
Web | Authentication | Login
Web | Authentication | Logout
Web | Authentication | OAuth | Google
Web | Authentication | OAuth | GitHub
Web | Dashboard | Widgets
Web | Dashboard | Settings
Web | Profile | Edit
Web | Profile | Avatar
API | REST | GET
API | REST | POST
API | REST | PUT
API | REST | DELETE
API | GraphQL | Queries
API | GraphQL | Mutations
Mobile | iOS | Navigation
Mobile | iOS | Push Notifications
Mobile | Android | Navigation
Mobile | Android | Push Notifications
Database | Queries | Performance
Database | Migrations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaNode {
    pub name: String,
    pub children: Vec<AreaNode>,
}

impl AreaNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Parses the pipe-delimited coverage format into a forest of area nodes.
///
/// One path per line, segments separated by `|`. Lines starting with `#` or
/// `;` are comments. Sibling names are merged case-insensitively and keep
/// the spelling of their first occurrence.
pub fn parse_taxonomy(content: &str) -> Vec<AreaNode> {
    let mut roots = Vec::new();

    for raw_line in content.split('\n') {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let segments = line
            .split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();
        if segments.is_empty() {
            continue;
        }

        insert_path(&mut roots, &segments);
    }

    roots
}

fn insert_path(nodes: &mut Vec<AreaNode>, segments: &[&str]) {
    let Some((name, rest)) = segments.split_first() else {
        return;
    };

    let index = match nodes
        .iter()
        .position(|node| node.name.to_lowercase() == name.to_lowercase())
    {
        Some(index) => index,
        None => {
            nodes.push(AreaNode::new(*name));
            nodes.len() - 1
        }
    };

    insert_path(&mut nodes[index].children, rest);
}

pub fn fallback_taxonomy() -> Vec<AreaNode> {
    parse_taxonomy(FALLBACK_TAXONOMY)
}

/// Loads the first existing candidate file. Read failures and empty results
/// fall through to the built-in taxonomy.
pub fn load_taxonomy(candidates: &[PathBuf]) -> Vec<AreaNode> {
    for path in candidates {
        if !path.is_file() {
            continue;
        }

        match read_taxonomy_file(path) {
            Ok(roots) if !roots.is_empty() => {
                debug!(path = %path.display(), roots = roots.len(), "loaded area taxonomy");
                return roots;
            }
            Ok(_) => {
                warn!(path = %path.display(), "area taxonomy file has no entries, using fallback");
                break;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read area taxonomy, using fallback");
                break;
            }
        }
    }

    fallback_taxonomy()
}

fn read_taxonomy_file(path: &Path) -> Result<Vec<AreaNode>, std::io::Error> {
    let content = fs::read_to_string(path)?;
    Ok(parse_taxonomy(&content))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{fallback_taxonomy, load_taxonomy, parse_taxonomy};

    fn names(nodes: &[super::AreaNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.name.as_str()).collect()
    }

    #[test]
    fn merges_siblings_case_insensitively() {
        let roots = parse_taxonomy("A|B\na|C\n");
        assert_eq!(names(&roots), vec!["A"]);
        assert_eq!(names(&roots[0].children), vec!["B", "C"]);
    }

    #[test]
    fn skips_comments_blank_lines_and_empty_segments() {
        let roots = parse_taxonomy(
            "# comment\n; other comment\n\n   \r\nWeb | | Login \r\n|  |\nAPI|REST\n",
        );
        assert_eq!(names(&roots), vec!["Web", "API"]);
        assert_eq!(names(&roots[0].children), vec!["Login"]);
        assert_eq!(names(&roots[1].children), vec!["REST"]);
    }

    #[test]
    fn keeps_first_seen_child_order() {
        let roots = parse_taxonomy("Web|Z\nWeb|A|Deep\nweb|z|Leaf\nWeb|M");
        let web = &roots[0];
        assert_eq!(names(&web.children), vec!["Z", "A", "M"]);
        assert_eq!(names(&web.children[0].children), vec!["Leaf"]);
        assert_eq!(names(&web.children[1].children), vec!["Deep"]);
    }

    #[test]
    fn parsing_is_deterministic() {
        let text = "A|B|C\nA|D\nE\n# x\nA|b|F";
        assert_eq!(parse_taxonomy(text), parse_taxonomy(text));
    }

    #[test]
    fn empty_input_yields_empty_forest() {
        assert!(parse_taxonomy("").is_empty());
        assert!(parse_taxonomy("# only comments\n;\n").is_empty());
    }

    #[test]
    fn load_falls_back_when_file_missing_or_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("missing.ini");
        assert_eq!(load_taxonomy(&[missing]), fallback_taxonomy());

        let empty = dir.path().join("empty.ini");
        fs::write(&empty, "# nothing here\n").expect("write");
        assert_eq!(load_taxonomy(&[empty]), fallback_taxonomy());
    }

    #[test]
    fn load_uses_first_existing_candidate() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = dir.path().join("first.ini");
        let second = dir.path().join("second.ini");
        fs::write(&second, "Second|Area").expect("write");
        let roots = load_taxonomy(&[first, second]);
        assert_eq!(names(&roots), vec!["Second"]);
    }

    #[test]
    fn fallback_has_four_roots() {
        let roots = fallback_taxonomy();
        assert_eq!(names(&roots), vec!["Web", "API", "Mobile", "Database"]);
    }
}
