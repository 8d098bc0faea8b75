//! Skill folding and description scanning.
//!
//! Skills are compared as folded tokens: lower-cased, whitespace collapsed
//! and mapped through an alias table, so "K8s", "kubernetes" and
//! "Kubernetes " are the same skill. `SkillMatcher` finds vocabulary skills
//! inside free text in one pass over the text using a character trie.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Alias → canonical skill.
static ALIAS_TO_CANONICAL: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let aliases: &[(&str, &[&str])] = &[
        ("javascript", &["js", "java script", "ecmascript", "es6"]),
        ("typescript", &["ts"]),
        ("node.js", &["nodejs", "node js", "node"]),
        ("kubernetes", &["k8s", "kube"]),
        ("postgresql", &["postgres", "postgre sql", "psql"]),
        ("power bi", &["powerbi", "power-bi"]),
        ("pl/sql", &["plsql", "pl sql"]),
        ("t-sql", &["tsql", "t sql"]),
        ("go", &["golang"]),
        ("spring", &["spring boot", "springboot", "spring framework"]),
        ("ci/cd", &["cicd", "ci cd", "ci-cd"]),
        ("rest api", &["restful", "restful api", "rest apis", "restful apis"]),
        ("c#", &["csharp", "c sharp"]),
        ("c++", &["cpp"]),
        ("aws", &["amazon web services"]),
        ("gcp", &["google cloud", "google cloud platform"]),
        ("sql server", &["mssql", "ms sql server", "microsoft sql server"]),
        ("mongodb", &["mongo"]),
        ("s3", &["amazon s3", "aws s3"]),
        ("lambda", &["aws lambda"]),
        ("glue", &["aws glue", "glue studio"]),
        ("bash", &["shell scripting"]),
        ("data warehouse", &["data warehousing"]),
        ("data pipeline", &["data pipelines"]),
    ];

    aliases
        .iter()
        .flat_map(|(canonical, list)| list.iter().map(move |alias| (*alias, *canonical)))
        .collect()
});

/// Fold a raw skill token. Blank tokens fold to `None`.
pub fn fold_skill(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if collapsed.is_empty() {
        return None;
    }
    Some(
        ALIAS_TO_CANONICAL
            .get(collapsed.as_str())
            .map(|c| c.to_string())
            .unwrap_or(collapsed),
    )
}

/// Fold every token of a list, dropping blanks and duplicates.
pub fn fold_skills<'a>(raw: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    raw.into_iter().filter_map(fold_skill).collect()
}

/// All spellings (aliases plus itself) that fold to `canonical`.
fn spellings_of(canonical: &str) -> Vec<String> {
    let mut spellings = vec![canonical.to_string()];
    spellings.extend(
        ALIAS_TO_CANONICAL
            .iter()
            .filter(|(_, c)| **c == canonical)
            .map(|(alias, _)| alias.to_string()),
    );
    spellings
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    /// Folded skill ending at this node
    skill: Option<String>,
}

/// Finds vocabulary skills in free text.
///
/// A match only counts on word boundaries: the characters right before and
/// after it must not be alphanumeric, so "java" does not fire inside
/// "javascript" while "c++" and "ci/cd" still match.
#[derive(Debug)]
pub struct SkillMatcher {
    nodes: Vec<TrieNode>,
}

impl SkillMatcher {
    /// Build a matcher for a vocabulary; aliases of each skill are matched too.
    pub fn new<'a>(vocabulary: impl IntoIterator<Item = &'a str>) -> Self {
        let mut matcher = Self {
            nodes: vec![TrieNode::default()],
        };
        for skill in vocabulary {
            let Some(folded) = fold_skill(skill) else {
                continue;
            };
            for spelling in spellings_of(&folded) {
                matcher.insert(&spelling, &folded);
            }
            if let Some(raw) = fold_raw(skill) {
                matcher.insert(&raw, &folded);
            }
        }
        matcher
    }

    fn insert(&mut self, spelling: &str, skill: &str) {
        let mut node = 0;
        for ch in spelling.chars() {
            node = match self.nodes[node].children.get(&ch) {
                Some(&next) => next,
                None => {
                    self.nodes.push(TrieNode::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[node].children.insert(ch, next);
                    next
                }
            };
        }
        self.nodes[node].skill = Some(skill.to_string());
    }

    /// Folded skills mentioned in `text`.
    pub fn find_in(&self, text: &str) -> BTreeSet<String> {
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        let mut found = BTreeSet::new();

        for start in 0..chars.len() {
            if start > 0 && chars[start - 1].is_alphanumeric() {
                continue;
            }
            let mut node = 0;
            let mut pos = start;
            while pos < chars.len() {
                let Some(&next) = self.nodes[node].children.get(&chars[pos]) else {
                    break;
                };
                node = next;
                if let Some(skill) = &self.nodes[node].skill {
                    let at_boundary = chars
                        .get(pos + 1)
                        .map_or(true, |c| !c.is_alphanumeric());
                    if at_boundary {
                        found.insert(skill.clone());
                    }
                }
                pos += 1;
            }
        }

        found
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }
}

/// Lower-cased, whitespace-collapsed spelling without alias mapping.
fn fold_raw(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_skill_aliases_and_case() {
        assert_eq!(fold_skill("  K8s "), Some("kubernetes".to_string()));
        assert_eq!(fold_skill("Postgres"), Some("postgresql".to_string()));
        assert_eq!(fold_skill("Spring   Boot"), Some("spring".to_string()));
        assert_eq!(fold_skill("Python"), Some("python".to_string()));
        assert_eq!(fold_skill("   "), None);
    }

    #[test]
    fn test_fold_skills_dedupes() {
        let folded = fold_skills(["JS", "javascript", "", "AWS"]);
        assert_eq!(
            folded.into_iter().collect::<Vec<_>>(),
            vec!["aws".to_string(), "javascript".to_string()]
        );
    }

    #[test]
    fn test_matcher_respects_word_boundaries() {
        let matcher = SkillMatcher::new(["java", "javascript", "sql", "c++", "ci/cd"]);
        let found = matcher.find_in("We use JavaScript, C++ and CI/CD. No mysql here.");

        assert!(found.contains("javascript"));
        assert!(found.contains("c++"));
        assert!(found.contains("ci/cd"));
        assert!(!found.contains("java"));
        assert!(!found.contains("sql"));
    }

    #[test]
    fn test_matcher_finds_aliases_as_canonical() {
        let matcher = SkillMatcher::new(["kubernetes", "postgresql"]);
        let found = matcher.find_in("Deploy on k8s backed by Postgres.");
        assert!(found.contains("kubernetes"));
        assert!(found.contains("postgresql"));
    }

    #[test]
    fn test_matcher_multi_word_skills() {
        let matcher = SkillMatcher::new(["step functions", "data warehouse"]);
        let found = matcher.find_in("Orchestrate Step Functions into the data warehouse.");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = SkillMatcher::new(Vec::<&str>::new());
        assert!(matcher.is_empty());
        assert!(matcher.find_in("python").is_empty());
    }
}
