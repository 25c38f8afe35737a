use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Keywords recognised in posting text. Longer spellings come before their
/// prefixes so the alternation prefers `JavaScript` over `Java`.
pub const SKILL_VOCABULARY: &[&str] = &[
    "MySQL",
    "PostgreSQL",
    "MS SQL",
    "MongoDB",
    "Redis",
    "AWS",
    "GCP",
    "Cloud SQL",
    "CI/CD",
    "IaC",
    "GDPR",
    "ASP.NET",
    "MVC",
    "C#",
    "SQL",
    "SAP",
    "S/4 HANA",
    "JavaScript",
    "Python",
    "Java",
    "Docker",
    "Kubernetes",
    "Hadoop",
    "Spark",
    "Kafka",
    "Airflow",
    "Talend",
    "Luigi",
    "Tableau",
    "Power BI",
    "Looker",
    "Scala",
    "Pandas",
    "NumPy",
    "Terraform",
    "Helm",
    "Jenkins",
    "Elasticsearch",
    "Snowflake",
    "Databricks",
    "R",
];

static SKILL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = SKILL_VOCABULARY
        .iter()
        .map(|skill| regex::escape(skill))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)(?:{alternation})")).unwrap()
});

/// Returns the canonical spelling of every vocabulary keyword found in `text`.
///
/// A hit only counts when it is not glued to another word character on either
/// side, so `R` inside `server` or `Java` inside `Javanese` are ignored.
pub fn extract_skills(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut cursor = 0;

    while let Some(hit) = SKILL_PATTERN.find_at(text, cursor) {
        if is_standalone(text, hit.start(), hit.end()) {
            if let Some(canonical) = canonical(hit.as_str()) {
                found.insert(canonical.to_string());
            }
            cursor = hit.end();
        } else {
            // Retry one character later so a shorter keyword can still match.
            cursor = hit.start() + first_char_len(&text[hit.start()..]);
        }
    }

    found
}

fn canonical(matched: &str) -> Option<&'static str> {
    SKILL_VOCABULARY
        .iter()
        .copied()
        .find(|skill| skill.eq_ignore_ascii_case(matched))
}

fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn first_char_len(text: &str) -> usize {
    text.chars().next().map_or(1, char::len_utf8)
}
