use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::catalog::CreativePattern;

/// Optional steering for [`crate::CreativeEngine::generate_novel_solution`].
#[derive(Debug, Clone, Default)]
pub struct CreativeRequest {
    pub domain: Option<String>,
    pub constraints: Vec<String>,
}

impl CreativeRequest {
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InnovationLevel {
    Incremental,
    Moderate,
    High,
    Breakthrough,
}

impl InnovationLevel {
    pub fn from_creativity(creativity: f32) -> Self {
        if creativity >= 0.8 {
            Self::Breakthrough
        } else if creativity >= 0.6 {
            Self::High
        } else if creativity >= 0.4 {
            Self::Moderate
        } else {
            Self::Incremental
        }
    }
}

impl std::fmt::Display for InnovationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Incremental => "incremental",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Breakthrough => "breakthrough",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeSnippet {
    pub pattern: String,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub id: String,
    pub problem: String,
    pub title: String,
    pub description: String,
    pub patterns: Vec<String>,
    pub domains: Vec<String>,
    pub approach: Vec<String>,
    pub code_snippets: Vec<CodeSnippet>,
    pub constraints: Vec<String>,
    pub creativity_score: f32,
    pub feasibility_score: f32,
    pub innovation_level: InnovationLevel,
}

/// Render a solution from already-chosen patterns and scores.
pub(crate) fn render_solution(
    problem: &str,
    patterns: &[&CreativePattern],
    constraints: &[String],
    creativity: f32,
    feasibility: f32,
) -> Solution {
    let names: Vec<&str> = patterns.iter().map(|pattern| pattern.name).collect();
    let mut domains: Vec<String> = Vec::new();
    for pattern in patterns {
        if !domains.iter().any(|domain| domain == pattern.domain) {
            domains.push(pattern.domain.to_string());
        }
    }

    let approach: Vec<String> = patterns
        .iter()
        .flat_map(|pattern| {
            pattern
                .principles
                .iter()
                .map(move |principle| format!("{}: {principle}", pattern.name))
        })
        .collect();

    let mut description = format!(
        "Address \"{}\" by combining {}.",
        problem.trim(),
        join_names(&names)
    );
    for pattern in patterns {
        description.push_str(&format!("\n- {}: {}", pattern.name, pattern.description));
    }
    if !constraints.is_empty() {
        description.push_str(&format!("\nConstraints: {}.", constraints.join("; ")));
    }

    Solution {
        id: solution_id(problem, patterns),
        problem: problem.to_string(),
        title: format!("{} for {}", names.first().copied().unwrap_or("Solution"), short_problem(problem)),
        description,
        patterns: patterns.iter().map(|pattern| pattern.id.to_string()).collect(),
        domains,
        approach,
        code_snippets: patterns.iter().map(|pattern| snippet(pattern, problem)).collect(),
        constraints: constraints.to_vec(),
        creativity_score: creativity.clamp(0.0, 1.0),
        feasibility_score: feasibility.clamp(0.0, 1.0),
        innovation_level: InnovationLevel::from_creativity(creativity),
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f32 }
}

fn solution_id(problem: &str, patterns: &[&CreativePattern]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(problem.as_bytes());
    for pattern in patterns {
        hasher.update([0u8]);
        hasher.update(pattern.id.as_bytes());
    }
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|byte| format!("{byte:02x}")).collect();
    format!("sol-{hex}")
}

fn join_names(names: &[&str]) -> String {
    match names {
        [] => "no patterns".to_string(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn short_problem(problem: &str) -> String {
    let words: Vec<&str> = problem.split_whitespace().take(8).collect();
    let mut short = words.join(" ");
    if problem.split_whitespace().count() > words.len() {
        short.push_str("...");
    }
    short
}

fn snippet(pattern: &CreativePattern, problem: &str) -> CodeSnippet {
    let type_name = camel_case(pattern.id);
    let first_principle = pattern.principles.first().copied().unwrap_or(pattern.name);
    let code = format!(
        "/// {name}: {description}\n\
         pub struct {type_name};\n\
         \n\
         impl {type_name} {{\n\
         \x20   pub fn apply(&self, problem: &str) -> String {{\n\
         \x20       format!(\"{principle} -> {{problem}}\")\n\
         \x20   }}\n\
         }}\n\
         \n\
         // {type_name}.apply({problem:?})\n",
        name = pattern.name,
        description = pattern.description,
        principle = first_principle,
        problem = problem.trim(),
    );
    CodeSnippet {
        pattern: pattern.id.to_string(),
        language: "rust".to_string(),
        code,
    }
}

fn camel_case(id: &str) -> String {
    id.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::find_pattern;

    fn pick(ids: &[&str]) -> Vec<&'static CreativePattern> {
        ids.iter().map(|id| find_pattern(id).unwrap()).collect()
    }

    #[test]
    fn test_innovation_buckets() {
        assert_eq!(InnovationLevel::from_creativity(0.1), InnovationLevel::Incremental);
        assert_eq!(InnovationLevel::from_creativity(0.4), InnovationLevel::Moderate);
        assert_eq!(InnovationLevel::from_creativity(0.65), InnovationLevel::High);
        assert_eq!(InnovationLevel::from_creativity(0.8), InnovationLevel::Breakthrough);
    }

    #[test]
    fn test_render_solution_fields() {
        let patterns = pick(&["event_driven", "microservices", "pipeline"]);
        let solution = render_solution(
            "ingest sensor data",
            &patterns,
            &["no new infrastructure".to_string()],
            0.6,
            0.85,
        );
        assert!(solution.id.starts_with("sol-"));
        assert_eq!(solution.id.len(), 20);
        assert_eq!(solution.domains, vec!["architecture", "data"]);
        assert_eq!(solution.approach.len(), 6);
        assert_eq!(solution.code_snippets.len(), 3);
        assert!(solution.code_snippets[0].code.contains("pub struct EventDriven;"));
        assert!(solution.description.contains(
            "combining Event-Driven Architecture, Microservice Decomposition and Data Pipeline"
        ));
        assert!(solution.description.contains("Constraints: no new infrastructure."));
        assert_eq!(solution.innovation_level, InnovationLevel::High);
    }

    #[test]
    fn test_solution_id_depends_on_problem_and_patterns() {
        let a = render_solution("p", &pick(&["pipeline"]), &[], 0.5, 0.5);
        let b = render_solution("p", &pick(&["pipeline"]), &[], 0.9, 0.1);
        let c = render_solution("q", &pick(&["pipeline"]), &[], 0.5, 0.5);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(camel_case("problem_inversion"), "ProblemInversion");
        assert_eq!(join_names(&["A"]), "A");
        assert_eq!(join_names(&["A", "B"]), "A and B");
        assert_eq!(mean([0.5, 1.0].into_iter()), 0.75);
        assert_eq!(mean(std::iter::empty()), 0.0);
        assert_eq!(short_problem("one two"), "one two");
        assert_eq!(
            short_problem("a b c d e f g h i j"),
            "a b c d e f g h..."
        );
    }
}
