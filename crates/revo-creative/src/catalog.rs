use serde::Serialize;

/// A reusable idea the creative engine can combine into solutions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreativePattern {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub domain: &'static str,
    pub principles: &'static [&'static str],
    pub keywords: &'static [&'static str],
    pub creativity: f32,
    pub feasibility: f32,
}

/// Built-in pattern catalog, ordered by id.
pub static CATALOG: [CreativePattern; 10] = [
    CreativePattern {
        id: "ai_assisted",
        name: "AI-Assisted Automation",
        description: "Let a model handle the judgement-heavy steps and keep humans on review.",
        domain: "ai",
        principles: &[
            "Automate the repetitive judgement calls",
            "Keep a human in the review loop",
        ],
        keywords: &["ai", "learn", "predict", "automate", "intelligent", "model"],
        creativity: 0.9,
        feasibility: 0.55,
    },
    CreativePattern {
        id: "biomimicry",
        name: "Biomimicry",
        description: "Borrow mechanisms that evolved in nature for the same pressure.",
        domain: "design",
        principles: &[
            "Find the natural system facing the same constraint",
            "Copy the mechanism, not the appearance",
        ],
        keywords: &["adapt", "evolve", "natural", "organic", "heal", "resilient"],
        creativity: 0.85,
        feasibility: 0.6,
    },
    CreativePattern {
        id: "event_driven",
        name: "Event-Driven Architecture",
        description: "Components react to published events instead of calling each other.",
        domain: "architecture",
        principles: &[
            "Publish facts, not commands",
            "Let consumers evolve independently",
        ],
        keywords: &["event", "async", "stream", "message", "realtime", "decouple"],
        creativity: 0.65,
        feasibility: 0.8,
    },
    CreativePattern {
        id: "first_principles",
        name: "First Principles",
        description: "Strip the problem to its fundamentals and rebuild from there.",
        domain: "general",
        principles: &[
            "List the assumptions and challenge each one",
            "Rebuild from what must be true",
        ],
        keywords: &["cost", "simplify", "rethink", "fundamental", "complex", "reduce"],
        creativity: 0.8,
        feasibility: 0.6,
    },
    CreativePattern {
        id: "gamification",
        name: "Gamification",
        description: "Use progress, feedback and reward loops to drive engagement.",
        domain: "ux",
        principles: &[
            "Make progress visible",
            "Reward the behaviour you want repeated",
        ],
        keywords: &["user", "engage", "motivate", "reward", "onboarding", "experience"],
        creativity: 0.8,
        feasibility: 0.65,
    },
    CreativePattern {
        id: "layered_cache",
        name: "Layered Caching",
        description: "Serve hot data from progressively closer caches.",
        domain: "performance",
        principles: &[
            "Measure before caching",
            "Invalidate on write, expire on time",
        ],
        keywords: &["cache", "latency", "performance", "fast", "memory", "optimize"],
        creativity: 0.45,
        feasibility: 0.9,
    },
    CreativePattern {
        id: "microservices",
        name: "Microservice Decomposition",
        description: "Split the system along business capabilities into services.",
        domain: "architecture",
        principles: &[
            "One service per bounded context",
            "Own your data, share through APIs",
        ],
        keywords: &["scale", "service", "distributed", "api", "independent", "deploy"],
        creativity: 0.6,
        feasibility: 0.85,
    },
    CreativePattern {
        id: "pipeline",
        name: "Data Pipeline",
        description: "Model the work as composable stages over a stream of records.",
        domain: "data",
        principles: &[
            "Each stage does one transformation",
            "Make stages restartable",
        ],
        keywords: &["data", "transform", "etl", "pipeline", "batch", "process"],
        creativity: 0.5,
        feasibility: 0.9,
    },
    CreativePattern {
        id: "plugin_architecture",
        name: "Plugin Architecture",
        description: "Keep a small core and load features through a stable extension API.",
        domain: "architecture",
        principles: &[
            "Stabilise the extension contract first",
            "Ship features as plugins",
        ],
        keywords: &["extend", "plugin", "modular", "customize", "integration"],
        creativity: 0.6,
        feasibility: 0.85,
    },
    CreativePattern {
        id: "problem_inversion",
        name: "Problem Inversion",
        description: "Ask how to cause the failure, then design against each answer.",
        domain: "general",
        principles: &[
            "Enumerate ways to guarantee failure",
            "Turn each into a safeguard",
        ],
        keywords: &["problem", "failure", "avoid", "risk", "reverse", "debug"],
        creativity: 0.75,
        feasibility: 0.7,
    },
];

pub fn patterns() -> &'static [CreativePattern] {
    &CATALOG
}

pub fn find_pattern(id: &str) -> Option<&'static CreativePattern> {
    CATALOG.iter().find(|pattern| pattern.id == id)
}

/// Lowercase alphanumeric words of `text`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn keyword_hit(keyword: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|token| {
        token == keyword || (keyword.len() >= 4 && token.starts_with(keyword))
    })
}

/// One point per keyword present in `problem`, one more when the pattern's
/// domain matches `domain`.
pub fn score_pattern(pattern: &CreativePattern, tokens: &[String], domain: Option<&str>) -> u32 {
    let keyword_score = pattern
        .keywords
        .iter()
        .filter(|keyword| keyword_hit(keyword, tokens))
        .count() as u32;
    let domain_score = match domain {
        Some(domain) if domain.trim().eq_ignore_ascii_case(pattern.domain) => 1,
        _ => 0,
    };
    keyword_score + domain_score
}

/// Whole catalog ranked for `problem`: score desc, creativity desc, id.
pub fn rank_patterns(problem: &str, domain: Option<&str>) -> Vec<(&'static CreativePattern, u32)> {
    let tokens = tokenize(problem);
    let mut ranked: Vec<_> = CATALOG
        .iter()
        .map(|pattern| (pattern, score_pattern(pattern, &tokens, domain)))
        .collect();
    ranked.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .cmp(a_score)
            .then_with(|| b.creativity.total_cmp(&a.creativity))
            .then_with(|| a.id.cmp(b.id))
    });
    ranked
}
