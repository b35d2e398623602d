use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use revo_config::CreativeConfig;
use revo_core::AppError;
use serde::Serialize;
use tracing::debug;

use crate::catalog::{self, CreativePattern, find_pattern, rank_patterns};
use crate::evolution::{EvolutionOutcome, EvolutionParams, evolve_solution_genetic};
use crate::solution::{CreativeRequest, Solution, mean, render_solution};

#[derive(Debug, Clone, Serialize)]
pub struct CreativeStats {
    pub patterns: usize,
    pub solutions_generated: u64,
    pub evolutions_run: u64,
}

#[derive(Debug)]
pub struct CreativeEngine {
    config: CreativeConfig,
    solutions_generated: AtomicU64,
    evolutions_run: AtomicU64,
}

impl CreativeEngine {
    pub fn new(config: CreativeConfig) -> Self {
        Self {
            config,
            solutions_generated: AtomicU64::new(0),
            evolutions_run: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CreativeConfig {
        &self.config
    }

    pub fn patterns(&self) -> &'static [CreativePattern] {
        catalog::patterns()
    }

    pub fn pattern(&self, id: &str) -> Result<&'static CreativePattern> {
        find_pattern(id).ok_or_else(|| AppError::PatternNotFound(id.to_string()).into())
    }

    /// Combine the `top_patterns` best-matching patterns for `problem`.
    ///
    /// Pure function of the catalog, the problem text and the request.
    pub fn generate_novel_solution(&self, problem: &str, request: &CreativeRequest) -> Solution {
        let take = self.config.top_patterns.max(1);
        let selected: Vec<&'static CreativePattern> = rank_patterns(problem, request.domain.as_deref())
            .into_iter()
            .take(take)
            .map(|(pattern, _)| pattern)
            .collect();
        self.solutions_generated.fetch_add(1, Ordering::Relaxed);
        debug!(
            patterns = ?selected.iter().map(|p| p.id).collect::<Vec<_>>(),
            "generated creative solution"
        );
        render_from(problem, &selected, &request.constraints)
    }

    /// Render a solution from explicitly chosen pattern ids.
    pub fn combine_patterns(&self, problem: &str, ids: &[String], request: &CreativeRequest) -> Result<Solution> {
        let selected = ids
            .iter()
            .map(|id| self.pattern(id))
            .collect::<Result<Vec<_>>>()?;
        self.solutions_generated.fetch_add(1, Ordering::Relaxed);
        Ok(render_from(problem, &selected, &request.constraints))
    }

    pub fn evolve_solution_genetic(&self, problem: &str, params: &EvolutionParams) -> Result<EvolutionOutcome> {
        let outcome = evolve_solution_genetic(problem, params)?;
        self.evolutions_run.fetch_add(1, Ordering::Relaxed);
        debug!(
            seed = outcome.seed,
            best_fitness = outcome.best_fitness,
            generations = outcome.generations,
            "genetic evolution finished"
        );
        Ok(outcome)
    }

    /// Evolution parameters from config, with request overrides applied.
    pub fn evolution_params(&self, request: &CreativeRequest) -> EvolutionParams {
        EvolutionParams {
            domain: request.domain.clone(),
            constraints: request.constraints.clone(),
            ..EvolutionParams::from_config(&self.config)
        }
    }

    pub fn stats(&self) -> CreativeStats {
        CreativeStats {
            patterns: catalog::patterns().len(),
            solutions_generated: self.solutions_generated.load(Ordering::Relaxed),
            evolutions_run: self.evolutions_run.load(Ordering::Relaxed),
        }
    }
}

impl Default for CreativeEngine {
    fn default() -> Self {
        Self::new(CreativeConfig::default())
    }
}

fn render_from(problem: &str, selected: &[&'static CreativePattern], constraints: &[String]) -> Solution {
    render_solution(
        problem,
        selected,
        constraints,
        mean(selected.iter().map(|p| p.creativity)),
        mean(selected.iter().map(|p| p.feasibility)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let engine = CreativeEngine::default();
        let request = CreativeRequest::default().with_domain("architecture");
        let a = engine.generate_novel_solution("scale an event driven api", &request);
        let b = engine.generate_novel_solution("scale an event driven api", &request);
        assert_eq!(a, b);
        assert_eq!(a.patterns.len(), 5);
        assert_eq!(engine.stats().solutions_generated, 2);
    }

    #[test]
    fn test_generation_uses_best_matches() {
        let engine = CreativeEngine::new(CreativeConfig {
            top_patterns: 2,
            ..CreativeConfig::default()
        });
        let solution = engine.generate_novel_solution(
            "cache hot data to cut latency in the etl pipeline",
            &CreativeRequest::default(),
        );
        assert_eq!(solution.patterns, vec!["pipeline", "layered_cache"]);
        let expected_creativity = (0.5 + 0.45) / 2.0;
        assert!((solution.creativity_score - expected_creativity).abs() < 1e-6);
    }

    #[test]
    fn test_constraints_are_carried() {
        let engine = CreativeEngine::default();
        let request = CreativeRequest::default().with_constraints(vec!["budget under $1k".into()]);
        let solution = engine.generate_novel_solution("onboarding flow", &request);
        assert_eq!(solution.constraints, vec!["budget under $1k"]);
    }

    #[test]
    fn test_combine_patterns() {
        let engine = CreativeEngine::default();
        let solution = engine
            .combine_patterns(
                "plugin marketplace",
                &["plugin_architecture".to_string(), "gamification".to_string()],
                &CreativeRequest::default(),
            )
            .unwrap();
        assert_eq!(solution.patterns, vec!["plugin_architecture", "gamification"]);

        let err = engine
            .combine_patterns("x", &["teleportation".to_string()], &CreativeRequest::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown creative pattern 'teleportation'");
    }

    #[test]
    fn test_evolution_counts_and_params() {
        let engine = CreativeEngine::new(CreativeConfig {
            seed: Some(11),
            generations: 3,
            population_size: 6,
            ..CreativeConfig::default()
        });
        let params = engine.evolution_params(&CreativeRequest::default().with_domain("data"));
        assert_eq!(params.seed, Some(11));
        assert_eq!(params.domain.as_deref(), Some("data"));

        let outcome = engine.evolve_solution_genetic("batch etl", &params).unwrap();
        assert_eq!(outcome.fitness_history.len(), 3);
        assert_eq!(engine.stats().evolutions_run, 1);
        assert_eq!(engine.stats().patterns, 10);
    }
}
