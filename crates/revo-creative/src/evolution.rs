use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use revo_config::CreativeConfig;
use revo_core::AppError;
use serde::Serialize;

use crate::catalog::{CATALOG, CreativePattern, find_pattern, rank_patterns};
use crate::solution::{Solution, mean, render_solution};

const TOURNAMENT_SIZE: usize = 3;
const FLOAT_STEP: f32 = 0.1;
/// Every domain a genome can toggle on or off.
const DOMAINS: [&str; 7] = [
    "ai",
    "architecture",
    "data",
    "design",
    "general",
    "performance",
    "ux",
];

#[derive(Debug, Clone)]
pub struct EvolutionParams {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    /// Patterns per genome.
    pub genes: usize,
    pub domain: Option<String>,
    pub constraints: Vec<String>,
    /// None draws a fresh seed, reported back in the outcome.
    pub seed: Option<u64>,
}

impl EvolutionParams {
    pub fn from_config(config: &CreativeConfig) -> Self {
        Self {
            population_size: config.population_size,
            generations: config.generations,
            mutation_rate: config.mutation_rate,
            genes: config.top_patterns.clamp(1, 3),
            domain: None,
            constraints: Vec::new(),
            seed: config.seed,
        }
    }
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self::from_config(&CreativeConfig::default())
    }
}

/// `[pattern_ids, domains, creativity, feasibility]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Genome {
    pub pattern_ids: Vec<&'static str>,
    pub domains: Vec<&'static str>,
    pub creativity: f32,
    pub feasibility: f32,
}

impl Genome {
    fn from_patterns(patterns: &[&'static CreativePattern]) -> Self {
        let mut domains: Vec<&'static str> = patterns.iter().map(|p| p.domain).collect();
        domains.sort_unstable();
        domains.dedup();
        Self {
            pattern_ids: patterns.iter().map(|p| p.id).collect(),
            domains,
            creativity: mean(patterns.iter().map(|p| p.creativity)),
            feasibility: mean(patterns.iter().map(|p| p.feasibility)),
        }
    }

    pub fn fitness(&self) -> f32 {
        self.creativity * 0.6 + self.feasibility * 0.4
    }

    fn patterns(&self) -> Vec<&'static CreativePattern> {
        self.pattern_ids.iter().filter_map(|id| find_pattern(id)).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionOutcome {
    pub solution: Solution,
    pub best: Genome,
    pub best_fitness: f32,
    /// Best fitness after each generation.
    pub fitness_history: Vec<f32>,
    pub generations: usize,
    pub seed: u64,
}

/// Toy genetic search over pattern combinations.
///
/// Tournament selection, single-slot crossover, three mutation kinds and
/// one-genome elitism. The same seed always yields the same outcome.
pub fn evolve_solution_genetic(problem: &str, params: &EvolutionParams) -> Result<EvolutionOutcome> {
    if params.population_size == 0 {
        return Err(AppError::EmptyPopulation.into());
    }
    let seed = params.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let genes = params.genes.clamp(1, CATALOG.len());
    let mutation_rate = params.mutation_rate.clamp(0.0, 1.0);

    let mut population = seed_population(problem, params, genes, &mut rng);
    let mut best = fittest(&population).clone();
    let mut fitness_history = Vec::with_capacity(params.generations);

    for generation in 0..params.generations {
        let mut next = Vec::with_capacity(population.len());
        next.push(best.clone());
        while next.len() < population.len() {
            let left = tournament(&population, &mut rng);
            let right = tournament(&population, &mut rng);
            let mut child = crossover(left, right, &mut rng);
            if rng.gen_bool(mutation_rate) {
                mutate(&mut child, &mut rng);
            }
            next.push(child);
        }
        population = next;

        let generation_best = fittest(&population);
        if generation_best.fitness() > best.fitness() {
            best = generation_best.clone();
        }
        fitness_history.push(best.fitness());
        tracing::trace!(generation, best_fitness = best.fitness(), "generation evolved");
    }

    let solution = render_solution(
        problem,
        &best.patterns(),
        &params.constraints,
        best.creativity,
        best.feasibility,
    );
    Ok(EvolutionOutcome {
        solution,
        best_fitness: best.fitness(),
        best,
        fitness_history,
        generations: params.generations,
        seed,
    })
}

/// First genome is the top-ranked patterns; the rest draw from the top
/// `genes * 2` candidates.
fn seed_population(
    problem: &str,
    params: &EvolutionParams,
    genes: usize,
    rng: &mut StdRng,
) -> Vec<Genome> {
    let ranked: Vec<&'static CreativePattern> = rank_patterns(problem, params.domain.as_deref())
        .into_iter()
        .map(|(pattern, _)| pattern)
        .collect();
    let pool_size = (genes * 2).min(ranked.len());
    let candidates = &ranked[..pool_size];

    let mut population = Vec::with_capacity(params.population_size);
    population.push(Genome::from_patterns(&ranked[..genes]));
    while population.len() < params.population_size {
        let chosen: Vec<&'static CreativePattern> =
            candidates.choose_multiple(rng, genes).copied().collect();
        population.push(Genome::from_patterns(&chosen));
    }
    population
}

fn fittest(population: &[Genome]) -> &Genome {
    let mut best = &population[0];
    for genome in &population[1..] {
        if genome.fitness() > best.fitness() {
            best = genome;
        }
    }
    best
}

fn tournament<'p>(population: &'p [Genome], rng: &mut StdRng) -> &'p Genome {
    let mut winner = &population[rng.gen_range(0..population.len())];
    for _ in 1..TOURNAMENT_SIZE {
        let contender = &population[rng.gen_range(0..population.len())];
        if contender.fitness() > winner.fitness() {
            winner = contender;
        }
    }
    winner
}

/// Copy `left`, replacing one of the four slots with `right`'s.
fn crossover(left: &Genome, right: &Genome, rng: &mut StdRng) -> Genome {
    let mut child = left.clone();
    match rng.gen_range(0..4) {
        0 => child.pattern_ids = right.pattern_ids.clone(),
        1 => child.domains = right.domains.clone(),
        2 => child.creativity = right.creativity,
        _ => child.feasibility = right.feasibility,
    }
    child
}

fn mutate(genome: &mut Genome, rng: &mut StdRng) {
    match rng.gen_range(0..3) {
        0 => swap_pattern(genome, rng),
        1 => toggle_domain(genome, rng),
        _ => {
            let delta = rng.gen_range(-FLOAT_STEP..=FLOAT_STEP);
            if rng.gen_bool(0.5) {
                genome.creativity = (genome.creativity + delta).clamp(0.0, 1.0);
            } else {
                genome.feasibility = (genome.feasibility + delta).clamp(0.0, 1.0);
            }
        }
    }
}

/// Replace one pattern with a catalog pattern not already present, pulling
/// the float genes a step toward the newcomer.
fn swap_pattern(genome: &mut Genome, rng: &mut StdRng) {
    if genome.pattern_ids.is_empty() {
        return;
    }
    let outsiders: Vec<&'static CreativePattern> = CATALOG
        .iter()
        .filter(|pattern| !genome.pattern_ids.contains(&pattern.id))
        .collect();
    let Some(incoming) = outsiders.choose(rng) else {
        return;
    };
    let slot = rng.gen_range(0..genome.pattern_ids.len());
    genome.pattern_ids[slot] = incoming.id;

    let weight = 1.0 / genome.pattern_ids.len() as f32;
    genome.creativity = genome.creativity * (1.0 - weight) + incoming.creativity * weight;
    genome.feasibility = genome.feasibility * (1.0 - weight) + incoming.feasibility * weight;
}

fn toggle_domain(genome: &mut Genome, rng: &mut StdRng) {
    let Some(domain) = DOMAINS.choose(rng) else {
        return;
    };
    if let Some(index) = genome.domains.iter().position(|d| d == domain) {
        genome.domains.remove(index);
    } else {
        genome.domains.push(*domain);
        genome.domains.sort_unstable();
    }
}
