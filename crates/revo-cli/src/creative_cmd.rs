use anyhow::Result;
use revo_config::RevoConfig;
use revo_core::OutputFormat;
use revo_creative::{CreativeEngine, CreativeRequest, EvolutionOutcome, Solution};

use crate::cli::CreativeCommands;
use crate::output::print_json;

pub(crate) fn handle_creative_command(
    command: CreativeCommands,
    config: &RevoConfig,
    format: OutputFormat,
) -> Result<()> {
    let engine = CreativeEngine::new(config.creative.clone());
    match command {
        CreativeCommands::Generate {
            problem,
            domain,
            constraints,
        } => {
            let solution = engine.generate_novel_solution(&problem, &creative_request(domain, constraints));
            emit_solution(&solution, format)
        }
        CreativeCommands::Evolve {
            problem,
            generations,
            population,
            mutation_rate,
            seed,
            domain,
        } => {
            let mut params = engine.evolution_params(&creative_request(domain, Vec::new()));
            if let Some(generations) = generations {
                params.generations = generations;
            }
            if let Some(population) = population {
                params.population_size = population;
            }
            if let Some(rate) = mutation_rate {
                params.mutation_rate = rate.clamp(0.0, 1.0);
            }
            if seed.is_some() {
                params.seed = seed;
            }

            let outcome = engine.evolve_solution_genetic(&problem, &params)?;
            match format {
                OutputFormat::Json => print_json(&outcome),
                OutputFormat::Text => {
                    print_evolution(&outcome);
                    Ok(())
                }
            }
        }
        CreativeCommands::Combine { problem, patterns } => {
            let solution = engine.combine_patterns(&problem, &patterns, &CreativeRequest::default())?;
            emit_solution(&solution, format)
        }
        CreativeCommands::Patterns => {
            let patterns = engine.patterns();
            match format {
                OutputFormat::Json => print_json(patterns),
                OutputFormat::Text => {
                    for pattern in patterns {
                        println!(
                            "{:<20} {:<12} creativity {:.2}  feasibility {:.2}",
                            pattern.id, pattern.domain, pattern.creativity, pattern.feasibility
                        );
                        println!("    {}", pattern.description);
                    }
                    Ok(())
                }
            }
        }
    }
}

fn creative_request(domain: Option<String>, constraints: Vec<String>) -> CreativeRequest {
    let request = CreativeRequest::default().with_constraints(constraints);
    match domain {
        Some(domain) => request.with_domain(domain),
        None => request,
    }
}

fn emit_solution(solution: &Solution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(solution),
        OutputFormat::Text => {
            print_solution(solution);
            Ok(())
        }
    }
}

fn print_solution(solution: &Solution) {
    println!("{} [{}]", solution.title, solution.id);
    println!(
        "Innovation: {:?}  creativity {:.2}  feasibility {:.2}",
        solution.innovation_level, solution.creativity_score, solution.feasibility_score
    );
    println!("Patterns:   {}", solution.patterns.join(", "));
    println!("Domains:    {}", solution.domains.join(", "));
    println!();
    println!("{}", solution.description);
    println!();
    for (index, step) in solution.approach.iter().enumerate() {
        println!("{}. {step}", index + 1);
    }
    if !solution.constraints.is_empty() {
        println!();
        println!("Constraints: {}", solution.constraints.join("; "));
    }
}

fn print_evolution(outcome: &EvolutionOutcome) {
    print_solution(&outcome.solution);
    println!();
    println!(
        "Evolved {} generations (seed {}), best fitness {:.3}",
        outcome.generations, outcome.seed, outcome.best_fitness
    );
    let history: Vec<String> = outcome
        .fitness_history
        .iter()
        .map(|fitness| format!("{fitness:.3}"))
        .collect();
    println!("Fitness by generation: {}", history.join(" "));
}
