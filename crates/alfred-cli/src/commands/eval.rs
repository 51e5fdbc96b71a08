use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;

use alfred::bootstrap::build_agent;
use alfred::config::Settings;
use alfred::evaluation::{run_evaluation, EvaluationSummary, DEFAULT_QUERIES};

pub async fn execute(
    settings: &Settings,
    queries: Vec<String>,
    json: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let agent = build_agent(settings).await?;
    let queries = if queries.is_empty() {
        DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
    } else {
        queries
    };

    let summary = run_evaluation(&agent, &queries).await;

    if let Some(path) = &output {
        let report = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, report)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&summary);
        if let Some(path) = &output {
            println!("Detailed results saved to {}", path.display());
        }
    }
    Ok(())
}

fn print_report(summary: &EvaluationSummary) {
    for (index, case) in summary.results.iter().enumerate() {
        println!(
            "{} {}",
            style(format!("Test {}/{}:", index + 1, summary.total_tests)).bold(),
            case.query
        );
        match (&case.response, &case.error) {
            (Some(response), _) => println!("{}", response),
            (None, Some(error)) => println!("{}", style(error).red()),
            (None, None) => {}
        }
        println!(
            "{}",
            style(format!(
                "{:.2}s, {} steps, {} messages",
                case.execution_time_secs, case.steps, case.total_messages
            ))
            .dim()
        );
        println!();
    }

    println!("{}", style("Evaluation summary").bold());
    println!("Total tests: {}", summary.total_tests);
    println!("Successful runs: {}", summary.successful_runs);
    println!("Success rate: {:.1}%", summary.success_rate * 100.0);
    println!(
        "Average execution time: {:.2}s",
        summary.average_execution_time_secs
    );
    println!(
        "Total execution time: {:.2}s",
        summary.total_execution_time_secs
    );
}
