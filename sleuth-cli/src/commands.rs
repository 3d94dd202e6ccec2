//! Subcommand handlers for the Sleuth CLI.

use crate::{Commands, ConfigAction};
use anyhow::Context;
use sleuth_core::config::SleuthConfig;
use sleuth_core::gateway::{GatewayServer, run_gateway};
use sleuth_core::research::{
    FollowUpAnswer, NoopSink, ProgressEvent, ProgressSink, ResearchEngine, ResearchQuery,
    ResearchReport,
};
use std::path::Path;
use std::sync::Arc;

pub async fn handle_command(
    command: Commands,
    mut config: SleuthConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port, cors } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.gateway.cors |= cors;
            let engine = ResearchEngine::from_config(&config)?;
            let server = Arc::new(GatewayServer::new(config.gateway.clone(), engine));
            run_gateway(server).await?;
            Ok(())
        }
        Commands::Research {
            query,
            threshold,
            no_format,
            json,
        } => {
            let engine = ResearchEngine::from_config(&config)?;
            let query = ResearchQuery::new(query)
                .with_threshold(threshold.unwrap_or(config.research.default_relevance_threshold))
                .with_formatting(!no_format);
            let report = if quiet {
                engine.research(&query, &NoopSink).await?
            } else {
                engine.research(&query, &StderrProgress).await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_report(&report));
            }
            Ok(())
        }
        Commands::Followup {
            question,
            context,
            json,
        } => {
            let context = read_context(&context)
                .with_context(|| format!("Failed to read follow-up context {}", context))?;
            let engine = ResearchEngine::from_config(&config)?;
            let answer = if quiet {
                engine.follow_up(&question, &context, &NoopSink).await?
            } else {
                engine.follow_up(&question, &context, &StderrProgress).await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print!("{}", render_followup(&answer));
            }
            Ok(())
        }
        Commands::Config { action } => Ok(handle_config(action, &config)?),
    }
}

fn handle_config(action: ConfigAction, config: &SleuthConfig) -> sleuth_core::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            Ok(())
        }
        ConfigAction::Check => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration OK");
            }
            for warning in warnings {
                println!("warning: {}", warning);
            }
            Ok(())
        }
    }
}

/// Prints activity lines to stderr so stdout carries only the answer.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Activity(data) => eprintln!("{}", data.message),
            ProgressEvent::Analysis(analysis) => {
                for (i, question) in analysis.sub_questions.iter().enumerate() {
                    eprintln!("   {}. {}", i + 1, question);
                }
            }
            ProgressEvent::Error(data) => eprintln!("{}: {}", data.message, data.error),
            ProgressEvent::Complete(_) => {}
        }
    }
}

/// Inline text, or the contents of the file named after a leading `@`.
fn read_context(arg: &str) -> sleuth_core::Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(Path::new(path))?),
        None => Ok(arg.to_string()),
    }
}

fn render_report(report: &ResearchReport) -> String {
    let synthesis = &report.synthesis;
    let mut out = format!("{}\n\n---\n", synthesis.summary.trim_end());
    out.push_str(&format!(
        "Confidence: {:?} | Sources: {} ({} scraped)",
        synthesis.confidence, synthesis.total_sources, synthesis.total_scraped_sources
    ));
    if let Some(average) = synthesis.average_relevance_score {
        out.push_str(&format!(" | Average relevance: {}", average));
    }
    out.push('\n');

    for entry in &synthesis.source_breakdown {
        for source in &entry.sources {
            out.push_str(&format!("- {} <{}>\n", source.title, source.url));
        }
    }
    out
}

fn render_followup(answer: &FollowUpAnswer) -> String {
    let mut out = format!("{}\n", answer.answer.trim_end());
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &answer.sources {
            out.push_str(&format!("- {} <{}>\n", source.title, source.url));
        }
    }
    out
}
