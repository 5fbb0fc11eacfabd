//! # Mentor Harness CLI (`mentor`)
//!
//! The `mentor` binary drives the orchestration pipeline from the
//! command line and hosts the JSON HTTP server.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mentor init` | Create the SQLite database and run schema migrations |
//! | `mentor agents` | List agent personas and their model settings |
//! | `mentor ask "<message>"` | Run one pipeline turn and print the answer |
//! | `mentor collaborate "<message>"` | Ask several agents in sequence |
//! | `mentor usage <user>` | Show spend aggregates and quota headroom |
//! | `mentor serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! mentor init --config ./config/mentor.toml
//! mentor ask "analyze competitor X" --agent competitor-scout --user demo
//! mentor usage demo
//! mentor serve
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use mentor_harness::agent::AgentKind;
use mentor_harness::completion::OpenAiCompletion;
use mentor_harness::compose::ContextBlock;
use mentor_harness::config::load_config;
use mentor_harness::ledger::QuotaDecision;
use mentor_harness::pipeline::{
    run_collaboration, run_turn, PipelineDeps, TurnInput, TurnResult,
};
use mentor_harness::retry::RetryPolicy;
use mentor_harness::search::{SearchChain, SearchRequest};
use mentor_harness::{db, ledger, migrate, server};

/// Mentor Harness — a multi-provider AI orchestration pipeline for
/// mentoring agents.
#[derive(Parser)]
#[command(
    name = "mentor",
    about = "Mentor Harness — a multi-provider AI orchestration pipeline for mentoring agents",
    version,
    long_about = "Mentor Harness chains a web-search provider, a prompt composer, a \
    chat-completion adapter, and a grounding validator into one pipeline per user turn, \
    with an append-only usage ledger enforcing spend quotas server-side."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mentor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent — running it multiple times is safe.
    Init,

    /// List agent personas and their model settings.
    Agents,

    /// Run one pipeline turn and print the answer.
    Ask {
        /// The user message.
        message: String,

        /// Agent persona to address.
        #[arg(long, value_enum, default_value = "mentor")]
        agent: AgentKind,

        /// User id charged for the turn.
        #[arg(long, default_value = "local")]
        user: String,

        /// Company hint forwarded to the search providers.
        #[arg(long)]
        company: Option<String>,

        /// Industry hint forwarded to the search providers.
        #[arg(long)]
        industry: Option<String>,

        /// Recency filter for the primary search provider (e.g. "month").
        #[arg(long)]
        timeframe: Option<String>,

        /// Free-text profile included in the composed prompt.
        #[arg(long)]
        profile: Option<String>,
    },

    /// Ask several agents the same question, sequentially.
    Collaborate {
        /// The user message.
        message: String,

        /// Agents to consult, in order.
        #[arg(long, value_enum, num_args = 1.., default_values_t = [AgentKind::DiscoveryAnalyst, AgentKind::StrategyAdvisor])]
        agents: Vec<AgentKind>,

        /// User id charged for the turns.
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Show spend aggregates and quota headroom for a user.
    Usage {
        /// User id to summarize.
        user: String,
    },

    /// Start the JSON HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&config).await?;
            println!("database initialized at {}", config.db.path.display());
        }

        Commands::Agents => {
            println!("{:<20} {:<14} {:>6} {:>8}", "agent", "model", "temp", "tokens");
            for kind in AgentKind::ALL {
                let s = kind.model_settings();
                println!(
                    "{:<20} {:<14} {:>6.1} {:>8}",
                    kind.as_str(),
                    s.model,
                    s.temperature,
                    s.max_tokens
                );
            }
        }

        Commands::Ask {
            message,
            agent,
            user,
            company,
            industry,
            timeframe,
            profile,
        } => {
            let deps = build_deps(&config).await?;

            let mut search = SearchRequest::new(message.clone());
            search.company_name = company;
            search.industry = industry;
            search.timeframe = timeframe;

            let input = TurnInput {
                user_id: user,
                agent,
                message,
                context: ContextBlock {
                    profile,
                    knowledge: Vec::new(),
                },
                history: Vec::new(),
                search: Some(search),
            };

            match run_turn(&deps, &config, &input).await? {
                TurnResult::QuotaExceeded(decision) => print_quota_block(&decision),
                TurnResult::Completed(outcome) => {
                    println!("{}", outcome.response);
                    println!();
                    println!(
                        "-- {} | {} tokens | ${:.4}{}{}",
                        outcome.model,
                        outcome.tokens_used,
                        outcome.cost,
                        if outcome.regenerated { " | regenerated" } else { "" },
                        if outcome.degraded { " | degraded" } else { "" },
                    );
                }
            }
        }

        Commands::Collaborate {
            message,
            agents,
            user,
        } => {
            let deps = build_deps(&config).await?;
            let base = TurnInput::new(user, AgentKind::Mentor, message);

            for (agent, result) in run_collaboration(&deps, &config, &base, &agents).await? {
                println!("=== {} ===", agent.as_str());
                match result {
                    TurnResult::QuotaExceeded(decision) => print_quota_block(&decision),
                    TurnResult::Completed(outcome) => println!("{}", outcome.response),
                }
                println!();
            }
        }

        Commands::Usage { user } => {
            let pool = db::connect(&config).await?;
            let summary = ledger::usage_summary(&pool, &user).await?;
            println!("usage for {}", summary.user_id);
            println!(
                "  today:  ${:.4} of ${:.2}",
                summary.today_usd, config.quota.daily_limit_usd
            );
            println!(
                "  month:  ${:.4} of ${:.2}",
                summary.month_usd, config.quota.monthly_limit_usd
            );
            println!("  total:  ${:.4}", summary.total_usd);
            println!("  turns:  {}", summary.request_count);
        }

        Commands::Serve => {
            let deps = build_deps(&config).await?;
            server::run_server(&config, deps).await?;
        }
    }

    Ok(())
}

/// Wire the real HTTP providers into a dependency bundle.
async fn build_deps(config: &mentor_harness::config::Config) -> Result<PipelineDeps> {
    let pool = db::connect(config).await?;
    Ok(PipelineDeps {
        pool,
        search_chain: SearchChain::from_config(&config.search),
        completion: Box::new(OpenAiCompletion::from_config(&config.completion)),
        retry: RetryPolicy::from_config(&config.retry),
    })
}

fn print_quota_block(decision: &QuotaDecision) {
    match decision {
        QuotaDecision::DailyExceeded { used_usd, limit_usd } => {
            println!(
                "daily quota reached: ${:.2} of ${:.2} used. Try again tomorrow.",
                used_usd, limit_usd
            );
        }
        QuotaDecision::MonthlyExceeded { used_usd, limit_usd } => {
            println!(
                "monthly quota reached: ${:.2} of ${:.2} used.",
                used_usd, limit_usd
            );
        }
        QuotaDecision::Allowed => {}
    }
}
