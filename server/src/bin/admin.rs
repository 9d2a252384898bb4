//! Admin tools: inspect the broadcast catalog and seed tournaments to follow.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kibitzer_server::config::Config;
use kibitzer_server::persistence::{Database, TournamentStore};
use lichess::CatalogClient;

#[derive(Parser, Debug)]
#[command(name = "kibitzer-admin", about = "Admin tools for the kibitzer service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "kibitzer.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List broadcast tournaments with their rounds.
    ListTournaments {
        #[arg(long, default_value_t = 5)]
        min_tier: i64,
        /// Only tournaments with a round in progress.
        #[arg(long)]
        only_active: bool,
    },
    /// List the boards of one round.
    ListBoards {
        #[arg(long)]
        round_id: String,
    },
    /// Start following a tournament.
    AddTournament {
        #[arg(long)]
        tour_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let catalog = CatalogClient::new(config.lichess_url.clone());

    match args.command {
        Command::ListTournaments {
            min_tier,
            only_active,
        } => {
            for broadcast in catalog.list_tournaments().await? {
                let tier = broadcast.tour.tier.unwrap_or(0);
                if tier < min_tier {
                    continue;
                }
                if only_active && !broadcast.rounds.iter().any(|r| r.ongoing) {
                    continue;
                }
                println!("{}  {} (tier {})", broadcast.tour.id, broadcast.tour.name, tier);
                for round in &broadcast.rounds {
                    let starts = if round.starts_after_previous {
                        "after previous".to_string()
                    } else {
                        round
                            .starts_at
                            .map(|ms| format!("{ms}ms"))
                            .unwrap_or_else(|| "-".to_string())
                    };
                    println!(
                        "    {}  {:<24} ongoing={:<5} finished={:<5} starts={}  {}",
                        round.id,
                        round.name,
                        round.ongoing,
                        round.finished,
                        starts,
                        round.url.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Command::ListBoards { round_id } => {
            let boards = catalog.get_round(&round_id).await?;
            println!("{} / {}", boards.tour.name, boards.round.name);
            for game in boards.games {
                let players: Vec<String> = game
                    .players
                    .iter()
                    .map(|p| match p.rating {
                        Some(rating) => format!("{} ({rating})", p.name),
                        None => p.name.clone(),
                    })
                    .collect();
                println!(
                    "  {}  {:<40} [{}]  {}",
                    game.id,
                    players.join(" vs "),
                    game.status.as_deref().unwrap_or("?"),
                    game.name,
                );
            }
        }
        Command::AddTournament { tour_id } => {
            let broadcast = catalog.get_tournament(&tour_id).await?;
            let database = Database::open(&config.db_path).await?;
            let store = TournamentStore::new(database.pool().clone());
            let tournament = store
                .insert(&broadcast.tour.id, &broadcast.tour.name)
                .await?;
            println!(
                "Following tournament {} ({}), {} rounds",
                tournament.name,
                tournament.lichess_id,
                broadcast.rounds.len()
            );
        }
    }
    Ok(())
}
