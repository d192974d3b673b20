//! CLI entry point: register a user, grant an entitlement, read it back.

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use entitle_core::config::load_section;
use entitle_core::{EntitlementDefinition, User};
use entitle_graph::{
    EntitlementRepository, GraphClient, GraphConfig, LinkPolicy, MemoryGraph, RepositoryConfig,
    Session, UserRegistrar,
};

#[derive(Parser)]
#[command(name = "entitle-demo")]
#[command(about = "Register a user and an entitlement in the graph, then read them back")]
struct Cli {
    /// Name of the user to register.
    #[arg(long, default_value = "testUser")]
    user_name: String,

    /// Value recorded as the entitlement's creator.
    #[arg(long, default_value = "test")]
    created_by: String,

    /// Role granted by the entitlement (repeatable).
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Roll back instead of committing when the entitlement cannot be linked.
    #[arg(long)]
    strict: bool,

    /// Use an in-memory graph instead of Neo4j.
    #[arg(long)]
    in_memory: bool,

    /// Config file prefix (default: entitle).
    #[arg(short, long, default_value = "entitle")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut repo_config: RepositoryConfig = load_section(&cli.config, "repository")?;
    if cli.strict {
        repo_config.link_policy = LinkPolicy::Strict;
    }

    if cli.in_memory {
        tracing::info!("Using in-memory graph");
        run(MemoryGraph::new(), &cli, &repo_config).await
    } else {
        let graph_config: GraphConfig = load_section(&cli.config, "neo4j")?;
        let client = GraphClient::connect(&graph_config).await?;
        run(client, &cli, &repo_config).await
    }
}

async fn run<S>(session: S, cli: &Cli, repo_config: &RepositoryConfig) -> anyhow::Result<()>
where
    S: Session + Clone,
{
    let user = User::new(cli.user_name.as_str());
    UserRegistrar::new(session.clone()).add(&user).await?;

    let now = Utc::now();
    let et = EntitlementDefinition::new(user.id.clone(), now, now, cli.created_by.as_str())
        .with_roles(cli.roles.iter().cloned());

    let repo = EntitlementRepository::new(session).with_config(repo_config);
    let status = repo.add(&et).await?;
    tracing::info!(entitlement_id = %et.id, status = ?status, "Entitlement added");

    let all = repo.get_all().await?;
    println!("found ets: {}", serde_json::to_string_pretty(&all)?);

    match repo.get(&et.id).await? {
        Some(found) => println!("found et: {}", serde_json::to_string_pretty(&found)?),
        None => anyhow::bail!("entitlement {} was not found after add", et.id),
    }

    Ok(())
}
