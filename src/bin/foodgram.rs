use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use log::info;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use foodgram_sdk::{
    actions::import_ingredients,
    jwt::SessionKeys,
    media::MediaStore,
    routes::{routes, Context},
    schema::NewIngredient,
    ServerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "foodgram")]
#[command(about = "Recipe sharing backend")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply migrations and serve the HTTP API
    Serve(ServerConfig),
    /// Apply pending migrations and exit
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Load `[{"name", "measurement_unit"}]` fixtures into the ingredient catalog
    ImportIngredients {
        file: PathBuf,

        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

async fn connect(database_url: &str, max_connections: u32) -> Result<Pool<Postgres>> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("Could not connect to the database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Could not apply migrations")?;
    info!("Migrations applied");

    Ok(pool)
}

async fn serve(config: ServerConfig) -> Result<()> {
    let pool = connect(&config.database_url, config.max_connections).await?;
    let keys = SessionKeys::new(&config.jwt_secret, config.session_hours)?;

    tokio::fs::create_dir_all(&config.media_root)
        .await
        .with_context(|| format!("Could not create {}", config.media_root.display()))?;

    let context = Context {
        pool,
        keys,
        media: MediaStore::new(config.media_root),
    };

    info!("Listening on http://{}", config.bind);
    warp::serve(routes(context)).run(config.bind).await;

    Ok(())
}

async fn import(file: PathBuf, database_url: String) -> Result<()> {
    let data = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Could not read {}", file.display()))?;
    let ingredients: Vec<NewIngredient> =
        serde_json::from_str(&data).context("Fixture must be a list of ingredients")?;

    let total = ingredients.len();
    let pool = connect(&database_url, 1).await?;
    let inserted = import_ingredients(ingredients, &pool).await?;

    info!("Imported {inserted} of {total} ingredients");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve(config) => serve(config).await,
        Command::Migrate { database_url } => connect(&database_url, 1).await.map(|_| ()),
        Command::ImportIngredients { file, database_url } => import(file, database_url).await,
    }
}
