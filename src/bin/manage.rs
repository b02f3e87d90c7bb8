//! Administrative commands for the parts of the site the API keeps read-only.

use clap::{Parser, Subcommand};
use std::process;

use yatube_api::config::Settings;
use yatube_api::db::{self, Pool};
use yatube_api::group::{Group, NewGroup};
use yatube_api::logger;
use yatube_api::post::Post;
use yatube_api::types::ApiError;

#[derive(Parser)]
#[command(name = "manage")]
#[command(about = "Yatube API management commands", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Create a group
    CreateGroup {
        #[arg(long)]
        title: String,

        #[arg(long)]
        slug: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Delete a group; its posts stay, ungrouped
    DeleteGroup {
        #[arg(value_name = "SLUG")]
        slug: String,
    },

    /// List all groups
    ListGroups,
}

fn fail(message: String) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}

fn describe(error: ApiError) -> String {
    match error {
        ApiError::Validation(errors) => serde_json::to_string(&errors).unwrap_or_else(|_| "invalid input".into()),
        ApiError::Diesel(e) => e.to_string(),
        other => format!("{:?}", other),
    }
}

fn open_pool(settings: &Settings) -> Pool {
    let pool = db::init_pool(&settings.database_url, 1).unwrap_or_else(|e| fail(e.to_string()));
    db::run_migrations(&pool).unwrap_or_else(|e| fail(e.to_string()));
    pool
}

fn main() {
    logger::init();
    let cli = Cli::parse();
    let settings = Settings::from_env().unwrap_or_else(|e| fail(e.to_string()));
    let pool = open_pool(&settings);
    let mut connection = pool.get().unwrap_or_else(|e| fail(e.to_string()));

    match cli.command {
        Commands::Migrate => println!("Migrations are up to date."),
        Commands::CreateGroup {
            title,
            slug,
            description,
        } => {
            let new_group = NewGroup {
                title,
                slug,
                description,
            };
            let group = new_group
                .insert(&mut connection)
                .unwrap_or_else(|e| fail(describe(e)));
            println!("Created group {} ({}) with id {}.", group.title, group.slug, group.id);
        }
        Commands::DeleteGroup { slug } => {
            let group = Group::load_by_slug(&slug, &mut connection)
                .unwrap_or_else(|e| fail(format!("group {}: {}", slug, e)));
            let posts = Post::load_by_group(group.id, &mut connection).unwrap_or_else(|e| fail(e.to_string()));
            group.delete(&mut connection).unwrap_or_else(|e| fail(e.to_string()));
            println!("Deleted group {}; {} post(s) are now ungrouped.", group.slug, posts.len());
        }
        Commands::ListGroups => {
            let groups = Group::all(&mut connection).unwrap_or_else(|e| fail(e.to_string()));
            for group in groups {
                println!("{:>4}  {:<30}  {}", group.id, group.slug, group.title);
            }
        }
    }
}
