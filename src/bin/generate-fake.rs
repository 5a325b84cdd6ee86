use quillpress::{config::AppConfig, logging, AppState};
use std::env;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let count: usize = match env::args().nth(1).map(|n| n.parse()) {
        None => 10,
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            eprintln!("Usage: cargo run --bin generate-fake [COUNT]");
            std::process::exit(1);
        }
    };

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let _log_guards = logging::init(&config.log);

    if config.database.is_none() {
        eprintln!("DATABASE_URL is not set; generated posts would be discarded on exit");
        std::process::exit(1);
    }

    let state = match AppState::connect(config).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };

    let result = state.posts.generate_fake(count).await;
    state.shutdown().await;

    match result {
        Ok(inserted) => println!("Inserted {} fake posts", inserted),
        Err(e) => {
            eprintln!("Failed to generate posts: {}", e);
            std::process::exit(1);
        }
    }
}
