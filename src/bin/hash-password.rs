use bcrypt::DEFAULT_COST;
use quillpress::auth::credentials::hash_password;
use std::env;

fn main() {
    let password = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin hash-password <PASSWORD> [COST]");
        std::process::exit(1);
    });
    let cost = env::args()
        .nth(2)
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_COST);

    match hash_password(&password, cost) {
        Ok(hashed) => {
            println!("\nCost     : {}", cost);
            println!("Hash     : {}\n", hashed);
            println!("# Paste this into your .env:");
            println!("ADMIN_PASSWORD_HASH={}", hashed);
        }
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            std::process::exit(1);
        }
    }
}
