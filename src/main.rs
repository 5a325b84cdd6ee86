//! Quillpress - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    if let Err(e) = quillpress::run().await {
        eprintln!("quillpress failed to start: {}", e);
        std::process::exit(1);
    }
}
