//! docker CLI entry point

use docker_cli::cli::Runner;
use docker_cli::streams::Streams;

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let code = Runner::new(Streams::standard()).run(argv).await;
    std::process::exit(code);
}
