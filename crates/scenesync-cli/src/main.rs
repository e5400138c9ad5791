#[tokio::main]
async fn main() {
    std::process::exit(scenesync_cli::run().await);
}
