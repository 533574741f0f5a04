#[tokio::main]
async fn main() -> std::io::Result<()> {
    arrow_arena::frameworks::server::run_with_config().await
}
