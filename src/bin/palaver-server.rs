#[tokio::main]
async fn main() {
    palaver::server::run().await;
}
