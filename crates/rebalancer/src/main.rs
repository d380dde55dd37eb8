#[tokio::main]
async fn main() {
    rebalancer::start(std::env::args()).await;
}
