#[tokio::main]
async fn main() {
    if let Err(err) = orderbook::start(std::env::args()).await {
        eprintln!("order book failed to start: {err:#}");
        std::process::exit(1);
    }
}
