#[tokio::main]
async fn main() {
    if let Err(err) = loan_dashboard::run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
