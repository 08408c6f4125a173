#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = aulaflow_rust::run_worker().await {
        eprintln!("aulaflow-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
