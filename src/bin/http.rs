#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use dispatch_tool::{
        DispatchConfig, ResourceStore, default_catalog, http_api, open_store, seed_catalog,
    };

    let config = DispatchConfig::from_env()?;
    config.init_tracing();

    let store = open_store(config.database_path.as_deref())?;
    if store.resource_types().await?.is_empty() {
        seed_catalog(store.as_ref(), &default_catalog()).await?;
    }

    println!("dispatch-tool HTTP API listening on http://{}", config.http_addr);
    let state = http_api::AppState::new(store, config.allocation_config());
    http_api::serve(config.http_addr, state).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}
