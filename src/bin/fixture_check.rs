// src/bin/fixture_check.rs - Apply one fixture descriptor and report what it did
//
// Usage:
//   fixture_check <descriptor.json>
//
// The descriptor file uses the same attribute names as a declaration:
//
//   { "connectionUrl": "postgres://localhost/app", "datasetResource": "users.json",
//     "username": "app", "password": "null", "schema": "public", "validateSchema": true }
//
// An empty connectionUrl falls back to DATABASE_URL (read from .env too).
// Dataset resources are looked up in DBFIXTURE_RESOURCE_PATH and the
// default resource roots.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dbfixture::{
    init_logging, DatasetResolver, DriverManager, FixtureConfig, FixtureDescriptor, ResourceLocator,
    TesterConfigurer, TesterFactory,
};

fn main() -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: fixture_check <descriptor.json>");
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let mut descriptor: FixtureDescriptor =
        serde_json::from_str(&text).with_context(|| format!("parsing descriptor {path}"))?;

    let config = FixtureConfig::from_env();
    if descriptor.connection_url.is_empty() {
        descriptor.connection_url = std::env::var("DATABASE_URL")
            .context("descriptor has no connectionUrl and DATABASE_URL is not set")?;
    }

    println!("Applying fixture from {path}...");
    let factory = TesterFactory::new(Arc::new(DriverManager::with_defaults()));
    let configurer = TesterConfigurer::new(DatasetResolver::new(ResourceLocator::from_config(&config)));

    let mut tester = factory.create(&descriptor, None).await?;
    println!("✓ Connected ({})", tester.connection().backend_name());

    configurer.configure(&mut tester, descriptor.dataset_resource_name())?;
    if tester.dataset().is_empty() {
        println!("  No dataset to load; nothing to do");
        return Ok(());
    }

    tester.on_setup().await?;
    println!("✓ {} applied", tester.setup_operation());

    println!("\nRow counts:");
    for table in tester.dataset().table_names() {
        let count = tester.connection().row_count(tester.schema(), table).await?;
        println!("  - {table}: {count}");
    }

    tester.on_teardown().await?;
    println!("\n✓ {} teardown finished", tester.teardown_operation());
    Ok(())
}
