// SPDX-License-Identifier: MIT OR Apache-2.0

//! Basic usage of the configuration reader.
//!
//! This demo shows:
//! - Layering command-line arguments over environment variables and defaults
//! - Typed lookups and defaults for missing keys
//! - Scoped readers
//!
//! To run it:
//! ```bash
//! export DEMO_APP__NAME="MyApplication"
//! export DEMO_DATABASE__PORT="5432"
//! cargo run --example basic_usage -- --enable-debug --api.timeout 30.5
//! ```

use stratacfg::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== stratacfg: Basic Usage ===\n");

    let reader = ConfigReader::builder()
        .with_provider(CommandLineProvider::from_env_args())
        .with_env_prefix("DEMO_")
        .with_provider(InMemoryProvider::new(
            "defaults",
            [
                ("app.name", ConfigValue::from("DefaultApp")),
                ("database.port", ConfigValue::Int(3000)),
                ("api.timeout", ConfigValue::Double(10.0)),
            ],
        ))
        .build()?;

    println!("--- Strings ---");
    println!("app.name = {}", reader.require::<String>("app.name")?);

    println!("\n--- Integers ---");
    match reader.get_as::<u16>("database.port") {
        Ok(Some(port)) => println!("database.port = {}", port),
        Ok(None) => println!("database.port is not set"),
        Err(e) => println!("database.port is invalid: {}", e),
    }

    println!("\n--- Booleans ---");
    println!("enableDebug = {}", reader.bool_or("enableDebug", false)?);

    println!("\n--- Floats ---");
    println!("api.timeout = {} seconds", reader.double_or("api.timeout", 10.0)?);

    println!("\n--- Scoped reader ---");
    let database = reader.scoped("database");
    println!("port via scope = {}", database.int_or("port", 0)?);
    println!("host via scope = {}", database.string_or("host", "localhost")?);

    println!("\n--- Key existence ---");
    println!("some.random.key defined: {}", reader.has("some.random.key")?);

    Ok(())
}
