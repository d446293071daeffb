// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Prints the input arguments of `Demo.Method.VectorAdd` and the
//! definitions of their structured data types.
//!
//! Start the Unified Automation C++ demo server first, then:
//!
//! ```bash
//! cargo run -p uabin-client --example inspect_method_args -- opc.tcp://localhost:48010
//! ```
//!
//! `UABIN_LOG_FORMAT=json` switches to JSON logs; `RUST_LOG` sets the filter.

use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uabin_client::types::{ExpandedNodeId, NodeIdentifier};
use uabin_client::{Address, Argument, Client, ClientSettings, QualifiedName, UaResult};

const DEMO_SERVER_URI: &str = "urn:UnifiedAutomation:UaServerCpp";
const DEMO_NAMESPACE_URI: &str = "http://www.unifiedautomation.com/DemoServer/";
const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:48010";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("UABIN_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

async fn inspect(client: &Client) -> UaResult<()> {
    let method = Address::absolute(
        ExpandedNodeId::with_namespace_uri(
            NodeIdentifier::String("Demo.Method.VectorAdd".into()),
            DEMO_NAMESPACE_URI,
        ),
        Some(DEMO_SERVER_URI),
    );
    let input_arguments = Address::relative(method, [QualifiedName::new(0, "InputArguments")]);

    let result = client.read(&[input_arguments]).await?;
    let target = &result[0];
    let Some(value) = target.data.as_ref().filter(|_| target.is_good()) else {
        error!(status = %target.status_code, error = ?target.error, "InputArguments not readable");
        return Ok(());
    };

    for (i, argument) in Argument::from_variant(value)?.iter().enumerate() {
        println!("========= Argument {} ==========", i);
        println!("{}", argument);

        println!("--------- definition ---------");
        match client.data_type_definition(&argument.data_type).await {
            Ok(definition) => {
                println!("{} ({})", definition.name(), definition.data_type_id());
                for field in definition.fields() {
                    let suffix = if field.is_array() { "[]" } else { "" };
                    let optional = if field.is_optional { " (optional)" } else { "" };
                    println!("  {}: {}{}{}", field.name, field.field_type, suffix, optional);
                }
            }
            Err(e) => println!("  no structure definition: {}", e),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();

    let endpoint = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let settings = match ClientSettings::builder()
        .application_name("uabin inspect_method_args")
        .discovery_url(endpoint.clone())
        .request_timeout(Duration::from_secs(5))
        .build()
    {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Invalid settings");
            std::process::exit(2);
        }
    };

    let client = match Client::new(settings) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Client not created");
            std::process::exit(2);
        }
    };

    info!(endpoint = %endpoint, "Inspecting VectorAdd arguments");
    let outcome = inspect(&client).await;
    if let Err(e) = client.disconnect().await {
        error!(error = %e, "Disconnect failed");
    }
    if let Err(e) = outcome {
        error!(error = %e, "Inspection failed");
        std::process::exit(1);
    }
}
