//! Command-line interface for thermgov.
//!
//! Talks to the running governor through its HTTP API.

use std::env;

use anyhow::Result;

use thermgov::api_client;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let command = &args[1];

    match (command.as_str(), &args[2..]) {
        ("status", []) => cmd_status().await?,
        ("status", [flag]) if flag == "--json" => cmd_status_json().await?,
        ("get", []) => cmd_get_all().await?,
        ("get", [name]) => cmd_get(name).await?,
        ("set", [name, value]) => cmd_set(name, value).await?,
        _ => {
            eprintln!("Unknown command: {}", args[1..].join(" "));
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn usage() {
    eprintln!("Usage: thermgov-cli <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status [--json]      Show governor status");
    eprintln!("  get [NAME]           Show one or all tunables");
    eprintln!("  set NAME VALUE       Write a tunable");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  THERMGOV_API_URL    API base URL (default: http://127.0.0.1:7786)");
}

/// Build an API client, honoring THERMGOV_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("THERMGOV_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

async fn cmd_status() -> Result<()> {
    let client = make_client();
    let status = client.get_status().await?;

    match status.temperature_c {
        Some(temp) if status.sensor_degraded => println!("Temperature: {temp} °C (stale, sensor failing)"),
        Some(temp) => println!("Temperature: {temp} °C"),
        None => println!("Temperature: (no reading yet)"),
    }
    println!(
        "Throttling:  {}",
        if status.throttling { "yes" } else { "no" }
    );
    println!(
        "Max freq:    {} / {} kHz",
        status.limited_max_freq_khz, status.hardware_max_freq_khz
    );
    println!(
        "Topology:    {} ({} cores)",
        status.topology.as_deref().unwrap_or("unknown"),
        status.possible_cores
    );
    println!("Online:      {:?}", status.online_cores);
    println!("Band:        {}", status.band.as_deref().unwrap_or("-"));
    println!(
        "Core ctl:    {}",
        if status.core_control_enabled { "enabled" } else { "disabled" }
    );
    if status.core0_disable_permanently_denied {
        println!("Core 0:      disable permanently denied");
    }
    if status.frequency_table_overridden {
        println!("Freq table:  overridden by user");
    }
    println!("Ticks:       {}", status.ticks);

    Ok(())
}

async fn cmd_status_json() -> Result<()> {
    let client = make_client();
    let status = client.get_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn cmd_get_all() -> Result<()> {
    let client = make_client();
    for tunable in client.get_tunables().await? {
        println!("{:<22} {}", tunable.name, tunable.value);
    }
    Ok(())
}

async fn cmd_get(name: &str) -> Result<()> {
    let client = make_client();
    let tunable = client.get_tunable(name).await?;
    println!("{}", tunable.value);
    Ok(())
}

async fn cmd_set(name: &str, value: &str) -> Result<()> {
    let client = make_client();
    let tunable = client.set_tunable(name, value).await?;
    println!("{} = {}", tunable.name, tunable.value);
    Ok(())
}
