use log::error;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use recipe_harvest::{HarvestConfig, Harvester, PollResponse};

const USAGE: &str = "Usage: recipe-harvest <url> [--config <path>] [--wait <seconds>]";

struct Args {
    url: String,
    config: Option<PathBuf>,
    wait: Duration,
}

fn parse_args() -> Result<Args, String> {
    let mut url = None;
    let mut config = None;
    let mut wait = Duration::from_secs(600);

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(PathBuf::from(args.next().ok_or("--config needs a path")?));
            }
            "--wait" => {
                let seconds = args
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or("--wait needs a number of seconds")?;
                wait = Duration::from_secs(seconds);
            }
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ if url.is_none() => url = Some(arg),
            _ => return Err(format!("Unexpected argument '{}'\n{}", arg, USAGE)),
        }
    }

    Ok(Args {
        url: url.ok_or_else(|| format!("Please provide a URL as an argument\n{}", USAGE))?,
        config,
        wait,
    })
}

async fn run(args: Args) -> Result<PollResponse, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => HarvestConfig::load_from(path)?,
        None => HarvestConfig::load()?,
    };

    let harvester = Harvester::builder().config(config).build()?;
    let submitted = harvester.submit_url(args.url).await?;
    harvester.wait_for(submitted.job_id, args.wait).await?;
    let response = harvester.poll(&submitted.job_id.to_string()).await?;
    harvester.shutdown().await;
    Ok(response)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    match run(args).await {
        Ok(response) => {
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Could not serialize response: {}", e),
            }
            if matches!(response, PollResponse::Success { .. }) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
