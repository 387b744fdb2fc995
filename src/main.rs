use std::error::Error;
use std::path::PathBuf;

use ekg_monitor::config::{load_config, Config};
use ekg_monitor::local::server::SimulatorOptions;
use ekg_monitor::local::{client, server};
use ekg_monitor::session::{SessionMetadata, SubjectMetadata};
use ekg_monitor::utils::log::init_logging;

fn config_from(path: Option<&String>) -> Result<Config, Box<dyn Error>> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(Config::default()),
    }
}

/// `[output.csv label gender age condition]`
fn metadata_from(args: &[String]) -> Result<SessionMetadata, Box<dyn Error>> {
    match args {
        [] => Ok(SessionMetadata::unrecorded()),
        [path, label, gender, age, condition] => Ok(SessionMetadata::recorded(
            SubjectMetadata {
                label: label.clone(),
                gender: gender.clone(),
                age: age.clone(),
                condition: condition.clone(),
            },
            path,
        )),
        _ => Err("recording needs: <output.csv> <label> <gender> <age> <condition>".into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "simulate" => {
                let config = config_from(args.get(2))?;
                init_logging(&config.logging.level)?;

                let mut options = SimulatorOptions::from_config(&config);
                // a number is a heart rate, anything else an export to replay
                if let Some(arg) = args.get(3) {
                    match arg.parse::<f64>() {
                        Ok(bpm) => options.heart_rate_bpm = bpm,
                        Err(_) => options.replay = Some(PathBuf::from(arg)),
                    }
                }
                server::run(&options)?;
            }
            "monitor" => {
                let config = config_from(args.get(2))?;
                init_logging(&config.logging.level)?;

                let metadata = metadata_from(args.get(3..).unwrap_or(&[]))?;
                client::run(config, metadata)?;
            }
            _ => println!("Invalid argument, please use 'simulate' or 'monitor'"),
        }
    } else {
        println!("Please specify 'simulate' or 'monitor' as argument");
        println!("  simulate [config.yaml] [heart_rate_bpm | replay.csv]");
        println!("  monitor [config.yaml] [output.csv label gender age condition]");
    }
    Ok(())
}
