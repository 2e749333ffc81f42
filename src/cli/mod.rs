use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Map definition file (toml, json, yaml, ...); a built-in demo map otherwise
    #[arg(long)]
    pub map: Option<PathBuf>,

    /// Engine settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop after this many passes through the map
    #[arg(long, default_value_t = 2)]
    pub passes: u32,

    /// At every measure start, print the nearest tick on this subdivision
    #[arg(long)]
    pub snap: Option<u32>,

    /// Manual timing offset in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<f64>,

    /// Log to stderr instead of the log file; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub fn validate_subdivision(subdivision: u32, measure_tick_count: u32) -> Result<(), String> {
    if subdivision == 0 || subdivision > measure_tick_count {
        return Err(format!(
            "Error: subdivision {} must be between 1 and {}",
            subdivision, measure_tick_count
        ));
    }
    if measure_tick_count % subdivision != 0 {
        return Err(format!(
            "Error: subdivision {} does not divide the {} ticks of a measure",
            subdivision, measure_tick_count
        ));
    }
    Ok(())
}
