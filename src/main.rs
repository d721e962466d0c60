//! Entry point for the TCP interception fabric: parses the `-itinerary`
//! flag, wires up logging and signal handling, then runs the itinerary
//! until a signal fires or every listener exits.

use std::path::PathBuf;

use detour::{logging, signal};

const DEFAULT_ITINERARY: &str = "itinerary.json";

fn print_usage() {
    eprintln!("detour {}", env!("CARGO_PKG_VERSION"));
    eprintln!("usage: detour [-itinerary <path>]");
    eprintln!("  -itinerary <path>   itinerary JSON file (default: {DEFAULT_ITINERARY})");
}

fn parse_itinerary_path(args: &[String]) -> Option<PathBuf> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-itinerary" => {
                return Some(PathBuf::from(iter.next()?));
            }
            "--help" | "-h" => return None,
            _ => {}
        }
    }
    Some(PathBuf::from(DEFAULT_ITINERARY))
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let itinerary_path = match parse_itinerary_path(&args) {
        Some(path) => path,
        None => {
            print_usage();
            std::process::exit(0);
        }
    };

    logging::init();
    signal::install();

    if let Err(e) = detour::run_itinerary(&itinerary_path).await {
        log::error!("failed to load itinerary {}: {e}", itinerary_path.display());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_itinerary_path_used_when_no_flag_given() {
        let args: Vec<String> = vec![];
        assert_eq!(
            parse_itinerary_path(&args),
            Some(PathBuf::from(DEFAULT_ITINERARY))
        );
    }

    #[test]
    fn itinerary_flag_overrides_default() {
        let args = vec!["-itinerary".to_string(), "custom.json".to_string()];
        assert_eq!(parse_itinerary_path(&args), Some(PathBuf::from("custom.json")));
    }

    #[test]
    fn help_flag_suppresses_startup() {
        let args = vec!["--help".to_string()];
        assert_eq!(parse_itinerary_path(&args), None);
    }
}
