use clap::{Arg, ArgAction, Command};
use flightalerts::config::SecretString;
use flightalerts::flights::FlightClient;
use flightalerts::llm::GeminiClient;
use flightalerts::set_up_logger;
use flightalerts::types::{SearchRequest, TrackedSearch};
use log::debug;

struct Args {
    verbose: bool,
    origin: String,
    destination: String,
    departure_date: String,
    return_date: Option<String>,
    notes: String,
    api_key: String,
    gemini_key: Option<String>,
}

fn parse_args() -> Args {
    let matches = Command::new("flightalerts")
        .version("0.1")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Outputs DEBUG and higher log messages."),
        )
        .arg(
            Arg::new("origin")
                .short('o')
                .long("origin")
                .required(true)
                .help("Origin airport code, e.g. IAD."),
        )
        .arg(
            Arg::new("destination")
                .short('d')
                .long("destination")
                .required(true)
                .help("Destination airport code, e.g. BLR."),
        )
        .arg(
            Arg::new("date")
                .long("date")
                .required(true)
                .help("Departure date, YYYY-MM-DD."),
        )
        .arg(
            Arg::new("return")
                .long("return")
                .help("Return date, YYYY-MM-DD."),
        )
        .arg(
            Arg::new("notes")
                .short('n')
                .long("notes")
                .help("Free-text constraints to evaluate the quote against."),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .env("RAPIDAPI_KEY")
                .required(true)
                .help("RapidAPI key for the flight-search API."),
        )
        .arg(
            Arg::new("gemini-key")
                .long("gemini-key")
                .env("GEMINI_API_KEY")
                .help("Gemini API key. Without it, notes are not evaluated."),
        )
        .get_matches();

    Args {
        verbose: matches.get_flag("verbose"),
        origin: matches.get_one::<String>("origin").unwrap().clone(),
        destination: matches.get_one::<String>("destination").unwrap().clone(),
        departure_date: matches.get_one::<String>("date").unwrap().clone(),
        return_date: matches.get_one::<String>("return").cloned(),
        notes: matches
            .get_one::<String>("notes")
            .cloned()
            .unwrap_or_default(),
        api_key: matches.get_one::<String>("api-key").unwrap().clone(),
        gemini_key: matches.get_one::<String>("gemini-key").cloned(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    set_up_logger(module_path!(), args.verbose)?;
    debug!(
        "Querying {} -> {} on {}",
        args.origin, args.destination, args.departure_date
    );

    let request = SearchRequest {
        username: "Local".to_owned(),
        origin_sky_id: args.origin,
        destination_sky_id: args.destination,
        departure_date: args.departure_date,
        return_date: args.return_date,
        adults: 1,
        children: 0,
        infants: 0,
        cabin_class: "economy".to_owned(),
        stops: "direct,1stop,2stops".to_owned(),
        notes: args.notes,
    };
    let search = TrackedSearch::from_request("local", request, chrono::Utc::now().timestamp());

    let flights = FlightClient::new(SecretString::new(args.api_key));
    let quote = flights.search_roundtrip(&search).await?;
    println!("Best quote: {} on {}", quote.price, quote.airline);

    if !search.notes.is_empty() {
        if let Some(key) = args.gemini_key {
            let llm = GeminiClient::new(SecretString::new(key));
            let verdict = llm.evaluate_deal(&search, &quote).await?;
            if verdict.matched {
                println!("Match: {}", verdict.sms);
            } else {
                println!("Filtered: quote does not meet the notes.");
            }
        } else {
            println!("Notes given but no Gemini key; skipping evaluation.");
        }
    }

    Ok(())
}
