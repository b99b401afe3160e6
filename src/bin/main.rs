use finance_assistant::{Assistant, AssistantConfig, TurnResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "Ask anything about personal finance, for example:
  What is a stock?
  Analyze my portfolio: AAPL 10, MSFT 5
  I want to retire with $1,000,000 in 25 years
  How do Roth IRAs work?
Commands: help, exit";

fn print_turn(turn: &TurnResponse) {
    println!("\n[{} | confidence {:.2}]", turn.intent, turn.confidence);
    println!("{}\n", turn.response_text);
    if let Some(portfolio) = &turn.updated_portfolio {
        let holdings: Vec<String> = portfolio
            .iter()
            .map(|(symbol, quantity)| format!("{} {}", symbol, quantity))
            .collect();
        println!("Portfolio updated: {}\n", holdings.join(", "));
    }
    if let Some(goals) = &turn.updated_goals {
        println!("Goals on file: {}\n", goals.len());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so they don't interleave with answers
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AssistantConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; answers will fall back to an apology");
    }

    let assistant = Assistant::from_config(&config).await?;
    let _sweeper = assistant
        .sessions()
        .clone()
        .spawn_sweeper(config.session_sweep_interval);

    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session_id = %session_id, "CLI session started");

    println!("Personal Finance Assistant");
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                println!("{}\n", HELP);
                continue;
            }
            _ => {}
        }

        match assistant.handle_message(&session_id, input).await {
            Ok(turn) => print_turn(&turn),
            Err(e) => println!("\n{}\n", e),
        }
    }

    println!("Goodbye.");
    Ok(())
}
