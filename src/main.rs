use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use meal_orders::backend::HttpBackend;
use meal_orders::clock::SystemClock;
use meal_orders::config::Config;
use meal_orders::domain::order::{format_display, format_iso, MealSlot, OrderId};
use meal_orders::domain::submission::{ConflictPrompt, MealField, ReplaceOutcome, SubmitOutcome};
use meal_orders::metrics::{self, Metrics};
use meal_orders::notice::{NoticeVariant, UiSignal};
use meal_orders::observability;
use meal_orders::session::{OrderSession, SessionSettings};

#[derive(Parser)]
#[command(name = "meal_orders")]
#[command(about = "Register daily meal orders for worksite employees", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register meals for every day of a date range
    Order {
        #[arg(long)]
        dni: String,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Meal type and delivery location ids, e.g. 1:2
        #[arg(long, value_parser = parse_meal)]
        breakfast: Option<MealField>,

        #[arg(long, value_parser = parse_meal)]
        lunch: Option<MealField>,

        #[arg(long, value_parser = parse_meal)]
        dinner: Option<MealField>,

        /// Replace conflicting orders without asking
        #[arg(long)]
        yes: bool,
    },

    /// Show the employee's active orders
    History {
        #[arg(long)]
        dni: String,
    },

    /// Cancel a pending order
    Cancel {
        #[arg(long)]
        dni: String,

        #[arg(long)]
        order: String,
    },

    /// Mark a pending order as delivered
    Deliver {
        #[arg(long)]
        dni: String,

        #[arg(long)]
        order: String,
    },
}

/// `TYPE:LOC`, or just `TYPE` to leave the location empty
fn parse_meal(raw: &str) -> Result<MealField, String> {
    let parse_id = |s: &str| s.trim().parse::<u32>().map_err(|_| format!("invalid id {:?}", s));
    match raw.split_once(':') {
        Some((meal, location)) => Ok(MealField::new(Some(parse_id(meal)?), Some(parse_id(location)?))),
        None => Ok(MealField::new(Some(parse_id(raw)?), None)),
    }
}

fn print_notices(signals: &mut broadcast::Receiver<UiSignal>) {
    while let Ok(signal) = signals.try_recv() {
        if let UiSignal::Notice(notice) = signal {
            let tag = match notice.variant {
                NoticeVariant::Success => "ok",
                NoticeVariant::Info => "info",
                NoticeVariant::Warning => "aviso",
                NoticeVariant::Danger => "error",
            };
            println!("[{}] {}", tag, notice.message);
        }
    }
}

fn print_conflicts(prompt: &ConflictPrompt) {
    if let Some((first, last)) = prompt.requested_span() {
        println!(
            "Ya existen pedidos en el rango {} - {}:",
            format_display(&format_iso(first)),
            format_display(&format_iso(last))
        );
    }
    for conflict in prompt.sorted_conflicts() {
        println!(
            "  {}  {}  ({})",
            format_display(&format_iso(conflict.service_date)),
            conflict.meals,
            conflict.status.label()
        );
    }
}

async fn confirm_on_stdin() -> anyhow::Result<bool> {
    println!("¿Desea reemplazar los pedidos existentes? [s/N]");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "s" | "si" | "sí" | "y" | "yes"))
}

fn print_history(session: &OrderSession) {
    let entries = session.history_view();
    if entries.is_empty() {
        println!("Sin pedidos activos.");
        return;
    }
    for entry in entries {
        let meals: Vec<String> = MealSlot::ALL
            .iter()
            .map(|slot| {
                let meal = entry.meal(*slot);
                format!("{}: {} @ {}", slot.label(), meal.meal_type, meal.location)
            })
            .collect();
        println!(
            "{:>6}  {}  {}  {}/{}{}",
            entry.id.as_str(),
            entry.service_date,
            meals.join(" | "),
            entry.status,
            entry.registration,
            if entry.actionable { "  *" } else { "" }
        );
    }
}

async fn run_order(
    session: &OrderSession,
    signals: &mut broadcast::Receiver<UiSignal>,
    form: (NaiveDate, NaiveDate, [Option<MealField>; 3]),
    yes: bool,
) -> anyhow::Result<bool> {
    let (from, to, meals) = form;
    session.update_form(|form| {
        form.start = Some(from);
        form.end = Some(to);
        for (slot, meal) in MealSlot::ALL.into_iter().zip(meals) {
            *form.field_mut(slot) = meal.unwrap_or_default();
        }
    });

    let outcome = session.submit().await;
    print_notices(signals);

    let SubmitOutcome::Conflict(prompt) = outcome else {
        return Ok(outcome == SubmitOutcome::Registered);
    };

    print_conflicts(&prompt);
    if !(yes || confirm_on_stdin().await?) {
        session.cancel_conflict();
        println!("Operación cancelada; no se modificó ningún pedido.");
        return Ok(false);
    }

    let replaced = session.confirm_replacement().await == ReplaceOutcome::Replaced;
    print_notices(signals);
    Ok(replaced)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;
    config.validate().map_err(anyhow::Error::msg)?;
    observability::init_tracing(&config.observability)?;

    let metrics = Arc::new(Metrics::new()?);
    if config.metrics.enabled {
        let registry = metrics.registry().clone();
        let port = config.metrics.port;
        // actix-web wants its own system
        std::thread::spawn(move || {
            let result = actix_web::rt::System::new().block_on(metrics::start_metrics_server(registry, port));
            if let Err(e) = result {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    tracing::info!(base_url = %config.backend.base_url, conflict_check = ?config.backend.conflict_check, "Starting meal_orders");

    let backend = HttpBackend::new(&config.backend, (&config.circuit_breaker).into())?.with_metrics(metrics.clone());
    let session = OrderSession::start(
        Arc::new(backend),
        SessionSettings::from(&config),
        Arc::new(SystemClock),
        Some(metrics),
    )
    .await?;
    let mut signals = session.subscribe();

    let dni = match &cli.command {
        Commands::Order { dni, .. }
        | Commands::History { dni }
        | Commands::Cancel { dni, .. }
        | Commands::Deliver { dni, .. } => dni.clone(),
    };
    let employee = session.validate_dni(&dni).await;
    print_notices(&mut signals);
    let Some(employee) = employee else {
        return Ok(ExitCode::FAILURE);
    };
    println!("Trabajador: {}", employee.display_name);

    let ok = match cli.command {
        Commands::Order { from, to, breakfast, lunch, dinner, yes, .. } => {
            run_order(&session, &mut signals, (from, to, [breakfast, lunch, dinner]), yes).await?
        }
        Commands::History { .. } => {
            print_history(&session);
            true
        }
        Commands::Cancel { order, .. } => {
            let ok = session.cancel_order(&OrderId::new(order)).await;
            print_notices(&mut signals);
            ok
        }
        Commands::Deliver { order, .. } => {
            let ok = session.mark_delivered(&OrderId::new(order)).await;
            print_notices(&mut signals);
            ok
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meal_with_location() {
        assert_eq!(parse_meal("1:2"), Ok(MealField::new(Some(1), Some(2))));
    }

    #[test]
    fn test_parse_meal_without_location() {
        assert_eq!(parse_meal("3"), Ok(MealField::new(Some(3), None)));
    }

    #[test]
    fn test_parse_meal_rejects_garbage() {
        assert!(parse_meal("normal:mina").is_err());
    }

    #[test]
    fn test_cli_parses_order() {
        let cli = Cli::try_parse_from([
            "meal_orders", "order", "--dni", "12345678", "--from", "2025-07-01", "--to", "2025-07-02",
            "--breakfast", "1:1", "--yes",
        ])
        .unwrap();
        match cli.command {
            Commands::Order { breakfast, lunch, yes, .. } => {
                assert_eq!(breakfast, Some(MealField::new(Some(1), Some(1))));
                assert_eq!(lunch, None);
                assert!(yes);
            }
            _ => panic!("expected order command"),
        }
    }
}
