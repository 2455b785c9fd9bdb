use anyhow::{bail, Context, Result};
use balance_ledger::{
    load_csv, logging, parse_date, Amount, Config, CreditCard, LedgerService, SqliteStore,
};
use chrono::Local;
use std::env;
use std::path::Path;

const USAGE: &str = "\
Usage: balance-ledger <command> [args]

Commands:
  init                                   create the database
  add-user <name> <email>                register a user
  delete-user <user_id>                  delete a user and their cards
  add-card <user_id> <bank> <number>     register a credit card
  cards <user_id>                        list a user's cards
  owner <card_number>                    user id owning a card
  import <file.csv>                      reconcile balances (card_number,date,balance)
  timeline <card_number>                 show stored checkpoints
  balance <card_number> <date>           carried-forward balance on a date
  daily <card_number> <from> <to>        one balance per day
";

fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_tracing(&config.log_filter);

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print!("{}", USAGE);
        return Ok(());
    };

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    let service = LedgerService::new(store);
    let rest = &args[1..];

    match command.as_str() {
        "init" => {
            println!("✓ Database ready at {:?}", config.database_path);
        }
        "add-user" => {
            let [name, email] = expect_args::<2>(rest, "add-user <name> <email>")?;
            let user = service.store().create_user(name, email)?;
            println!("✓ Created user {} ({})", user.id, user.email);
        }
        "delete-user" => {
            let [user_id] = expect_args::<1>(rest, "delete-user <user_id>")?;
            service.store().delete_user(parse_id(user_id)?)?;
            println!("✓ Deleted user {}", user_id);
        }
        "add-card" => {
            let [user_id, bank, number] = expect_args::<3>(rest, "add-card <user_id> <bank> <number>")?;
            let card = service.store().add_credit_card(parse_id(user_id)?, bank, number)?;
            println!("✓ Registered card {} ({}) as #{}", card.masked_number(), card.issuance_bank, card.id);
        }
        "cards" => {
            let [user_id] = expect_args::<1>(rest, "cards <user_id>")?;
            let cards = service.store().list_cards_for_user(parse_id(user_id)?)?;
            println!("💳 {} card(s)", cards.len());
            for card in cards {
                println!("   {:<12} {}", card.issuance_bank, card.number);
            }
        }
        "owner" => {
            let [number] = expect_args::<1>(rest, "owner <card_number>")?;
            let user_id = service.store().user_id_for_card(number)?;
            println!("{}", user_id);
        }
        "import" => {
            let [path] = expect_args::<1>(rest, "import <file.csv>")?;
            run_import(&service, Path::new(path))?;
        }
        "timeline" => {
            let [number] = expect_args::<1>(rest, "timeline <card_number>")?;
            let timeline = service.timeline(number)?;
            println!("📈 {}: {} checkpoint(s)", CreditCard::mask_number(number), timeline.len());
            for checkpoint in timeline.checkpoints() {
                println!("   {}  {:>12}", checkpoint.date, checkpoint.balance);
            }
        }
        "balance" => {
            let [number, date] = expect_args::<2>(rest, "balance <card_number> <date>")?;
            let date = parse_date(date)?;
            match service.balance_at(number, date)? {
                Some(balance) => println!("{}", balance),
                None => println!("no balance recorded on or before {}", date),
            }
        }
        "daily" => {
            let [number, from, to] = expect_args::<3>(rest, "daily <card_number> <from> <to>")?;
            let days = service.daily_balances(number, parse_date(from)?, parse_date(to)?)?;
            for (date, balance) in days {
                println!("{}  {:>12}", date, balance);
            }
        }
        other => {
            eprintln!("❌ Unknown command: {}\n", other);
            print!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

fn run_import(service: &LedgerService<SqliteStore>, csv_path: &Path) -> Result<()> {
    println!("📥 Reconciling balances from {:?}", csv_path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let today = Local::now().date_naive();

    // 1. Load & validate
    let observations = load_csv(csv_path, today).context("Failed to load observations")?;
    println!("✓ Loaded {} observations", observations.len());

    // 2. Reconcile + persist (all cards or none)
    let reports = service.reconcile_batch_on(&observations, today)?;

    // 3. Report
    for report in &reports {
        let last = report.timeline.last().map(|c| c.balance).unwrap_or(Amount::ZERO);
        println!(
            "✓ {}: {} observation(s), {} shift(s), balance today {}",
            CreditCard::mask_number(&report.account_ref),
            report.adjustments.len(),
            report.shifted_count(),
            last
        );
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ {} card(s) reconciled", reports.len());

    Ok(())
}

fn expect_args<'a, const N: usize>(args: &'a [String], usage: &str) -> Result<[&'a str; N]> {
    if args.len() != N {
        bail!("usage: balance-ledger {}", usage);
    }
    let mut out = [""; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.as_str();
    }
    Ok(out)
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().with_context(|| format!("not a numeric id: {:?}", raw))
}
