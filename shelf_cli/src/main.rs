use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use shelf_core::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Library loan management system", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as if the current time were this RFC 3339 timestamp
    #[arg(long, global = true, value_parser = parse_timestamp)]
    at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how many copies of a title can be borrowed
    Available { title: String },

    /// Borrow a book
    Borrow { borrower: String, title: String },

    /// Return a borrowed book and settle the fine
    Return { borrower: String, title: String },

    /// Show the fine a return would charge now
    Quote { borrower: String, title: String },

    /// List loans for a borrower, or for everyone with "all"
    Loans {
        #[arg(default_value = "all")]
        borrower: String,

        /// Only loans that have not been returned
        #[arg(long)]
        open: bool,
    },

    /// List loans past their due date
    Overdue,

    /// List the catalog
    Books,

    /// Show the catalog entry for one title
    Show { title: String },

    /// Add a title, or add copies to an existing one
    AddBook {
        title: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, default_value_t = 1)]
        copies: u32,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        shelf: Option<String>,
    },

    /// Correct the available copy count of a title
    SetCopies { title: String, copies: u32 },

    /// Replace the catalog with the rows of a CSV file
    Import { file: PathBuf },

    /// Write the catalog to a CSV file
    ExportBooks { file: PathBuf },

    /// Write every loan record to a CSV file
    ExportLoans { file: PathBuf },

    /// Register a user account
    Register {
        name: String,
        email: String,
        password: String,
    },

    /// Check a user's credentials
    Login { email: String, password: String },

    /// List registered accounts
    Users,

    /// Create or reset the admin account
    InitAdmin {
        #[arg(long, default_value = "admin@library.local")]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Admin")]
        name: String,
    },

    /// Show admin dashboard figures
    Stats {
        /// Number of most-borrowed titles to show
        #[arg(long, default_value_t = 5)]
        top: usize,

        /// Number of recent loans to show
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },

    /// Show the most recent journal entries
    Journal {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Check the catalog and ledger for inconsistencies
    Check,
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn main() -> ExitCode {
    // Initialize logging
    shelf_core::logging::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_domain() => {
            eprintln!("✗ {}", e);
            ExitCode::from(1)
        }
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let now = cli.at.unwrap_or_else(Utc::now);

    let store = LibraryStore::open(&data_dir, config.fine_policy())?;
    let result = dispatch(&store, cli.command, now);
    store.close()?;
    result
}

fn dispatch(store: &LibraryStore, command: Commands, now: DateTime<Utc>) -> Result<()> {
    match command {
        Commands::Available { title } => {
            println!("{}", store.get_available(&title)?);
        }

        Commands::Borrow { borrower, title } => {
            let loan = store.borrow(&borrower, &title, now)?;
            println!("✓ Borrowed '{}'", loan.title);
            println!("  Borrowed on: {}", fmt_date(loan.borrowed_at));
            println!("  Due date:    {}", fmt_date(loan.due_at));
        }

        Commands::Return { borrower, title } => {
            let loan = store.return_loan(&borrower, &title, now)?;
            println!("✓ Returned '{}'", loan.title);
            println!("  Borrowed on: {}", fmt_date(loan.borrowed_at));
            println!("  Returned on: {}", fmt_date(now));
            println!("  Fine: {}", loan.fine);
        }

        Commands::Quote { borrower, title } => {
            let policy = store.policy();
            let fine = store.quote_fine(&borrower, &title, now)?;
            println!("Grace period: {} days", policy.grace_days);
            println!("Fine if returned now: {}", fine);
        }

        Commands::Loans { borrower, open } => {
            let loans = match (BorrowerFilter::parse(&borrower), open) {
                (BorrowerFilter::Borrower(name), true) => store.list_open_loans(&name)?,
                (filter, open) => {
                    let mut loans = store.list_loans(&filter)?;
                    if open {
                        loans.retain(|l| l.is_open());
                    }
                    loans
                }
            };
            print_loans(&loans);
        }

        Commands::Overdue => {
            let overdue = store.list_overdue(now)?;
            if overdue.is_empty() {
                println!("No overdue loans.");
            }
            for item in overdue {
                println!(
                    "{:<20} {:<30} due {}  {} days late  fine {}",
                    item.loan.borrower,
                    item.loan.title,
                    fmt_date(item.loan.due_at),
                    item.days_late,
                    item.accrued_fine
                );
            }
        }

        Commands::Books => {
            let books = store.list_books()?;
            if books.is_empty() {
                println!("The catalog is empty.");
            }
            for book in books {
                println!(
                    "{:<40} {:<25} {:>3} available",
                    book.title,
                    book.author.as_deref().unwrap_or("-"),
                    book.available
                );
            }
        }

        Commands::Show { title } => {
            let book = store
                .find_book(&title)?
                .ok_or_else(|| Error::UnknownTitle(title.clone()))?;
            println!("{}", book.title);
            println!("  Available: {}", book.available);
            let details = [
                ("Author", book.author),
                ("Genre", book.genre),
                ("ISBN", book.isbn),
                ("Publisher", book.publisher),
                ("Year", book.year.map(|y| y.to_string())),
                ("Price", book.price.map(|p| format!("{:.2}", p))),
                ("Shelf", book.shelf),
            ];
            for (label, value) in details {
                if let Some(value) = value {
                    println!("  {}: {}", label, value);
                }
            }
        }

        Commands::AddBook {
            title,
            author,
            price,
            copies,
            genre,
            isbn,
            publisher,
            year,
            shelf,
        } => {
            let book = store.add_book(NewBook {
                title,
                author,
                price,
                copies,
                genre,
                isbn,
                publisher,
                year,
                shelf,
            })?;
            println!("✓ '{}' now has {} copies available", book.title, book.available);
        }

        Commands::SetCopies { title, copies } => {
            store.set_available(&title, copies)?;
            println!("✓ '{}' now has {} copies available", title, copies);
        }

        Commands::Import { file } => {
            let count = store.import_books_csv(&file)?;
            println!("✓ Imported {} titles from {}", count, file.display());
        }

        Commands::ExportBooks { file } => {
            let count = store.export_books_csv(&file)?;
            println!("✓ Exported {} books to {}", count, file.display());
        }

        Commands::ExportLoans { file } => {
            let count = store.export_loans_csv(&file)?;
            println!("✓ Exported {} loans to {}", count, file.display());
        }

        Commands::Register {
            name,
            email,
            password,
        } => {
            let account = store.register_user(&name, &email, &password, now)?;
            println!("✓ Registered {} <{}>", account.name, account.email);
        }

        Commands::Login { email, password } => match store.verify_credentials(&email, &password)? {
            Some(account) => {
                println!("✓ Welcome, {} ({:?})", account.name, account.role);
            }
            None => {
                return Err(Error::Account("invalid email or password".into()));
            }
        },

        Commands::Users => {
            let users = store.list_users()?;
            if users.is_empty() {
                println!("No accounts registered.");
            }
            for user in users {
                println!(
                    "#{:<4} {:<25} {:<30} {:?}  since {}",
                    user.id,
                    user.name,
                    user.email,
                    user.role,
                    fmt_date(user.registered_at)
                );
            }
        }

        Commands::InitAdmin {
            email,
            password,
            name,
        } => {
            let account = store.ensure_admin(&email, &password, &name, now)?;
            println!("✓ Admin account ready: {}", account.email);
        }

        Commands::Stats { top, recent } => {
            let stats = store.stats()?;
            println!("Users:          {}", stats.total_users);
            println!("Books:          {}", stats.total_books);
            println!("Borrowed now:   {}", stats.borrowed_books);
            println!("Fines charged:  {}", stats.total_fines);

            let top_titles = store.top_borrowed(top)?;
            if !top_titles.is_empty() {
                println!();
                println!("Most borrowed:");
                for (title, count) in top_titles {
                    println!("  {:>4}  {}", count, title);
                }
            }

            let activity = store.recent_activity(recent)?;
            if !activity.is_empty() {
                println!();
                println!("Recent activity:");
                print_loans(&activity);
            }
        }

        Commands::Journal { limit } => {
            let events = store.journal_events()?;
            let skip = events.len().saturating_sub(limit);
            for event in events.into_iter().skip(skip) {
                println!(
                    "{}  {:<8}  {}  '{}'",
                    event.recorded_at.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", event.kind),
                    event.loan.borrower,
                    event.loan.title
                );
            }
        }

        Commands::Check => {
            let errors = store.validate()?;
            if errors.is_empty() {
                println!("✓ No problems found");
            } else {
                for error in &errors {
                    println!("  - {}", error);
                }
                return Err(Error::Validation(format!("{} problems found", errors.len())));
            }
        }
    }

    Ok(())
}

fn fmt_date(dt: DateTime<Utc>) -> String {
    dt.format("%d-%b-%Y").to_string()
}

fn print_loans(loans: &[LoanRecord]) {
    if loans.is_empty() {
        println!("No loans found.");
        return;
    }

    for loan in loans {
        let returned = loan
            .returned_at
            .map(fmt_date)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "#{:<4} {:<20} {:<30} borrowed {}  due {}  returned {:<11}  fine {}",
            loan.id,
            loan.borrower,
            loan.title,
            fmt_date(loan.borrowed_at),
            fmt_date(loan.due_at),
            returned,
            loan.fine
        );
    }
}
