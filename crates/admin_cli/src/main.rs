use std::io::Write;

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::Engine;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection, EntityTrait, Set};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

mod users {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub username: String,
        pub password: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

#[derive(Parser, Debug)]
#[command(name = "ledger_admin")]
#[command(about = "Admin utilities for the ledger (users, reserves, auto-debit)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./ledger.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Reserves(Reserves),
    AutoDebit(AutoDebit),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create a user, prompting for the password, and seed its defaults.
    Create(UsernameArgs),
    /// Seed default categories, accounts and settings. Safe to repeat.
    Bootstrap(UsernameArgs),
}

#[derive(Args, Debug)]
struct UsernameArgs {
    #[arg(long)]
    username: String,
}

#[derive(Args, Debug)]
struct Reserves {
    #[command(subcommand)]
    command: ReservesCommand,
}

#[derive(Subcommand, Debug)]
enum ReservesCommand {
    /// Rebuild the maintenance reserve timeline and print it.
    Recalc(UsernameArgs),
}

#[derive(Args, Debug)]
struct AutoDebit {
    #[command(subcommand)]
    command: AutoDebitCommand,
}

#[derive(Subcommand, Debug)]
enum AutoDebitCommand {
    /// Settle due auto-debit rows of one user, or of everyone.
    Run(AutoDebitRunArgs),
}

#[derive(Args, Debug)]
struct AutoDebitRunArgs {
    #[arg(long)]
    username: Option<String>,
}

/// Hidden terminal input on stderr; raw mode lasts as long as the value.
struct SecretPrompt {
    out: std::io::Stderr,
}

impl SecretPrompt {
    const ATTEMPTS: usize = 3;

    fn open() -> Result<Self, BoxError> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            out: std::io::stderr(),
        })
    }

    fn line(&mut self, text: &str) -> Result<(), BoxError> {
        execute!(
            self.out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print(text)
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn newline(&mut self) -> Result<(), BoxError> {
        execute!(self.out, Print("\r\n"))?;
        self.out.flush()?;
        Ok(())
    }

    /// Reads one secret, echoing `*` per character. Ctrl-C aborts.
    fn read(&mut self, label: &str) -> Result<String, BoxError> {
        self.line(label)?;
        let mut secret = String::new();
        loop {
            let Event::Key(KeyEvent {
                code, modifiers, ..
            }) = event::read()?
            else {
                continue;
            };
            let ctrl = modifiers.contains(KeyModifiers::CONTROL);
            match code {
                KeyCode::Enter => {
                    self.newline()?;
                    return Ok(secret);
                }
                KeyCode::Char('c') if ctrl => {
                    self.newline()?;
                    return Err("interrupted".into());
                }
                KeyCode::Backspace => {
                    if secret.pop().is_some() {
                        execute!(self.out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                        self.out.flush()?;
                    }
                }
                KeyCode::Char(ch) if !ctrl => {
                    secret.push(ch);
                    execute!(self.out, Print("*"))?;
                    self.out.flush()?;
                }
                _ => {}
            }
        }
    }

    /// Asks for a new password and its confirmation.
    fn new_password(&mut self) -> Result<String, BoxError> {
        for _ in 0..Self::ATTEMPTS {
            let password = self.read("Password: ")?;
            if password.is_empty() {
                self.line("Password must not be empty.\r\n")?;
            } else if self.read("Confirm password: ")? == password {
                return Ok(password);
            } else {
                self.line("Passwords do not match. Try again.\r\n")?;
            }
        }
        Err("too many attempts".into())
    }
}

impl Drop for SecretPrompt {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection, BoxError> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn build_engine(db: &DatabaseConnection) -> Result<Engine, BoxError> {
    Ok(Engine::builder().database(db.clone()).build().await?)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;

    match cli.command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            if users::Entity::find_by_id(args.username.clone())
                .one(&db)
                .await?
                .is_some()
            {
                eprintln!("user already exists: {}", args.username);
                std::process::exit(1);
            }

            let password = SecretPrompt::open()?.new_password()?;
            let user = users::ActiveModel {
                username: Set(args.username.clone()),
                password: Set(password),
            };
            users::Entity::insert(user).exec(&db).await?;

            build_engine(&db).await?.bootstrap_user(&args.username).await?;
            println!("created user: {}", args.username);
        }
        Command::User(User {
            command: UserCommand::Bootstrap(args),
        }) => {
            build_engine(&db).await?.bootstrap_user(&args.username).await?;
            println!("bootstrapped user: {}", args.username);
        }
        Command::Reserves(Reserves {
            command: ReservesCommand::Recalc(args),
        }) => {
            let timeline = build_engine(&db)
                .await?
                .recalculate_reserves(&args.username)
                .await?;
            for month in &timeline {
                println!(
                    "{}  deposits {}  usage {}  balance {}",
                    month.month, month.deposits, month.usage, month.balance
                );
            }
            println!("{} month(s) recalculated", timeline.len());
        }
        Command::AutoDebit(AutoDebit {
            command: AutoDebitCommand::Run(args),
        }) => {
            let engine = build_engine(&db).await?;
            let settled = match args.username {
                Some(username) => engine.run_auto_debit(&username).await?,
                None => engine.run_auto_debit_sweep().await?,
            };
            println!("settled {settled} auto-debit transaction(s)");
        }
    }

    Ok(())
}
