//! fieldscope - live field telemetry in the terminal
//!
//! This binary provides:
//! - Session commands: `login`, `logout`, `register`, `status`
//! - Field commands: `fields`, `select`
//! - `watch` (the default): a dashboard that seeds itself from a REST
//!   snapshot and then follows the gateway's websocket push channel
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/fieldscope/config.toml (~/.config/fieldscope/config.toml)
//! - Session: $XDG_STATE_HOME/fieldscope/session.json (~/.local/state/fieldscope/session.json)

mod app;
mod ui;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fieldscope_core::session::SessionStore;
use fieldscope_core::types::Field;
use fieldscope_core::{ApiClient, Config, Error};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::runtime::Runtime;

use crate::app::App;

#[derive(Parser)]
#[command(name = "fieldscope")]
#[command(about = "Live telemetry dashboard for instrumented fields")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in to the gateway and persist the session token
    Login {
        /// Account email (prompted for when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Account password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Clear the persisted session
    Logout,

    /// Create a gateway account
    Register {
        /// Display name (prompted for when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Account email (prompted for when omitted)
        #[arg(long)]
        email: Option<String>,

        /// Account password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Show session and gateway configuration
    Status,

    /// List the fields registered to your account
    Fields,

    /// Choose the field the dashboard follows
    Select {
        /// Field id, or field name (case-insensitive)
        field: String,
    },

    /// Watch live telemetry for the selected field (the default command)
    Watch {
        /// Watch this field and make it the new selection
        #[arg(long)]
        field: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Logs go to a file, not stdout: `watch` owns the terminal
    let _log_guard =
        fieldscope_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("fieldscope starting up");

    let runtime = Runtime::new().context("failed to start async runtime")?;

    let session = Arc::new(
        SessionStore::open(Config::session_path()).context("failed to open session store")?,
    );
    let client = Arc::new(
        ApiClient::new(&config.gateway, Arc::clone(&session))
            .context("failed to create gateway client")?,
    );

    match args.command.unwrap_or(Command::Watch { field: None }) {
        Command::Login { email, password } => cmd_login(&runtime, &client, email, password),
        Command::Logout => cmd_logout(&session),
        Command::Register {
            name,
            email,
            password,
        } => cmd_register(&runtime, &client, name, email, password),
        Command::Status => cmd_status(&config, &session),
        Command::Fields => cmd_fields(&runtime, &client),
        Command::Select { field } => cmd_select(&runtime, &client, &field),
        Command::Watch { field } => cmd_watch(runtime, config, client, field),
    }
}

/// Renders a gateway error for terminal output, appending per-field
/// validation messages when the gateway returned them.
fn gateway_error(error: Error) -> anyhow::Error {
    let mut message = error.user_message();
    if let Some(fields) = error.field_errors() {
        for (field, detail) in fields {
            message.push_str(&format!("\n  {}: {}", field, detail));
        }
    }
    anyhow::anyhow!(message)
}

/// Fails before any network call when no session token is persisted.
fn require_login(session: &SessionStore) -> Result<()> {
    if !session.is_logged_in() {
        bail!("Not logged in. Run 'fieldscope login' first.");
    }
    Ok(())
}

/// Reads one trimmed line from stdin after printing a label.
fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn cmd_login(
    runtime: &Runtime,
    client: &ApiClient,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    if email.is_empty() || password.is_empty() {
        bail!("email and password are required");
    }

    let profile = runtime
        .block_on(client.sign_in(&email, &password))
        .map_err(gateway_error)?;

    println!("Signed in as {} <{}>", profile.name, profile.email);
    println!("Session saved to {}", Config::session_path().display());

    Ok(())
}

fn cmd_logout(session: &SessionStore) -> Result<()> {
    if session.logout()? {
        println!("Logged out.");
    } else {
        println!("No active session.");
    }
    Ok(())
}

fn cmd_register(
    runtime: &Runtime,
    client: &ApiClient,
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => prompt("Name")?,
    };
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt("Password")?,
    };
    if name.is_empty() || email.is_empty() || password.is_empty() {
        bail!("name, email and password are required");
    }

    let message = runtime
        .block_on(client.register(&name, &email, &password))
        .map_err(gateway_error)?;

    println!("{}", message);
    println!("Run 'fieldscope login' to sign in.");

    Ok(())
}

fn cmd_status(config: &Config, session: &SessionStore) -> Result<()> {
    println!("fieldscope Status");
    println!("=================");
    println!();

    println!("Gateway:         {}", config.gateway.trimmed_base_url());
    println!(
        "Session:         {}",
        if session.is_logged_in() {
            "logged in"
        } else {
            "logged out"
        }
    );

    if let Some(user) = session.user() {
        println!("Account:         {} <{}>", user.name, user.email);
    }

    match session.selected_field() {
        Some(field) => println!("Selected field:  {} ({})", field.name, field.id),
        None => println!("Selected field:  <none>"),
    }

    println!("Session file:    {}", Config::session_path().display());
    println!("Log file:        {}", Config::log_path().display());

    if !session.is_logged_in() {
        println!();
        println!("Run 'fieldscope login' to sign in.");
    }

    Ok(())
}

fn cmd_fields(runtime: &Runtime, client: &ApiClient) -> Result<()> {
    require_login(client.session())?;

    let fields = runtime.block_on(client.fields()).map_err(gateway_error)?;
    if fields.is_empty() {
        println!("No fields registered.");
        return Ok(());
    }

    let selected = client.session().selected_field().map(|field| field.id);

    println!(
        "{:<2} {:<22} {:<16} {:<16} {:>8} {}",
        "", "Name", "City", "Cultivation", "Size", "Id"
    );
    println!("{:-<78}", "");

    for field in &fields {
        let marker = if selected.as_deref() == Some(field.id.as_str()) {
            "*"
        } else {
            ""
        };
        println!(
            "{:<2} {:<22} {:<16} {:<16} {:>8.2} {}",
            marker, field.name, field.city, field.cultivation_type, field.size, field.id
        );
    }

    println!();
    println!("{} field(s). '*' marks the watched field.", fields.len());

    Ok(())
}

fn cmd_select(runtime: &Runtime, client: &ApiClient, wanted: &str) -> Result<()> {
    require_login(client.session())?;

    let fields = runtime.block_on(client.fields()).map_err(gateway_error)?;
    let field = find_field(&fields, wanted)?;

    client.session().set_selected_field(Some(field.to_ref()))?;
    println!("Watching {} ({})", field.name, field.id);

    Ok(())
}

/// Matches a field by exact id first, then by case-insensitive name.
fn find_field<'a>(fields: &'a [Field], wanted: &str) -> Result<&'a Field> {
    if let Some(field) = fields.iter().find(|field| field.id == wanted) {
        return Ok(field);
    }
    if let Some(field) = fields
        .iter()
        .find(|field| field.name.eq_ignore_ascii_case(wanted))
    {
        return Ok(field);
    }

    let known = fields
        .iter()
        .map(|field| field.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    bail!("no field matches '{}' (known fields: {})", wanted, known);
}

fn cmd_watch(
    runtime: Runtime,
    config: Config,
    client: Arc<ApiClient>,
    wanted: Option<String>,
) -> Result<()> {
    let session = Arc::clone(client.session());
    require_login(&session)?;

    let fields = runtime.block_on(client.fields()).map_err(gateway_error)?;
    if fields.is_empty() {
        bail!("No fields registered. Create one from the web console first.");
    }

    // Resolve what to watch: explicit argument, persisted selection, or
    // the only field when there is just one.
    let field = match wanted {
        Some(wanted) => find_field(&fields, &wanted)?.clone(),
        None => match session.selected_field() {
            Some(selected) => match fields.iter().find(|field| field.id == selected.id) {
                Some(field) => field.clone(),
                None => bail!(
                    "selected field '{}' no longer exists; run 'fieldscope select <field>'",
                    selected.name
                ),
            },
            None if fields.len() == 1 => fields[0].clone(),
            None => bail!("No field selected. Run 'fieldscope select <field>' first."),
        },
    };
    session.set_selected_field(Some(field.to_ref()))?;

    tracing::info!(field = %field.id, "Opening dashboard");

    let mut app = App::new(
        config,
        runtime.handle().clone(),
        Arc::clone(&client),
        Arc::clone(&session),
        fields,
        field,
    );
    app.start();

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    // Close the push channel so the gateway sees a clean goodbye
    app.shutdown();

    tracing::info!("fieldscope dashboard shutting down");

    // A watch that ended because the gateway rejected the token should say
    // so once the terminal is usable again.
    if result.is_ok() && !session.is_logged_in() {
        bail!("Session expired or rejected by the gateway. Run 'fieldscope login' to sign in again.");
    }

    result
}

/// Run the dashboard loop.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        // Drain realtime events and finished background requests
        app.tick();

        // Render
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
