use async_trait::async_trait;
use clap::{Parser, Subcommand};
use ocvpn::diagnostics::{self, StaleGatewayPolicy};
use ocvpn::events::{LogEvent, LogKind};
use ocvpn::openconnect::{check_binary_presence, ExpectBridge, Protocol};
use ocvpn::profiles::{KeychainPasswords, Profile, ProfileStore};
use ocvpn::{
    Classification, Config, ConnectionConfig, ConnectionState, ConnectionSupervisor,
    CredentialPrompt, PrivilegedCommandResult, PrivilegedRunner, SupervisorEvent,
};
use secrecy::SecretString;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "ocvpn")]
#[command(about = "OpenConnect session supervisor and network diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.config/ocvpn/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stay in the foreground until Ctrl-C or the tunnel exits
    Connect {
        /// Saved profile to use
        #[arg(short, long, conflicts_with = "server")]
        profile: Option<String>,
        /// VPN server host or URL
        #[arg(short, long, required_unless_present = "profile")]
        server: Option<String>,
        /// Username for VPN authentication
        #[arg(short, long, required_unless_present = "profile")]
        user: Option<String>,
        /// anyconnect, nc, gp, pulse, f5, fortinet or array
        #[arg(long, default_value = "anyconnect")]
        protocol: Protocol,
        #[arg(long)]
        authgroup: Option<String>,
        /// Server certificate pin (pin-sha256:...)
        #[arg(long)]
        servercert: Option<String>,
    },
    /// Show which external tools are installed
    Check,
    /// Terminate a process (needs the administrator password)
    Kill { pid: String },
    /// Delete a route (needs the administrator password)
    DeleteRoute { destination: String },
    /// List IPv4 routes
    Routes {
        /// Only show routes whose gateway looks stale
        #[arg(long)]
        problems: bool,
    },
    /// List network interfaces
    Interfaces,
    /// Test TCP reachability of host:port
    Probe { host: String, port: String },
    /// List running openconnect processes
    Processes,
    /// Manage saved connection profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Generate default config file
    Init,
}

#[derive(Subcommand)]
enum ProfileAction {
    List,
    Add {
        name: String,
        #[arg(short, long)]
        server: String,
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "anyconnect")]
        protocol: Protocol,
        #[arg(long)]
        authgroup: Option<String>,
        #[arg(long)]
        servercert: Option<String>,
        /// Prompt for the VPN password and keep it in the OS keychain
        #[arg(long)]
        save_password: bool,
    },
    Remove { name: String },
}

/// Asks for the sudo password on the controlling terminal
struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn elevation_credential(&self) -> Option<SecretString> {
        tokio::task::spawn_blocking(|| read_secret("Administrator (sudo) password: "))
            .await
            .ok()
            .flatten()
    }
}

fn read_secret(prompt: &str) -> Option<SecretString> {
    match rpassword::prompt_password(prompt) {
        Ok(value) if !value.is_empty() => Some(SecretString::new(value)),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not read password: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for --json
    // RUST_LOG, when set, overrides --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)?;

    match cli.command {
        Commands::Connect {
            profile,
            server,
            user,
            protocol,
            authgroup,
            servercert,
        } => {
            let connection = match profile {
                Some(name) => {
                    let profile = ProfileStore::default_location()?.get(&name)?;
                    let saved = match KeychainPasswords::load(&profile.name) {
                        Ok(saved) => saved,
                        Err(e) => {
                            warn!("{}", e);
                            None
                        }
                    };
                    let password = match saved.or_else(|| profile.stored_password()) {
                        Some(p) => p,
                        None => read_secret("VPN password: ").ok_or("VPN password required")?,
                    };
                    profile.to_config(password)
                }
                None => {
                    let password = read_secret("VPN password: ").ok_or("VPN password required")?;
                    ConnectionConfig {
                        server: server.unwrap_or_default(),
                        username: user.unwrap_or_default(),
                        password,
                        protocol,
                        auth_group: authgroup,
                        server_cert: servercert,
                    }
                }
            };

            let failed = run_connect(&config, connection).await?;
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Check => {
            let locations = &config.locations;
            let report = vec![
                ("openconnect", locations.openconnect()),
                ("vpnc-script", check_binary_presence("vpnc-script", &locations.vpnc_script)),
                ("expect", locations.expect()),
                (
                    "vpn-connect.exp",
                    check_binary_presence("vpn-connect.exp", &config.driver_script_candidates()),
                ),
            ];
            if cli.json {
                let map: std::collections::BTreeMap<_, _> = report.into_iter().collect();
                print_json(&map)?;
            } else {
                for (name, presence) in report {
                    match presence.path {
                        Some(path) => println!("{:<16} {}", name, path.display()),
                        None => println!("{:<16} not found", name),
                    }
                }
            }
        }
        Commands::Kill { pid } => {
            let runner = PrivilegedRunner::sudo(ocvpn::platform::current()?);
            let credential = read_secret("Administrator (sudo) password: ");
            let result = runner.kill_process(&pid, credential).await?;
            report_privileged(&result, cli.json, &format!("Process {} terminated", pid))?;
        }
        Commands::DeleteRoute { destination } => {
            let runner = PrivilegedRunner::sudo(ocvpn::platform::current()?);
            let credential = read_secret("Administrator (sudo) password: ");
            let result = runner.delete_route(&destination, credential).await?;
            report_privileged(&result, cli.json, &format!("Route {} deleted", destination))?;
        }
        Commands::Routes { problems } => {
            let platform = ocvpn::platform::current()?;
            let routes = diagnostics::list_routes(platform.as_ref()).await?;
            let shown: Vec<diagnostics::RouteRecord> = if problems {
                let interfaces = diagnostics::list_interfaces(platform.as_ref()).await?;
                diagnostics::problematic_routes(&StaleGatewayPolicy, &routes, &interfaces)
                    .into_iter()
                    .cloned()
                    .collect()
            } else {
                routes
            };

            if cli.json {
                print_json(&shown)?;
            } else {
                println!("{:<20} {:<20} {:<8} {}", "Destination", "Gateway", "Flags", "Interface");
                for r in &shown {
                    println!("{:<20} {:<20} {:<8} {}", r.destination, r.gateway, r.flags, r.interface);
                }
            }
        }
        Commands::Interfaces => {
            let platform = ocvpn::platform::current()?;
            let interfaces = diagnostics::list_interfaces(platform.as_ref()).await?;
            if cli.json {
                print_json(&interfaces)?;
            } else {
                for i in &interfaces {
                    println!(
                        "{:<12} {:<16} {}",
                        i.name,
                        i.ip.as_deref().unwrap_or("-"),
                        i.status.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Commands::Probe { host, port } => {
            let platform = ocvpn::platform::current()?;
            let result =
                diagnostics::test_connectivity(platform.as_ref(), &host, &port, config.probe_deadline())
                    .await?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!("{}", result.message);
            }
            if !result.reachable {
                std::process::exit(1);
            }
        }
        Commands::Processes => {
            let platform = ocvpn::platform::current()?;
            let processes = diagnostics::list_tunnel_processes(platform.as_ref()).await?;
            if cli.json {
                print_json(&processes)?;
            } else if processes.is_empty() {
                println!("No openconnect processes running");
            } else {
                for p in &processes {
                    println!("{:<8} {:<10} {}", p.pid, p.user, p.command);
                }
            }
        }
        Commands::Profiles { action } => {
            let store = ProfileStore::default_location()?;
            match action {
                ProfileAction::List => {
                    let profiles = store.load()?;
                    if cli.json {
                        // Never echo stored passwords
                        let redacted: Vec<Profile> = profiles
                            .into_iter()
                            .map(|p| Profile { password: None, ..p })
                            .collect();
                        print_json(&redacted)?;
                    } else {
                        for p in &profiles {
                            println!("{:<16} {} ({}, {})", p.name, p.server, p.username, p.protocol);
                        }
                    }
                }
                ProfileAction::Add {
                    name,
                    server,
                    user,
                    protocol,
                    authgroup,
                    servercert,
                    save_password,
                } => {
                    if save_password {
                        let password = read_secret("VPN password to store: ")
                            .ok_or("VPN password required")?;
                        KeychainPasswords::store(&name, &password)?;
                    }
                    let profile = Profile {
                        name: name.clone(),
                        server,
                        username: user,
                        password: None,
                        protocol,
                        auth_group: authgroup,
                        server_cert: servercert,
                    };
                    store.upsert(profile)?;
                    println!("Saved profile {}", name);
                }
                ProfileAction::Remove { name } => {
                    store.remove(&name)?;
                    KeychainPasswords::delete(&name)?;
                    println!("Removed profile {}", name);
                }
            }
        }
        Commands::Init => {
            info!("Generating default config...");
            let config = Config::default();
            config.save(&config_path)?;
            println!("Created default config: {}", config_path.display());
        }
    }

    Ok(())
}

/// Returns true when the session ended with a connection error
async fn run_connect(
    config: &Config,
    connection: ConnectionConfig,
) -> Result<bool, Box<dyn std::error::Error>> {
    let bridge = ExpectBridge::new(config.locations.expect.clone(), config.driver_script_candidates())
        .with_prompt_timeout(config.prompt_timeout());
    let supervisor = ConnectionSupervisor::new(
        Arc::new(bridge),
        Arc::new(TerminalPrompt),
        config.locations.clone(),
        config.supervisor_settings(),
    );

    let mut events = supervisor.subscribe();
    supervisor.connect(connection).await?;

    let mut failed = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SupervisorEvent::StatusChanged(ConnectionState::Disconnected)) => break,
                Ok(event) => failed |= print_event(&event),
                Err(RecvError::Lagged(n)) => warn!("Dropped {} log lines", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting...");
                if let Err(e) = supervisor.disconnect() {
                    warn!("{}", e);
                }
            }
        }
    }

    // The exit message follows the final status change
    let _ = tokio::time::timeout(Duration::from_millis(250), async {
        while let Ok(event) = events.recv().await {
            failed |= print_event(&event);
        }
    })
    .await;

    Ok(failed)
}

fn print_event(event: &SupervisorEvent) -> bool {
    match event {
        SupervisorEvent::Log(LogEvent { message, kind, .. }) => {
            match kind {
                LogKind::Error => eprintln!("{}", message),
                LogKind::Success => println!("✓ {}", message),
                LogKind::Info => println!("{}", message),
            }
            false
        }
        SupervisorEvent::StatusChanged(state) => {
            info!("Status: {}", state);
            false
        }
        SupervisorEvent::ConnectionError(_) => true,
    }
}

fn report_privileged(
    result: &PrivilegedCommandResult,
    json: bool,
    success: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        print_json(result)?;
    } else {
        match result.classification {
            Classification::Success => println!("{}", success),
            Classification::IncorrectCredential => eprintln!("Incorrect administrator password"),
            Classification::TargetNotFound => eprintln!("Target not found"),
            Classification::OtherFailure => eprintln!("Command failed: {}", result.raw_stderr.trim()),
        }
    }
    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
