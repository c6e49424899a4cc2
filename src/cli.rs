use clap::{Args, Parser, Subcommand};
use huellas::config::{AppConfig, AuthConfig, BackendConfig, DEFAULT_PUSH_TIMEOUT};
use huellas::shell::ShellConfig;
use reqwest::Url;
use std::net::SocketAddr;
use std::time::Duration;

#[allow(clippy::large_enum_variant)]
pub(crate) enum RunOutcome {
    Serve(AppConfig),
    Listen {
        config: AppConfig,
        user_id: String,
        visible: bool,
    },
    Precache(ShellConfig),
    Exit(i32),
}

pub(crate) fn run() -> RunOutcome {
    let mut cli = Cli::parse();
    let command = cli.command.take();
    let listen = match command {
        Some(Command::Init(args)) => return RunOutcome::Exit(run_init(args)),
        Some(Command::Precache(args)) => {
            return match resolve_shell_config(&args) {
                Ok(config) => RunOutcome::Precache(config),
                Err(err) => {
                    eprintln!("error: {err}");
                    RunOutcome::Exit(2)
                }
            };
        }
        Some(Command::Listen(args)) => Some(args),
        None => None,
    };

    let config = match resolve_app_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return RunOutcome::Exit(2);
        }
    };

    match listen {
        Some(args) => {
            if config.backend.is_none() {
                eprintln!("error: listen requires --database-url and --service-key");
                return RunOutcome::Exit(2);
            }
            let user_id = args.user_id.trim().to_string();
            if user_id.is_empty() {
                eprintln!("error: --user-id cannot be empty");
                return RunOutcome::Exit(2);
            }
            RunOutcome::Listen {
                config,
                user_id,
                visible: args.visible,
            }
        }
        None => RunOutcome::Serve(config),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "huellas",
    version,
    about = "Notification service for the Huellas Digitales adoption platform"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "HUELLAS_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "HUELLAS_APP_NAME", default_value = "Huellas Digitales")]
    app_name: String,
    #[arg(long, env = "HUELLAS_VAPID_PRIVATE_KEY")]
    vapid_private_key: Option<String>,
    #[arg(long, env = "HUELLAS_VAPID_PUBLIC_KEY")]
    vapid_public_key: Option<String>,
    #[arg(long, env = "HUELLAS_VAPID_SUBJECT")]
    vapid_subject: Option<String>,
    #[arg(long, env = "HUELLAS_DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "HUELLAS_SERVICE_KEY")]
    service_key: Option<String>,
    #[arg(long, env = "HUELLAS_AUTH_SECRET")]
    auth_secret: Option<String>,
    #[arg(long, env = "HUELLAS_PUSH_TIMEOUT")]
    push_timeout: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a fresh VAPID key pair.
    Init(InitArgs),
    /// Follow new chat messages for one user and log them.
    Listen(ListenArgs),
    /// Install the offline shell against a deployment and report the result.
    Precache(PrecacheArgs),
}

#[derive(Args, Debug)]
struct InitArgs {
    #[arg(long)]
    subject: Option<String>,
}

#[derive(Args, Debug)]
struct ListenArgs {
    #[arg(long)]
    user_id: String,
    /// Treat the app as being in the foreground.
    #[arg(long)]
    visible: bool,
}

#[derive(Args, Debug)]
struct PrecacheArgs {
    #[arg(long)]
    origin: String,
    #[arg(long, default_value = "v1")]
    shell_version: String,
    /// Host of the backend API, never cached.
    #[arg(long, default_value = "supabase.co")]
    api_host: String,
}

fn run_init(args: InitArgs) -> i32 {
    let credentials = match huellas::generate_vapid_credentials() {
        Ok(credentials) => credentials,
        Err(err) => {
            eprintln!("failed to generate VAPID credentials: {err}");
            return 1;
        }
    };
    let (subject, show_subject_note) = match args.subject {
        Some(subject) => (subject, false),
        None => ("mailto:admin@huellasdigitales.com".to_string(), true),
    };

    println!("VAPID credentials generated.");
    println!();
    println!("HUELLAS_VAPID_PRIVATE_KEY=\"{}\"", credentials.private_key);
    println!("HUELLAS_VAPID_PUBLIC_KEY=\"{}\"", credentials.public_key);
    println!("HUELLAS_VAPID_SUBJECT=\"{subject}\"");
    if show_subject_note {
        println!();
        println!("Note: replace HUELLAS_VAPID_SUBJECT with a contact URI you control.");
    }
    0
}

fn resolve_app_config(cli: &Cli) -> Result<AppConfig, String> {
    let push_timeout = match cli.push_timeout.as_deref() {
        Some(raw) => parse_push_timeout(raw)?,
        None => DEFAULT_PUSH_TIMEOUT,
    };
    let app_name = cli.app_name.trim();
    if app_name.is_empty() {
        return Err("app name cannot be empty".to_string());
    }

    Ok(AppConfig {
        bind: cli.bind,
        app_name: app_name.to_string(),
        vapid_private_key: cli.vapid_private_key.clone(),
        vapid_public_key: cli.vapid_public_key.clone(),
        vapid_subject: cli.vapid_subject.clone(),
        backend: resolve_backend_config(cli)?,
        auth: resolve_auth_config(cli)?,
        push_timeout,
    })
}

fn resolve_backend_config(cli: &Cli) -> Result<Option<BackendConfig>, String> {
    let database_url = cli.database_url.as_deref().map(str::trim);
    let service_key = cli.service_key.as_deref().map(str::trim);
    match (database_url, service_key) {
        (None, None) => Ok(None),
        (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
            Ok(Some(BackendConfig {
                database_url: url.to_string(),
                service_key: key.to_string(),
            }))
        }
        (Some(_), Some(_)) => Err("database url and service key cannot be empty".to_string()),
        (Some(_), None) => Err("database is configured but --service-key is missing".to_string()),
        (None, Some(_)) => Err("service key is set but --database-url is missing".to_string()),
    }
}

fn resolve_auth_config(cli: &Cli) -> Result<Option<AuthConfig>, String> {
    let Some(secret) = cli.auth_secret.as_deref() else {
        return Ok(None);
    };
    let secret = secret.trim();
    if secret.is_empty() {
        return Err("auth secret cannot be empty".to_string());
    }
    Ok(Some(AuthConfig {
        secret: secret.to_string(),
    }))
}

fn resolve_shell_config(args: &PrecacheArgs) -> Result<ShellConfig, String> {
    let origin = Url::parse(args.origin.trim())
        .map_err(|err| format!("invalid origin '{}': {err}", args.origin))?;
    if !matches!(origin.scheme(), "http" | "https") {
        return Err(format!("origin must be http or https, got '{}'", origin.scheme()));
    }
    let version = args.shell_version.trim();
    if version.is_empty() {
        return Err("shell version cannot be empty".to_string());
    }
    Ok(ShellConfig::new(version, origin, args.api_host.trim()))
}

fn parse_push_timeout(raw: &str) -> Result<Duration, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("push timeout cannot be empty".to_string());
    }

    let (amount, unit) = match value.chars().last() {
        Some(ch) if ch.is_ascii_alphabetic() => {
            (&value[..value.len() - 1], ch.to_ascii_lowercase())
        }
        _ => (value, 's'),
    };

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid push timeout '{value}'; expected <number>[s|m|h]"))?;

    if amount == 0 {
        return Err("push timeout must be greater than 0".to_string());
    }

    match unit {
        's' => Ok(Duration::from_secs(amount)),
        'm' => Ok(Duration::from_secs(amount * 60)),
        'h' => Ok(Duration::from_secs(amount * 60 * 60)),
        _ => Err(format!(
            "invalid push timeout '{value}'; expected <number>[s|m|h]"
        )),
    }
}
