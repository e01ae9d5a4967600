// Command-line front end for the bmcmux client
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::io::stderr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

use bmcmux_bmc::{
    BmcResetType, BmcTarget, BootDevice, BootOptions, PowerAction, RpcConfig, WolConfig,
};
use bmcmux_client::{CallContext, Client, ClientConfig, FirmwareJob, Metadata};

/// How long closing sessions may take once the command is done
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-protocol BMC management", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows driver attempts and protocol detail
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// BMC address
    #[arg(long, env = "BMCMUX_HOST")]
    host: String,

    /// BMC user
    #[arg(long, env = "BMCMUX_USER")]
    user: String,

    /// BMC password
    #[arg(long, env = "BMCMUX_PASSWORD", hide_env_values = true)]
    password: String,

    /// Only use the named driver
    #[arg(long)]
    driver: Option<String>,

    /// Only use drivers speaking this protocol
    #[arg(long)]
    protocol: Option<String>,

    /// Try the named driver first
    #[arg(long)]
    prefer: Option<String>,

    /// Overall deadline for the command, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Fixed timeout per driver attempt, in seconds
    #[arg(long)]
    provider_timeout: Option<u64>,

    /// Accept self-signed Redfish certificates
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Redfish HTTPS port
    #[arg(long)]
    redfish_port: Option<u16>,

    /// RPC consumer endpoint
    #[arg(long, requires = "rpc_secret")]
    rpc_url: Option<String>,

    /// Shared secret for signing RPC requests
    #[arg(long, env = "BMCMUX_RPC_SECRET", hide_env_values = true)]
    rpc_secret: Option<String>,

    /// Host MAC address for Wake-on-LAN
    #[arg(long)]
    mac: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Query or change host power
    Power {
        #[arg(value_enum)]
        action: PowerCommand,
    },
    /// Set the next boot device
    Bootdev {
        /// pxe, disk, cdrom, bios or none
        device: BootDevice,
        /// Keep the override for every boot
        #[arg(long, default_value_t = false)]
        persistent: bool,
        /// Boot in UEFI mode
        #[arg(long, default_value_t = false)]
        efi: bool,
    },
    /// Reset the BMC itself
    BmcReset {
        /// Full power reset instead of a graceful restart
        #[arg(long, default_value_t = false)]
        cold: bool,
    },
    /// List BMC user accounts
    Users,
    /// Install a firmware image
    Firmware {
        /// Component to update, e.g. bmc or bios
        component: String,
        /// Image file
        file: PathBuf,
        /// Version the image carries
        #[arg(long, default_value = "")]
        version: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerCommand {
    Status,
    On,
    Off,
    Cycle,
    Reset,
    Soft,
}

impl PowerCommand {
    fn action(self) -> Option<PowerAction> {
        match self {
            PowerCommand::Status => None,
            PowerCommand::On => Some(PowerAction::On),
            PowerCommand::Off => Some(PowerAction::Off),
            PowerCommand::Cycle => Some(PowerAction::Cycle),
            PowerCommand::Reset => Some(PowerAction::Reset),
            PowerCommand::Soft => Some(PowerAction::Soft),
        }
    }
}

impl Cli {
    fn target(&self) -> Result<BmcTarget> {
        let mut target = BmcTarget::new(&self.host, &self.user, &self.password);
        target.options.redfish = target.options.redfish.clone().with_insecure(self.insecure);
        if let Some(port) = self.redfish_port {
            target.options.redfish = target.options.redfish.clone().with_port(port);
        }
        if let (Some(url), Some(secret)) = (&self.rpc_url, &self.rpc_secret) {
            target.options.rpc = Some(RpcConfig::new(url, secret));
        }
        if let Some(mac) = &self.mac {
            let wol = WolConfig::from_mac_string(mac)
                .ok_or_else(|| eyre!("invalid MAC address: {}", mac))?;
            target.options.wol = Some(wol);
        }
        Ok(target)
    }

    fn config(&self) -> ClientConfig {
        match self.provider_timeout {
            Some(secs) => ClientConfig::default().with_per_provider_timeout(Duration::from_secs(secs)),
            None => ClientConfig::default(),
        }
    }

    /// Narrow and order the client's drivers as the flags ask
    fn view(&self, client: Client) -> Client {
        let mut client = client;
        if let Some(name) = &self.driver {
            client = client.for_driver(name);
        }
        if let Some(protocol) = &self.protocol {
            client = client.using(protocol);
        }
        if let Some(name) = &self.prefer {
            client = client.prefer_driver(name);
        }
        client
    }
}

async fn run_command(client: &Client, ctx: &CallContext, command: &Commands) -> Result<String> {
    let output = match command {
        Commands::Power { action } => match action.action() {
            None => format!("Power: {}", client.power_state(ctx).await?),
            Some(action) => {
                client.power_set(ctx, action).await?;
                format!("Power {}: ok", action)
            }
        },
        Commands::Bootdev {
            device,
            persistent,
            efi,
        } => {
            let options = BootOptions::once().persistent(*persistent).efi(*efi);
            client.boot_device_set(ctx, *device, options).await?;
            format!("Boot device {}: ok", device)
        }
        Commands::BmcReset { cold } => {
            let reset_type = if *cold {
                BmcResetType::Cold
            } else {
                BmcResetType::Warm
            };
            client.bmc_reset(ctx, reset_type).await?;
            format!("BMC {} reset: ok", reset_type)
        }
        Commands::Users => {
            let users = client.users(ctx).await?;
            let mut lines = vec![format!("{:<4} {:<16} {:<14} {}", "ID", "NAME", "ROLE", "ENABLED")];
            for user in users {
                let role = user.role.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
                lines.push(format!("{:<4} {:<16} {:<14} {}", user.id, user.name, role, user.enabled));
            }
            lines.join("\n")
        }
        Commands::Firmware {
            component,
            file,
            version,
        } => {
            let image = tokio::fs::read(file)
                .await
                .wrap_err_with(|| format!("failed to read {}", file.display()))?;
            info!(component = %component, bytes = image.len(), "Installing firmware");
            let job = FirmwareJob::new(component.clone(), image).with_install_version(version.clone());
            let report = client.install_firmware(ctx, &job).await?;
            serde_json::to_string_pretty(&report)?
        }
    };
    Ok(output)
}

/// Context for closing sessions; the command's own context may already be done
fn close_context() -> CallContext {
    CallContext::with_timeout(CLOSE_TIMEOUT)
}

fn print_metadata(metadata: &Metadata) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(metadata)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/warn for our crates
    let level = if cli.verbose { "debug" } else { "warn" };
    let default_directives = format!(
        "bmcmux={level},bmcmux_client={level},bmcmux_bmc={level},bmcmux_registry={level},reqwest=warn,hyper=warn,rustls=warn,h2=warn",
        level = level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    let target = cli.target()?;
    let (client, skipped) = Client::from_target(&target, cli.config());
    for e in &skipped {
        debug!(driver = %e.driver(), error = %e, "Driver unavailable for this target");
    }
    let mut client = cli.view(client);

    let ctx = match cli.timeout {
        Some(secs) => CallContext::with_timeout(Duration::from_secs(secs)),
        None => CallContext::background(),
    };

    // Ctrl+C cancels whatever call is in flight
    let token = ctx.token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling");
            token.cancel();
        }
    });

    if let Err(e) = client.open(&ctx).await {
        print_metadata(&client.metadata())?;
        return Err(e).wrap_err("no driver could open a session");
    }

    let outcome = run_command(&client, &ctx, &cli.command).await;
    let metadata = client.metadata();

    if let Err(e) = client.close(&close_context()).await {
        warn!(error = %e, "Closing sessions failed");
    }

    match outcome {
        Ok(output) => {
            println!("{}", output);
            print_metadata(&metadata)?;
            Ok(())
        }
        Err(e) => {
            print_metadata(&metadata)?;
            Err(e)
        }
    }
}
