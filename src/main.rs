use clap::{Parser, Subcommand, Args};
use sprite_sync::DEFAULT_SERVER_ADDRESS;

/// # Global Arguments
#[derive(Debug, Parser)]
#[command(version, about = "Sprite tree synchronised over UDP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Run the authoritative server with the demo scene
    Server(ServerArgs),

    /// Run a headless client mirroring a server
    Client(ClientArgs),
}

#[derive(Debug, Args)]
struct ServerArgs {
    /// Settings JSON file
    #[arg(short = 's', long = "settings", value_name = "SETTINGS_FILE")]
    settings: Option<String>,

    /// Address the server binds
    #[arg(short = 'a', long = "address", value_name = "SERVER_ADDRESS")]
    address: Option<String>,

    /// Client to send frames to before it asks, may repeat
    #[arg(short = 'c', long = "client", value_name = "CLIENT_ADDRESS")]
    clients: Vec<String>,

    /// Number of wandering dots
    #[arg(short = 'd', long = "dots", value_name = "COUNT", default_value_t = 24)]
    dots: usize,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Settings JSON file
    #[arg(short = 's', long = "settings", value_name = "SETTINGS_FILE")]
    settings: Option<String>,

    /// Local address the client binds
    #[arg(short = 'a', long = "address", value_name = "CLIENT_ADDRESS")]
    address: Option<String>,

    /// Server address
    #[arg(long = "server", value_name = "SERVER_ADDRESS", default_value_t = String::from(DEFAULT_SERVER_ADDRESS))]
    server: String,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .format_file(false)
        .format_line_number(true)
        .init();

    let cli_args = Cli::parse();
    log::info!("Got args: '{:?}'.", cli_args);

    let result = match cli_args.mode {
        Mode::Server(server_args) => cli_server::run(server_args),
        Mode::Client(client_args) => cli_client::run(client_args),
    };

    if let Err(e) = result {
        log::error!("Stopped with error, reason='{e}'");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn load_settings(path: Option<&str>) -> Result<sprite_sync::settings::EngineSettings, sprite_sync::app::EngineError> {
    match path {
        Some(path) => Ok(sprite_sync::settings::EngineSettings::load(path)?),
        None => Ok(sprite_sync::settings::EngineSettings::default()),
    }
}

/// Resolves on the first ctrl-C.
fn ctrlc_receiver() -> tokio::sync::oneshot::Receiver<()> {
    let (ctrlc_sender, ctrlc_receiver) = tokio::sync::oneshot::channel();
    let mut ctrlc_sender = Some(ctrlc_sender);

    let installed = ctrlc::set_handler(move || {
        log::info!("Captured ctrl-C, shutting down...");
        if let Some(sndr) = ctrlc_sender.take() {
            let _ = sndr.send(());
        }
    });
    if let Err(e) = installed {
        log::error!("Error setting Ctrl-C handler, reason='{e}'");
    }
    ctrlc_receiver
}

mod cli_server {
    use sprite_sync::app::{
        demo::build_demo_scene,
        engine::Engine,
        roots::RootList,
        server::EngineServer,
        EngineError,
        EngineRole
    };
    use sprite_sync::net::udp::resolve;

    pub fn run(args: super::ServerArgs) -> Result<(), EngineError> {
        let mut settings = super::load_settings(args.settings.as_deref())?;
        if let Some(address) = args.address {
            settings.server_address = address;
        }
        settings.client_addresses.extend(args.clients);

        let rt = tokio::runtime::Runtime::new().map_err(sprite_sync::net::NetworkError::from)?;
        rt.block_on(async move {
            let roots = RootList::new().ortho().persp();
            let mut engine = Engine::new(EngineRole::Server, settings.clone(), &roots)?;
            build_demo_scene(&mut engine, args.dots)?;

            let mut server = EngineServer::bind(engine, settings.server_address.as_str()).await?;
            log::info!("Sprite server, address:{:?}", server.get_local_address()?);
            println!("Serving on {}", server.get_local_address()?);

            for client in settings.client_addresses.iter() {
                match resolve(client).await {
                    Ok(address) => {
                        server.add_client(address);
                    },
                    Err(e) => log::warn!("Skipping client '{client}', reason='{e}'"),
                }
            }

            let server = server.run(super::ctrlc_receiver(), |_| {}).await;
            println!("Server stopped after {} frames", server.frame());
            Ok::<(), EngineError>(())
        })
    }
}

mod cli_client {
    use std::time::{
        Duration,
        Instant
    };

    use sprite_sync::{
        app::{
            client::EngineClient,
            engine::Engine,
            roots::RootList,
            EngineError,
            EngineRole
        },
        net::udp::resolve,
        ui::draw::DrawList
    };

    const STATUS_INTERVAL: Duration = Duration::from_secs(1);

    pub fn run(args: super::ClientArgs) -> Result<(), EngineError> {
        let settings = super::load_settings(args.settings.as_deref())?;

        let rt = tokio::runtime::Runtime::new().map_err(sprite_sync::net::NetworkError::from)?;
        rt.block_on(async move {
            let server = resolve(&args.server).await?;
            let roots = RootList::new().ortho().persp();
            let engine = Engine::new(EngineRole::Client, settings, &roots)?;
            let client = match args.address {
                Some(local) => EngineClient::connect_from(engine, local, server).await?,
                None => EngineClient::connect(engine, server).await?,
            };

            let mut draw_list = DrawList::default();
            let mut last_status = Instant::now();
            let client = client.run(super::ctrlc_receiver(), move |client| {
                draw_list.clear();
                client.draw(&mut draw_list);
                if last_status.elapsed() >= STATUS_INTERVAL {
                    last_status = Instant::now();
                    println!("{} draws={}", client.stats(), draw_list.len());
                }
            }).await;

            log::info!("Client stopped, {}", client.stats());
            Ok::<(), EngineError>(())
        })
    }
}
