use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use tourviz::channel::{NotificationChannel, WsConnector};
use tourviz::command::{self, Command};
use tourviz::config::{Config, DeliveryMode};
use tourviz::controller::{Controller, Event, catalog_listing};
use tourviz::gateway::{HttpGateway, Route};
use tourviz::palette::Palette;
use tourviz::runtime::{FileSink, Runtime};
use tourviz::session::Phase;

/// Generate cities, solve them with a remote heuristic and render the tour
#[derive(Parser, Debug)]
#[command(name = "tourviz")]
#[command(version)]
#[command(about = "Heuristic TSP visualizer client", long_about = None)]
struct Cli {
    /// Config file (TOML or YAML)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Builtin palette name or palette file (TOML or YAML)
    #[arg(short, long, global = true, value_name = "PALETTE")]
    palette: Option<String>,

    /// How solution requests are delivered
    #[arg(long, global = true, value_enum)]
    delivery: Option<DeliveryMode>,

    /// Canvas width in pixels
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Raster scale multiplier for PNG output
    #[arg(long, global = true, default_value_t = 1.0)]
    png_scale: f32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate, solve and render in one go
    Solve(SolveArgs),
    /// Interactive session reading commands from stdin
    Shell(ShellArgs),
    /// List algorithms and their parameters
    Algorithms,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct SolveArgs {
    /// Number of cities to generate
    #[arg(short = 'n', long, value_name = "N")]
    cities: String,

    /// Algorithm id or label (ls, ts, sa, aco, pso)
    #[arg(short, long, default_value = "ls")]
    algorithm: String,

    /// Algorithm parameter as key=value; repeat for each parameter
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Output file path (extension determines format: .svg, .png or .pdf)
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Seconds to wait for each network step
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

#[derive(Args, Debug)]
struct ShellArgs {
    /// File re-rendered after every change (extension determines format)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
}

/// Everything a running client owns. The channel is torn down on drop.
struct Client {
    runtime: Runtime,
    channel: Option<NotificationChannel>,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tourviz=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Algorithms => {
            println!("{}", catalog_listing());
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "tourviz", &mut std::io::stdout());
            Ok(())
        }
        Commands::Solve(args) => {
            let (config, palette) = load_settings(&cli)?;
            solve(&config, palette, cli.png_scale, args)
        }
        Commands::Shell(args) => {
            let (config, palette) = load_settings(&cli)?;
            shell(&config, palette, cli.png_scale, args)
        }
    }
}

fn load_settings(cli: &Cli) -> Result<(Config, Palette), String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };

    if let Some(delivery) = cli.delivery {
        config.delivery = delivery;
    }
    if let Some(width) = cli.width {
        config.canvas.width = width;
    }
    if let Some(height) = cli.height {
        config.canvas.height = height;
    }
    if cli.palette.is_some() {
        config.palette = cli.palette.clone();
    }

    let palette = match config.palette.as_deref() {
        Some(spec) => Palette::resolve(spec).map_err(|e| e.to_string())?,
        None => Palette::default(),
    };
    Ok((config, palette))
}

fn start_client(config: &Config, palette: &Palette, png_scale: f32) -> Result<Client, String> {
    let controller = Controller::new(config.canvas.size(), config.max_cities)
        .with_radius(palette.city_radius);

    let (route, channel, notifications) = match config.delivery {
        DeliveryMode::Direct => (
            Route::Direct {
                url: config.server.solution_url(),
            },
            None,
            None,
        ),
        DeliveryMode::Broker => {
            let connector = WsConnector::new(config.broker.url.clone());
            let (channel, events) = NotificationChannel::connect(&config.broker, connector)
                .map_err(|e| format!("Failed to start broker connection: {}", e))?;
            (Route::Broker(channel.publisher()), Some(channel), Some(events))
        }
    };
    tracing::info!(delivery = ?config.delivery, server = %config.server.base_url, "client started");

    let gateway = HttpGateway::new(&config.server, route);
    let mut runtime =
        Runtime::new(controller, Arc::new(gateway)).with_palette(palette.clone(), png_scale);
    if let Some(events) = notifications {
        runtime = runtime.with_notifications(events);
    }
    Ok(Client { runtime, channel })
}

fn solve(config: &Config, palette: Palette, png_scale: f32, args: &SolveArgs) -> Result<(), String> {
    // reject a bad output path before touching the network
    tourviz::export::Format::from_path(&args.output).map_err(|e| e.to_string())?;
    let timeout = Duration::from_secs(args.timeout);
    let mut client = start_client(config, &palette, png_scale)?;
    let rt = &mut client.runtime;

    let mut setup = vec![Command::SelectAlgorithm(args.algorithm.clone())];
    for param in &args.params {
        let (key, value) = param
            .split_once('=')
            .ok_or_else(|| format!("Parameter '{}' must look like key=value", param))?;
        setup.push(Command::SetParam {
            key: key.trim().to_string(),
            value: value.trim().to_string(),
        });
    }
    setup.push(Command::Generate(args.cities.clone()));
    for command in setup {
        rt.dispatch(Event::Command(command));
        if let Some(alert) = rt.alerts().last() {
            return Err(alert.clone());
        }
    }

    rt.run_until(|c| !c.session().is_generating(), timeout);
    if rt.controller().session().phase() != Phase::GraphReady {
        return Err(rt
            .alerts()
            .last()
            .cloned()
            .unwrap_or_else(|| format!("No graph within {} s", args.timeout)));
    }

    if let Some(channel) = &client.channel {
        if !channel.wait_connected(timeout) {
            return Err(format!("Broker {} not reachable", config.broker.url));
        }
    }

    rt.dispatch(Event::Command(Command::Solve));
    rt.run_until(|c| c.session().phase() != Phase::Solving, timeout);
    match rt.controller().session().phase() {
        Phase::Solved => {}
        Phase::Solving => return Err(format!("No solution within {} s", args.timeout)),
        _ => {
            return Err(rt
                .alerts()
                .last()
                .cloned()
                .unwrap_or_else(|| "Solve failed".to_string()));
        }
    }

    if let Some(solution) = rt.controller().session().solution() {
        println!("Solution cost: {}", solution.cost);
    }
    rt.dispatch(Event::Command(Command::Render(args.output.clone())));
    match rt.alerts().last() {
        Some(alert) => Err(alert.clone()),
        None => Ok(()),
    }
}

fn shell(config: &Config, palette: Palette, png_scale: f32, args: &ShellArgs) -> Result<(), String> {
    let mut client = start_client(config, &palette, png_scale)?;
    if let Some(output) = &args.output {
        let sink = FileSink::new(output, palette.clone(), png_scale).map_err(|e| e.to_string())?;
        client.runtime = client.runtime.with_sink(Box::new(sink));
    }

    let events = client.runtime.sender();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match command::parse(&line) {
                    Ok(Some(command)) => {
                        if events.send(Event::Command(command)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
            let _ = events.send(Event::Command(Command::Quit));
        })
        .map_err(|e| format!("Failed to start input reader: {}", e))?;

    eprintln!("tourviz shell, type 'help' for commands");
    client.runtime.run();
    Ok(())
}
