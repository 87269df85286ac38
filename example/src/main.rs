// Line-oriented operator console for the exfoliator instrument.
// Run with: cargo run -p example -- --url ws://127.0.0.1:8765
// For local development start the simulator first: cargo run -p sim

mod console;

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use console::{ConsoleCommand, HELP};
use exfoliator::{Client, ClientConfig, ClientEvent, ClientHandle, CommandHistory, ClientSnapshot};
use exfoliator_common::{InboundMessage, MacroVariables};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Operator console for the exfoliator relay")]
struct Args {
    /// Relay address; overrides the config file and EXFOLIATOR_URL.
    #[arg(long)]
    url: Option<String>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(url) = args.url {
        config.url = url;
        config.validate()?;
    }

    println!("=== Exfoliator Console ===");
    println!("Relay: {}\n", config.url);
    let mut history = CommandHistory::new(config.history_capacity);
    let client = Client::spawn(config)?;
    tokio::spawn(print_events(client.subscribe()));
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = if line.starts_with('!') {
            match history.recall(line) {
                Some(recalled) => {
                    println!("> {}", recalled);
                    ConsoleCommand::Raw(recalled.to_string())
                }
                None => {
                    println!("No such command in history");
                    continue;
                }
            }
        } else {
            match console::parse(line) {
                Ok(command) => command,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            }
        };

        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = execute(&client, &mut history, command).await {
            println!("Error: {}", e);
        }
    }

    println!("Shutting down...");
    client.shutdown().await?;
    Ok(())
}

async fn execute(
    client: &ClientHandle,
    history: &mut CommandHistory,
    command: ConsoleCommand,
) -> Result<(), Box<dyn Error>> {
    match command {
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Status => print_status(&client.snapshot().await?),
        ConsoleCommand::Home(axis) => client.home(axis).await?,
        ConsoleCommand::Enable(axis) => client.enable(axis).await?,
        ConsoleCommand::Disable(axis) => client.disable(axis).await?,
        ConsoleCommand::Move(axis, position) => client.move_to(axis, position).await?,
        ConsoleCommand::Toggle(key, desired) => client.toggle(key, desired).await?,
        ConsoleCommand::Temperature(t) => client.set_temperature(t).await?,
        ConsoleCommand::Tape {
            speed,
            torque,
            time,
        } => client.tape(speed, torque, time).await?,
        ConsoleCommand::EmergencyStop => client.emergency_stop().await?,
        ConsoleCommand::Raw(text) => {
            history.push(&text);
            client.send_text(&text).await?;
        }
        ConsoleCommand::History => {
            let count = history.len();
            for (i, entry) in history.iter().enumerate() {
                println!("  !-{:<3} {}", count - i, entry);
            }
        }
        ConsoleCommand::Programs => client.refresh_programs().await?,
        ConsoleCommand::Load(name) => client.load_program(&name).await?,
        ConsoleCommand::Save { name, path } => {
            let content = tokio::fs::read_to_string(&path).await?;
            client
                .save_program(&name, &content, MacroVariables::default())
                .await?;
        }
        ConsoleCommand::Delete(name) => client.delete_program(&name).await?,
        ConsoleCommand::Run(name) => {
            let calibration = client.calibration();
            let variables = MacroVariables {
                stage_x: calibration.stage_x,
                ..MacroVariables::default()
            };
            client.run_program(&name, variables).await?;
        }
        ConsoleCommand::Queue { program, targets } => {
            client.enqueue(&program, &targets).await?;
            println!("Queued {} run(s) of '{}'. Type 'start' to begin.", targets.len(), program);
        }
        ConsoleCommand::Start => client.start().await?,
        ConsoleCommand::Pause => client.pause().await?,
        ConsoleCommand::Resume => client.resume().await?,
        ConsoleCommand::Cancel => client.cancel().await?,
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn print_status(snapshot: &ClientSnapshot) {
    let mirror = &snapshot.mirror;
    println!("Channel:     {:?}{}", snapshot.connection, if mirror.is_stale() { " (stale)" } else { "" });
    println!("Controller:  {}", on_off(mirror.controller_connected(), "connected", "disconnected"));
    match mirror.temperature() {
        Some(t) => println!("Temperature: {:.1} C (set {:.1} C)", t.current, t.target),
        None => println!("Temperature: -"),
    }
    match mirror.position() {
        Some(p) => println!("Position:    X {:.2}  Y {:.2}", p.x, p.y),
        None => println!("Position:    -"),
    }
    for (axis, state) in mirror.motor_states() {
        println!("Motor {}:     {:?}", axis, state);
    }
    for (name, on) in mirror.pneumatics() {
        println!("Pneumatic:   {} {}", name, if *on { "extended" } else { "retracted" });
    }
    for (name, on) in mirror.vacuums() {
        println!("Vacuum:      {} {}", name, if *on { "on" } else { "off" });
    }
    if let Some(tape) = mirror.tape() {
        println!("Tape:        speed {} torque {}", tape.speed, tape.torque);
    }
    println!("E-stop:      {}", on_off(mirror.emergency_stopped(), "TRIGGERED", "clear"));

    let queue = &snapshot.queue;
    println!("Queue:       {:?}, {} done", queue.state, queue.completed);
    if let Some(entry) = &queue.in_flight {
        println!("  running    {} on {}", entry.program, entry.target);
    }
    for entry in queue.pending.iter().chain(queue.cached.iter()) {
        println!("  waiting    {} on {}", entry.program, entry.target);
    }
    println!("Programs:    {}", snapshot.programs.join(", "));
    if !snapshot.pending_confirmations.is_empty() {
        let keys: Vec<_> = snapshot.pending_confirmations.iter().map(|k| k.to_string()).collect();
        println!("Confirming:  {}", keys.join(", "));
    }
}

fn on_off(value: Option<bool>, on: &str, off: &str) -> String {
    match value {
        Some(true) => on.to_string(),
        Some(false) => off.to_string(),
        None => "-".to_string(),
    }
}

async fn print_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                println!("(missed {} events)", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            ClientEvent::Connection(state) => println!("[channel] {:?}", state),
            ClientEvent::ChangeConfirmed { key, value } => println!("[ok] {} = {}", key, value),
            ClientEvent::ChangeRolledBack { key, desired, restored } => println!(
                "[rollback] {} did not reach {}, showing {}",
                key,
                desired,
                on_off(restored, "true", "false")
            ),
            ClientEvent::QueueState(state) => println!("[queue] {:?}", state),
            ClientEvent::EntryDispatched { entry, remaining } => println!(
                "[queue] {} on {} at ({:.2}, {:.2}), {} left",
                entry.program, entry.target, entry.parameter_x, entry.parameter_y, remaining
            ),
            ClientEvent::EntryFinished { entry, error: Some(e) } => {
                println!("[queue] {} failed: {}", entry.target, e)
            }
            ClientEvent::EntryFinished { entry, error: None } => println!("[queue] {} done", entry.target),
            ClientEvent::QueueCompleted { count } => println!("[queue] all {} entries completed", count),
            ClientEvent::Catalog(names) => println!("[programs] {}", names.join(", ")),
            ClientEvent::Inbound(msg) => match msg {
                InboundMessage::CommandSent { command, status } => {
                    println!("[sent] {} {:?}", command, status)
                }
                InboundMessage::MachineResponse { response } => println!("[device] {}", response),
                InboundMessage::MacroContent { name, content } => {
                    println!("--- {} ---\n{}\n---", name, content)
                }
                InboundMessage::MacroError { error } => println!("[program error] {}", error),
                InboundMessage::MacroStopped { .. } => println!("[program] stopped"),
                InboundMessage::EmergencyStop { triggered: true } => println!("[E-STOP] triggered"),
                _ => {}
            },
            ClientEvent::Mirror(_) | ClientEvent::ChangeRequested { .. } => {}
        }
    }
}
