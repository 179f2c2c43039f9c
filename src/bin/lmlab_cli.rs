//! CLI client for the `lmlabd` daemon.
//!
//! Commands run in order over one connection, so they share one session:
//!   lmlab-cli preset good play watch
//!   lmlab-cli count "hello world" step step step status
//!   lmlab-cli preset hello end sample h 30 7
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`
//! or `LMLAB_ADDR`.

use lmlab::{CountingSpec, OptimizationSpec, SimulationSpec};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Build { spec: SimulationSpec },
    Preset { name: String },
    StepForward,
    Play,
    Pause,
    JumpToEnd,
    ScrubTo { position: isize },
    Reset,
    SetInterval { ms: u32 },
    Sample { start: char, len: usize, seed: u64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(StateSnapshot),
    Success { message: String },
    Sample { text: String },
    Error { message: String },
}

#[derive(Debug, Clone, Deserialize)]
struct StateSnapshot {
    kind: String,
    phase: String,
    position: isize,
    is_playing: bool,
    total_steps: usize,
    progress: f64,
    interval_ms: u32,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    counting: Option<CountingSummary>,
    view: View,
}

#[derive(Debug, Clone, Deserialize)]
struct CountingSummary {
    normalized_text: String,
    vocabulary_labels: Vec<String>,
    skipped_symbols: usize,
    skipped_pairs: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum View {
    Counting {
        counts: Matrix,
        #[serde(default)]
        active: Option<ActiveCell>,
    },
    Optimization {
        #[serde(default)]
        current: Option<CurrentStep>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Matrix {
    size: usize,
    cells: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ActiveCell {
    row: usize,
    col: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct CurrentStep {
    weights: Vec<f64>,
    output: f64,
    loss: f64,
}

enum Command {
    Send(Request),
    Watch,
}

fn usage() -> ! {
    eprintln!("lmlab-cli (talks to lmlabd @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: lmlab-cli [--addr host:port] <command> [args] [<command> [args] ...]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show session state");
    eprintln!("  count <text> [limit]        Build a bigram counting sequence");
    eprintln!("  descent <lr> [steps]        Build the running gradient-descent example");
    eprintln!("  preset <name>               Build a named preset");
    eprintln!("  step | play | pause | end | reset");
    eprintln!("  scrub <position>            Move the cursor (-1 = before the first step)");
    eprintln!("  interval <10-60000>         Autoplay interval for the current kind (ms)");
    eprintln!("  sample <start> [len] [seed] Sample text from the counts at the cursor");
    eprintln!("  watch                       Poll state until autoplay stops");
    process::exit(1);
}

fn parse_args() -> (String, Vec<Command>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = std::env::var("LMLAB_ADDR").unwrap_or_else(|_| "127.0.0.1:9877".to_string());
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    match parse_commands(&args) {
        Ok(cmds) if !cmds.is_empty() => (addr, cmds),
        Ok(_) => usage(),
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    }
}

fn parse_commands(args: &[String]) -> Result<Vec<Command>, String> {
    let mut out = Vec::new();
    let mut i = 0;

    // Optional positional argument: present when the next word is not a command.
    let optional = |i: usize| args.get(i).filter(|a| !is_command(a.as_str()));

    while i < args.len() {
        let cmd = args[i].as_str();
        i += 1;
        let command = match cmd {
            "status" => Command::Send(Request::GetState),
            "step" => Command::Send(Request::StepForward),
            "play" => Command::Send(Request::Play),
            "pause" => Command::Send(Request::Pause),
            "end" => Command::Send(Request::JumpToEnd),
            "reset" => Command::Send(Request::Reset),
            "watch" => Command::Watch,
            "count" => {
                let text = args.get(i).ok_or("count needs a text")?.clone();
                i += 1;
                let mut spec = CountingSpec::new(text);
                if let Some(limit) = optional(i) {
                    let limit = limit
                        .parse()
                        .map_err(|_| "count limit must be a number".to_string())?;
                    spec = spec.with_vocabulary_limit(limit);
                    i += 1;
                }
                Command::Send(Request::Build { spec: spec.into() })
            }
            "descent" => {
                let lr: f64 = args
                    .get(i)
                    .ok_or("descent needs a learning rate")?
                    .parse()
                    .map_err(|_| "learning rate must be a number".to_string())?;
                i += 1;
                let mut spec = OptimizationSpec::running_example(lr);
                if let Some(steps) = optional(i) {
                    let steps = steps
                        .parse()
                        .map_err(|_| "descent steps must be a number".to_string())?;
                    spec = spec.with_max_steps(steps);
                    i += 1;
                }
                Command::Send(Request::Build { spec: spec.into() })
            }
            "preset" => {
                let name = args.get(i).ok_or("preset needs a name")?.clone();
                i += 1;
                Command::Send(Request::Preset { name })
            }
            "scrub" => {
                let position = args
                    .get(i)
                    .ok_or("scrub needs a position")?
                    .parse()
                    .map_err(|_| "scrub position must be a number".to_string())?;
                i += 1;
                Command::Send(Request::ScrubTo { position })
            }
            "interval" => {
                let ms = args
                    .get(i)
                    .ok_or("interval needs milliseconds")?
                    .parse()
                    .map_err(|_| "interval must be a number (10-60000)".to_string())?;
                i += 1;
                Command::Send(Request::SetInterval { ms })
            }
            "sample" => {
                let start = args
                    .get(i)
                    .and_then(|s| s.chars().next())
                    .ok_or("sample needs a start symbol")?;
                i += 1;
                let mut len = 40;
                let mut seed = 0;
                if let Some(v) = optional(i) {
                    len = v.parse().map_err(|_| "sample len must be a number".to_string())?;
                    i += 1;
                    if let Some(v) = optional(i) {
                        seed = v.parse().map_err(|_| "sample seed must be a number".to_string())?;
                        i += 1;
                    }
                }
                Command::Send(Request::Sample { start, len, seed })
            }
            other => return Err(format!("unknown command: {other}")),
        };
        out.push(command);
    }
    Ok(out)
}

fn is_command(word: &str) -> bool {
    matches!(
        word,
        "status"
            | "step"
            | "play"
            | "pause"
            | "end"
            | "reset"
            | "watch"
            | "count"
            | "descent"
            | "preset"
            | "scrub"
            | "interval"
            | "sample"
    )
}

struct Connection {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Connection {
    fn open(addr: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .map_err(|e| format!("set_read_timeout: {e}"))?;
        let reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);
        Ok(Self { stream, reader })
    }

    fn send(&mut self, req: &Request) -> Result<Response, String> {
        let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
        self.stream
            .write_all(line.as_bytes())
            .and_then(|_| self.stream.write_all(b"\n"))
            .map_err(|e| format!("send: {e}"))?;

        let mut resp_line = String::new();
        self.reader
            .read_line(&mut resp_line)
            .map_err(|e| format!("recv: {e}"))?;
        serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
    }
}

fn print_state(s: &StateSnapshot) {
    println!(
        "kind={} phase={} position={}/{} playing={} progress={:.0}% interval={}ms{}",
        s.kind,
        s.phase,
        s.position,
        s.total_steps,
        s.is_playing,
        s.progress * 100.0,
        s.interval_ms,
        s.verdict
            .as_deref()
            .map(|v| format!(" verdict={v}"))
            .unwrap_or_default(),
    );

    match &s.view {
        View::Counting { counts, active } => {
            let Some(summary) = &s.counting else { return };
            println!(
                "text={:?} skipped_symbols={} skipped_pairs={}",
                summary.normalized_text, summary.skipped_symbols, summary.skipped_pairs
            );
            let labels = &summary.vocabulary_labels;
            println!("     {}", labels.iter().map(|l| format!("{l:>3}")).collect::<String>());
            for (r, label) in labels.iter().enumerate().take(counts.size) {
                let row: String = (0..counts.size)
                    .map(|c| {
                        let n = counts.cells.get(r * counts.size + c).copied().unwrap_or(0);
                        match active {
                            Some(a) if a.row == r && a.col == c => format!("{n:>2}*"),
                            _ => format!("{n:>3}"),
                        }
                    })
                    .collect();
                println!("  {label:>2} {row}");
            }
        }
        View::Optimization { current } => {
            if let Some(step) = current {
                println!(
                    "w={:?} output={:.4} loss={:.6}",
                    step.weights, step.output, step.loss
                );
            }
        }
    }
}

/// Poll until autoplay stops, printing each new position.
fn watch(conn: &mut Connection) -> Result<(), String> {
    let mut last = None;
    loop {
        match conn.send(&Request::GetState)? {
            Response::State(s) => {
                if last != Some(s.position) {
                    print_state(&s);
                    last = Some(s.position);
                }
                if !s.is_playing {
                    return Ok(());
                }
                let wait = u64::from(s.interval_ms).clamp(20, 500);
                std::thread::sleep(Duration::from_millis(wait));
            }
            Response::Error { message } => return Err(message),
            _ => return Err("unexpected response to GetState".to_string()),
        }
    }
}

fn run(addr: &str, commands: Vec<Command>) -> Result<(), String> {
    let mut conn = Connection::open(addr)?;
    for command in commands {
        match command {
            Command::Watch => watch(&mut conn)?,
            Command::Send(req) => match conn.send(&req)? {
                Response::State(s) => print_state(&s),
                Response::Success { message } => println!("{message}"),
                Response::Sample { text } => println!("{text}"),
                Response::Error { message } => return Err(format!("Error: {message}")),
            },
        }
    }
    Ok(())
}

fn main() {
    let (addr, commands) = parse_args();
    if let Err(e) = run(&addr, commands) {
        eprintln!("Failed: {e}");
        process::exit(1);
    }
}
