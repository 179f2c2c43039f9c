use lmlab::engine::Trajectory;
use lmlab::prng::Prng;
use lmlab::projector::{CountingView, DerivedView, DescentView};
use lmlab::vocab::symbol_label;
use lmlab::{CountingSpec, PlaybackConfig, PlaybackController, Preset, SimulationSpec, TickOutcome};

fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let fast = if let Some(i) = args.iter().position(|a| a == "--fast") {
        args.remove(i);
        true
    } else {
        false
    };

    match args.first().map(String::as_str) {
        None => replay(Preset::Hello.spec(), fast),
        Some("--help" | "-h" | "help") => print_help(),
        Some("presets") => list_presets(),
        Some("count") => {
            let Some(text) = args.get(1) else {
                print_help();
                std::process::exit(2);
            };
            let limit = args
                .get(2)
                .and_then(|s| s.parse().ok())
                .unwrap_or(CountingSpec::DEFAULT_VOCABULARY_LIMIT);
            replay(
                CountingSpec::new(text.as_str()).with_vocabulary_limit(limit).into(),
                fast,
            );
        }
        Some("descent") => {
            let name = args.get(1).map(String::as_str).unwrap_or("good");
            match Preset::from_label(name) {
                Some(p) => replay(p.spec(), fast),
                None => {
                    eprintln!("Unknown preset: {name}");
                    list_presets();
                    std::process::exit(2);
                }
            }
        }
        Some("sample") => {
            let text = args.get(1).map(String::as_str).unwrap_or("hello world");
            let start = args.get(2).and_then(|s| s.chars().next()).unwrap_or('h');
            let len = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(40);
            let seed = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(7);
            run_sample(text, start, len, seed);
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }
}

fn print_help() {
    println!("lmlab (stepwise language-model lesson replays)");
    println!("usage:");
    println!("  lmlab [--fast]                          replay bigram counting of \"hello world\"");
    println!("  lmlab count <text> [limit] [--fast]     replay bigram counting of <text>");
    println!("  lmlab descent <preset> [--fast]         replay a gradient-descent preset");
    println!("  lmlab sample <text> <start> [len] [seed]  sample from the counted matrix");
    println!("  lmlab presets                           list preset names");
    println!("  lmlab --help");
}

fn list_presets() {
    for p in Preset::all() {
        let detail = match p.spec() {
            SimulationSpec::Counting(c) => format!("text={:?} limit={}", c.source_text, c.vocabulary_limit),
            SimulationSpec::Optimization(o) => format!(
                "w={:?} x={:?} target={} lr={} steps={}",
                o.initial_weights, o.inputs, o.target, o.learning_rate, o.max_steps
            ),
        };
        println!("  {:<10} {}", p.label(), detail);
    }
}

/// Autoplay a spec to completion, printing the view after every tick.
fn replay(spec: SimulationSpec, fast: bool) {
    let mut controller = PlaybackController::with_spec(PlaybackConfig::default(), spec);
    if let Trajectory::Counting(run) = controller.trajectory() {
        println!("normalized: {:?}", run.normalized_text());
        println!(
            "vocabulary ({}/{}): {}  skipped symbols={} skipped pairs={}",
            run.vocabulary().len(),
            run.spec().vocabulary_limit,
            run.vocabulary().labels().join(" "),
            run.vocabulary().skipped_symbols(),
            run.skipped_pairs()
        );
    }

    let Some(ticket) = controller.play() else {
        println!("nothing to play");
        return;
    };

    loop {
        if !fast {
            std::thread::sleep(ticket.interval());
        }
        let outcome = controller.tick(ticket);
        print_view(controller.view());
        if !outcome.keeps_running() {
            if let TickOutcome::Stale = outcome {
                eprintln!("autoplay stopped unexpectedly");
            }
            break;
        }
    }

    if let Some(verdict) = controller.verdict() {
        println!("verdict: {}", verdict.label());
    }
}

fn print_view(view: &DerivedView) {
    match view {
        DerivedView::Counting(v) => print_counting(v),
        DerivedView::Optimization(v) => print_descent(v),
    }
}

fn print_counting(v: &CountingView) {
    if let Some(s) = v.active {
        println!(
            "step {:>3}/{}  counted ({} -> {})",
            s.index + 1,
            v.total_steps,
            symbol_label(s.from),
            symbol_label(s.to)
        );
    }
    let labels = v.vocabulary.labels();
    println!("     {}", labels.iter().map(|l| format!("{l:>3}")).collect::<String>());
    for (r, label) in labels.iter().enumerate() {
        let row: String = v
            .counts
            .row(r)
            .iter()
            .enumerate()
            .map(|(c, &n)| {
                if v.active_cell() == Some((r, c)) {
                    format!("{:>2}*", n)
                } else {
                    format!("{n:>3}")
                }
            })
            .collect();
        println!("  {label:>2} {row}");
    }
}

fn print_descent(v: &DescentView) {
    if let Some(s) = &v.current {
        println!(
            "step {:>3}/{}  w={:?} output={:.4} error={:+.4} loss={:.6} grad={:?}",
            s.index + 1,
            v.total_steps,
            s.weights.iter().map(|w| (w * 1e4).round() / 1e4).collect::<Vec<_>>(),
            s.output,
            s.error,
            s.loss,
            s.gradients.iter().map(|g| (g * 1e4).round() / 1e4).collect::<Vec<_>>(),
        );
    }
}

fn run_sample(text: &str, start: char, len: usize, seed: u64) {
    let mut controller =
        PlaybackController::with_spec(PlaybackConfig::default(), CountingSpec::new(text).into());
    controller.jump_to_end();
    let Some(view) = controller.view().as_counting() else {
        return;
    };
    let mut rng = Prng::new(seed);
    let out = view.sample(start, len, &mut rng);
    if out.is_empty() {
        eprintln!("start symbol {start:?} is not in the vocabulary");
        std::process::exit(1);
    }
    println!("{out}");
}
