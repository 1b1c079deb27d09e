use rayon::ThreadPoolBuilder;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskline::{scope, Color, Console, ConsoleSink, Item, Redirector, Sink, Streams};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn main() -> Result<()> {
    // Come up with some work that needs to be performed. Let's pretend to
    // perform work on each file in the current directory.
    let mut files = Vec::new();
    for entry in fs::read_dir(".")? {
        files.push(entry?.path());
    }
    files.sort();

    // Build a thread pool with one thread per cpu.
    let cpus = num_cpus::get();
    let pool = ThreadPoolBuilder::new().num_threads(cpus).build()?;

    let console = Console::builder()
        .elapsed(Instant::now())
        .header_color(Color::Cyan)
        .stderr();

    // Warnings are queued by the workers and printed at the end by the main
    // thread, which labels them with the task that raised them.
    let warnings = Streams::new();
    let collected = Streams::new();
    let _labels = Redirector::extracting(&collected, Arc::new(ConsoleSink::new(console.clone())));

    pool.scope(|s| {
        for path in &files {
            let console = &console;
            let warnings = warnings.clone();
            s.spawn(move |_| work(console, path, warnings));
        }
    });

    warnings.flush_to(&collected)?;
    Ok(())
}

fn work(console: &Console, path: &Path, warnings: Streams) {
    let name = path.display().to_string();
    let task = scope::begin(&name);
    let out = console.task(task.task());

    // Produce output by writing to the task. Other tasks may cut in before
    // the line is finished.
    write!(out, "evaluating ");

    // Do some expensive work...
    let string = path.to_string_lossy();
    thread::sleep(Duration::from_millis(150 * string.len() as u64));

    // ... which may fail or succeed.
    if string.contains('c') {
        let _ = out.write_colored(Color::Red, "ERROR\n");

        let output = Streams::new();
        if let Ok(_tags) = Redirector::injecting(&output, Arc::new(warnings)) {
            let _ = output.write(Item::Warning(format!("{} contains the letter 'c'", name)));
        }
    } else {
        writeln!(out, "ok");
    }
}
