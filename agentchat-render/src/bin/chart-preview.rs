use agentchat_render::{render_assistant_html, RenderedBlock};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: chart-preview [--write <dir>] <reply.html>...");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  chart-preview reply.html");
        eprintln!("  chart-preview --write out/ replies/*.html");
        process::exit(1);
    }

    let mut out_dir: Option<PathBuf> = None;
    let mut files: Vec<String> = Vec::new();
    let mut rest = args[1..].iter();
    while let Some(arg) = rest.next() {
        if arg == "--write" {
            match rest.next() {
                Some(dir) => out_dir = Some(PathBuf::from(dir)),
                None => {
                    eprintln!("--write needs a directory");
                    process::exit(1);
                }
            }
        } else {
            files.push(arg.clone());
        }
    }

    if let Some(dir) = &out_dir {
        if let Err(e) = fs::create_dir_all(dir) {
            eprintln!("✗ cannot create {}: {}", dir.display(), e);
            process::exit(1);
        }
    }

    let mut exit_code = 0;
    for file_path in files {
        match preview_file(&file_path, out_dir.as_deref()) {
            Ok((html_blocks, charts)) => {
                println!(
                    "✓ {}: {} html block(s), {} chart(s)",
                    file_path, html_blocks, charts
                );
            }
            Err(e) => {
                eprintln!("✗ {}: {}", file_path, e);
                exit_code = 1;
            }
        }
    }

    process::exit(exit_code);
}

fn preview_file(path: &str, out_dir: Option<&Path>) -> std::io::Result<(usize, usize)> {
    let content = fs::read_to_string(path)?;
    let blocks = render_assistant_html(&content);
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("reply");

    let mut html_blocks = 0;
    let mut charts = 0;
    for block in &blocks {
        match block {
            RenderedBlock::Html { html } => {
                html_blocks += 1;
                if let Some(dir) = out_dir {
                    fs::write(dir.join(format!("{}-html-{}.html", stem, html_blocks)), html)?;
                } else {
                    println!("--- html #{} ---", html_blocks);
                    println!("{}", html);
                }
            }
            RenderedBlock::Chart(chart) => {
                charts += 1;
                if let Some(dir) = out_dir {
                    fs::write(
                        dir.join(format!("{}-chart-{}.html", stem, charts)),
                        chart.document(),
                    )?;
                } else {
                    println!(
                        "--- chart #{} ({:?}, {}px, sandbox=\"{}\") ---",
                        charts,
                        chart.kind,
                        chart.initial_height,
                        chart.sandbox()
                    );
                    println!("{}", chart.chart_html);
                }
            }
        }
    }
    Ok((html_blocks, charts))
}
