use std::env;
use std::process::ExitCode;

use galley::parse_document;
use galley_render::{Element, TypesetConfig, TypesetEngine};

#[derive(Clone, Debug)]
struct Args {
    document_path: String,
    config_path: Option<String>,
    json: bool,
    show_text: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            eprintln!("{}", help_text());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let args = parse_args(args)?;
    let xml = std::fs::read_to_string(&args.document_path)
        .map_err(|e| format!("cannot read {}: {}", args.document_path, e))?;
    let document = parse_document(&xml).map_err(|e| e.to_string())?;

    let config = match &args.config_path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path, e))?;
            TypesetConfig::from_json_str(&json).map_err(|e| e.to_string())?
        }
        None => TypesetConfig::default(),
    };

    let output = TypesetEngine::new(config)
        .typeset_document(&document)
        .map_err(|e| e.to_string())?;

    if args.json {
        let json = serde_json::to_string_pretty(&output.pages).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }

    println!(
        "pages={} quality={} passes={}",
        output.pages.len(),
        output.quality.0,
        output.passes
    );
    for page in &output.pages {
        println!(
            "page {}: lines={} elements={} footnotes={} chrome={}",
            page.page_number,
            page.metrics.line_count,
            page.content.len(),
            page.footnotes.len(),
            page.chrome.len()
        );
        if args.show_text {
            for text in page.elements().filter_map(Element::as_text) {
                println!("  {:>8.2} {:>8.2}  {}", text.x, text.y, text.text);
            }
        }
    }
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Args, String> {
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h") {
        return Err("help requested".to_string());
    }
    let document_path = args
        .get(1)
        .filter(|v| !v.starts_with("--"))
        .cloned()
        .ok_or_else(|| "missing document path".to_string())?;
    let mut cfg = Args {
        document_path,
        config_path: None,
        json: false,
        show_text: false,
    };

    let mut i = 2usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let v = args
                    .get(i + 1)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                cfg.config_path = Some(v.clone());
                i += 2;
            }
            "--json" => {
                cfg.json = true;
                i += 1;
            }
            "--text" => {
                cfg.show_text = true;
                i += 1;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(cfg)
}

fn help_text() -> &'static str {
    r#"galley-typeset - lay an XML document out into pages

USAGE:
  cargo run -p galley-render --features cli --bin galley-typeset -- <document.xml> [options]

OPTIONS:
  --config <file>     JSON typesetting config (default: built-in A4 layout)
  --json              print pages as JSON
  --text              list positioned text runs per page
  -h, --help          show this help

Set RUST_LOG=debug to trace quality retries and page breaks."#
}
