use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use menushot_contracts::chat::{parse_intent, split_dish_list, WIZARD_HELP_COMMANDS};
use menushot_contracts::events::EventWriter;
use menushot_contracts::session::{
    new_session_id, write_summary, InvalidTransition, ResultsSummary, WizardState, WizardStep,
    MAX_SELECTED_DISHES,
};
use menushot_engine::ocr::{menu_image_from_path, MENU_IMAGE_MAX_DIM};
use menushot_engine::{user_message, Engine, EngineConfig, ModelOverrides, WizardSession};
use serde_json::{json, Map};

#[derive(Debug, Parser)]
#[command(
    name = "menushot",
    version,
    about = "Turn a restaurant menu into AI photographs of its dishes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive wizard driven by slash commands.
    Wizard(WizardArgs),
    /// Non-interactive run from menu to images.
    Run(RunArgs),
    /// Print the dish names suggested for a menu.
    Dishes(DishesArgs),
    /// Build an HTML gallery from a finished run.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    ocr_model: Option<String>,
    #[arg(long)]
    text_model: Option<String>,
    #[arg(long)]
    search_model: Option<String>,
    #[arg(long)]
    edit_model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
}

impl ProviderArgs {
    fn overrides(&self) -> ModelOverrides {
        ModelOverrides {
            ocr: self.ocr_model.clone(),
            text: self.text_model.clone(),
            search: self.search_model.clone(),
            edit: self.edit_model.clone(),
            image: self.image_model.clone(),
        }
    }
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct MenuSource {
    /// Photo of the menu, read by the OCR model.
    #[arg(long)]
    menu_image: Option<PathBuf>,
    /// Plain-text menu.
    #[arg(long)]
    menu_text: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct WizardArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    menu: MenuSource,
    #[arg(long = "dish", required = true)]
    dishes: Vec<String>,
    #[arg(long)]
    restaurant: Option<String>,
    #[arg(long)]
    reject_context: bool,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct DishesArgs {
    #[command(flatten)]
    menu: MenuSource,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    run: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

const SUMMARY_FILE: &str = "summary.json";
const PASTE_TERMINATOR: &str = ".";

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("menushot error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Wizard(args) => {
            run_wizard(args)?;
            Ok(0)
        }
        Command::Run(args) => run_pipeline(args),
        Command::Dishes(args) => run_dishes(args),
        Command::Export(args) => run_export(args),
    }
}

fn build_engine(provider: &ProviderArgs, events: EventWriter) -> Result<Arc<Engine>> {
    let config = EngineConfig::from_env(provider.provider.as_deref(), &provider.overrides())?;
    for warning in &config.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(Arc::new(Engine::from_config(&config, events)?))
}

fn open_events(out: &Path, events: Option<&Path>) -> Result<EventWriter> {
    fs::create_dir_all(out).with_context(|| format!("failed to create {}", out.display()))?;
    let path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    Ok(EventWriter::new(path, new_session_id()))
}

fn run_wizard(args: WizardArgs) -> Result<()> {
    let events = open_events(&args.out, args.events.as_deref())?;
    let engine = build_engine(&args.provider, events)?;
    let mut session = WizardSession::new(engine);

    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "menushot wizard started ({}). Type /help for commands.",
        session.engine().provider_name()
    );
    print_step(session.state());

    loop {
        print!("{}> ", session.state().step.as_str().to_ascii_lowercase());
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }

        let outcome = match intent.action.as_str() {
            "help" => {
                println!("Commands: {}", WIZARD_HELP_COMMANDS.join(" "));
                continue;
            }
            "quit" => break,
            "status" => {
                print_status(&session);
                continue;
            }
            "menu_image" => {
                let Some(path) = intent.arg_str("path") else {
                    println!("/ocr requires an image path");
                    continue;
                };
                let image = match menu_image_from_path(Path::new(path), MENU_IMAGE_MAX_DIM) {
                    Ok(image) => image,
                    Err(err) => {
                        println!("{}", user_message("Failed to read menu", &err));
                        continue;
                    }
                };
                println!("Reading menu...");
                session.submit_menu_image(&image).map(|_| ())
            }
            "menu_text_file" => {
                let Some(path) = intent.arg_str("path") else {
                    println!("/menu requires a text file path");
                    continue;
                };
                let text = match fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(err) => {
                        println!("Failed to read menu: {err}");
                        continue;
                    }
                };
                session.submit_menu_text(&text).map(|_| ())
            }
            "paste_menu" => {
                println!("Paste the menu, then a line with a single '{PASTE_TERMINATOR}':");
                let text = read_pasted_block(&mut stdin.lock())?;
                session.submit_menu_text(&text).map(|_| ())
            }
            "select_dishes" => session.select_dishes(&intent.arg_list("dishes")).map(|_| ()),
            "search_context" => {
                let Some(name) = intent.arg_str("name") else {
                    println!("/restaurant requires a name");
                    continue;
                };
                println!("Searching for context on {name}...");
                session.search_context(name).map(|_| ())
            }
            "skip_context" => {
                println!("Generating images...");
                session.skip_context().map(|_| ())
            }
            "accept_context" => {
                println!("Generating images...");
                session.accept_context().map(|_| ())
            }
            "reject_context" => {
                println!("Generating images...");
                session.reject_context().map(|_| ())
            }
            "dismiss_error" => session.dismiss_error().map(|_| ()),
            "reset" => {
                session.reset();
                Ok(())
            }
            "export" => {
                let out_path = intent
                    .arg_str("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.out.join("index.html"));
                match export_html(&args.out, &out_path) {
                    Ok(()) => println!("Exported to {}", out_path.display()),
                    Err(err) => println!("Export failed: {err:#}"),
                }
                continue;
            }
            "text" => {
                let text = intent.text.clone().unwrap_or_default();
                if session.state().step == WizardStep::DishSelection {
                    session.select_dishes(&split_dish_list(&text)).map(|_| ())
                } else {
                    println!("Not sure what to do with that here. Type /help for commands.");
                    continue;
                }
            }
            "unknown" => {
                let command = intent.arg_str("command").unwrap_or_default();
                println!("Unknown command: /{command}. Type /help for commands.");
                continue;
            }
            other => {
                println!("Unhandled action: {other}");
                continue;
            }
        };

        after_step(&session, outcome, &args.out);
    }

    Ok(())
}

fn read_pasted_block(reader: &mut impl BufRead) -> Result<String> {
    let mut lines = Vec::new();
    let mut buffer = String::new();
    loop {
        buffer.clear();
        if reader.read_line(&mut buffer)? == 0 {
            break;
        }
        let line = buffer.trim_end_matches(['\n', '\r']);
        if line.trim() == PASTE_TERMINATOR {
            break;
        }
        lines.push(line.to_string());
    }
    Ok(lines.join("\n"))
}

/// Reports the outcome of one wizard command. On `Results` the images and
/// manifest are saved; a failed save is reported and the REPL keeps going.
fn after_step(
    session: &WizardSession,
    outcome: Result<(), InvalidTransition>,
    out_dir: &Path,
) -> Option<PathBuf> {
    if let Err(err) = outcome {
        println!("{err}");
        return None;
    }
    let state = session.state();
    if let Some(error) = state.error.as_deref() {
        println!("Error: {error}");
        println!("(/dismiss to continue, /reset to start over)");
        return None;
    }
    let mut saved = None;
    if state.step == WizardStep::Results {
        match write_results(session, out_dir) {
            Ok(summary_path) => {
                for (dish, image_path) in state.generated.iter().zip(image_file_names(state)) {
                    println!("  {} -> {}", dish.name, out_dir.join(image_path).display());
                }
                println!("Summary: {}", summary_path.display());
                saved = Some(summary_path);
            }
            Err(err) => println!("Failed to save results: {err:#}"),
        }
    }
    print_step(state);
    saved
}

fn print_step(state: &WizardState) {
    match state.step {
        WizardStep::MenuInput => {
            println!("Start with /ocr <image>, /menu <text file> or /paste.");
        }
        WizardStep::DishSelection => {
            if state.suggested_dishes.is_empty() {
                println!("No dishes recognised.");
            } else {
                println!("Suggested dishes:");
                for (idx, dish) in state.suggested_dishes.iter().enumerate() {
                    println!("  {}. {dish}", idx + 1);
                }
            }
            println!(
                "Choose up to {MAX_SELECTED_DISHES} with /dishes A; B; C (or just type them)."
            );
        }
        WizardStep::ContextInput => {
            println!("Selected: {}", state.dish_names.join(", "));
            println!("/restaurant <name> to match its style, or /skip.");
        }
        WizardStep::ContextValidation => {
            if let Some(context) = state.context.as_ref() {
                println!("Style: {}", context.summary);
                for source in &context.sources {
                    println!("  source: {} ({})", source.title, source.uri);
                }
                for dish in &context.dish_contexts {
                    println!(
                        "  {}: {}",
                        dish.dish_name,
                        dish.image_url.as_deref().unwrap_or("no reference image")
                    );
                }
            }
            println!("/accept to use this context, /reject to generate without it.");
        }
        WizardStep::Generating => {
            println!("Generating...");
        }
        WizardStep::Results => {
            println!("Done. /export to build a gallery, /reset to start over.");
        }
    }
}

fn print_status(session: &WizardSession) {
    let state = session.state();
    println!("Session: {}", session.session_id());
    println!("Step: {}", state.step);
    if let Some(menu) = state.menu_text.as_deref() {
        println!("Menu: {} lines", menu.lines().count());
    }
    if !state.dish_names.is_empty() {
        println!("Dishes: {}", state.dish_names.join(", "));
    }
    if let Some(name) = state.restaurant_name.as_deref() {
        println!("Restaurant: {name}");
    }
    if let Some(error) = state.error.as_deref() {
        println!("Error: {error}");
    }
}

fn run_pipeline(args: RunArgs) -> Result<i32> {
    let events = open_events(&args.out, args.events.as_deref())?;
    let engine = build_engine(&args.provider, events)?;
    let mut session = WizardSession::new(engine);

    submit_menu(&mut session, &args.menu)?;
    ensure_no_error(session.state())?;
    session.select_dishes(&args.dishes)?;

    match args.restaurant.as_deref() {
        Some(restaurant) => {
            session.search_context(restaurant)?;
            ensure_no_error(session.state())?;
            if args.reject_context {
                session.reject_context()?;
            } else {
                session.accept_context()?;
            }
        }
        None => {
            session.skip_context()?;
        }
    }
    ensure_no_error(session.state())?;

    let summary_path = write_results(&session, &args.out)?;
    println!("Wrote {}", summary_path.display());
    Ok(0)
}

fn submit_menu(session: &mut WizardSession, menu: &MenuSource) -> Result<()> {
    if let Some(path) = menu.menu_image.as_deref() {
        let image = menu_image_from_path(path, MENU_IMAGE_MAX_DIM)?;
        session.submit_menu_image(&image)?;
    } else if let Some(path) = menu.menu_text.as_deref() {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        session.submit_menu_text(&text)?;
    } else {
        bail!("--menu-image or --menu-text is required");
    }
    Ok(())
}

fn ensure_no_error(state: &WizardState) -> Result<()> {
    if let Some(error) = state.error.as_deref() {
        bail!("{error}");
    }
    Ok(())
}

fn run_dishes(args: DishesArgs) -> Result<i32> {
    let engine = build_engine(&args.provider, EventWriter::disabled(new_session_id()))?;
    let text = if let Some(path) = args.menu.menu_image.as_deref() {
        let image = menu_image_from_path(path, MENU_IMAGE_MAX_DIM)?;
        engine
            .transcribe_menu(&image)
            .map_err(|err| anyhow::anyhow!(user_message("Failed to read menu", &err)))?
    } else if let Some(path) = args.menu.menu_text.as_deref() {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    } else {
        bail!("--menu-image or --menu-text is required");
    };

    let suggestions = engine.suggest_dishes(&text);
    println!("Source: {}", suggestions.source.as_str());
    for name in &suggestions.names {
        println!("{name}");
    }
    Ok(0)
}

fn run_export(args: ExportArgs) -> Result<i32> {
    export_html(&args.run, &args.out)?;
    println!("Exported to {}", args.out.display());
    Ok(0)
}

/// Writes each generated image as `dish-NN-<slug>.<ext>` plus the
/// `summary.json` manifest, returning the manifest path.
fn write_results(session: &WizardSession, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let image_paths = image_file_names(session.state());
    for (dish, file_name) in session.state().generated.iter().zip(&image_paths) {
        let bytes = BASE64
            .decode(dish.image_data.as_bytes())
            .with_context(|| format!("image data for '{}' is not valid base64", dish.name))?;
        let path = out_dir.join(file_name);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    }

    let summary = session.results_summary(&image_paths);
    let models = session.engine().models();
    let mut extra = Map::new();
    extra.insert(
        "provider".to_string(),
        json!(session.engine().provider_name()),
    );
    extra.insert(
        "models".to_string(),
        json!({
            "ocr": models.ocr,
            "text": models.text,
            "search": models.search,
            "edit": models.edit,
            "image": models.image,
        }),
    );
    let summary_path = out_dir.join(SUMMARY_FILE);
    write_summary(&summary_path, &summary, Some(&extra))?;
    Ok(summary_path)
}

fn image_file_names(state: &WizardState) -> Vec<String> {
    state
        .generated
        .iter()
        .enumerate()
        .map(|(idx, dish)| dish_file_name(idx, &dish.name, &dish.mime_type))
        .collect()
}

fn dish_file_name(idx: usize, name: &str, mime_type: &str) -> String {
    format!(
        "dish-{:02}-{}.{}",
        idx + 1,
        slugify(name),
        extension_for_mime(mime_type)
    )
}

fn slugify(name: &str) -> String {
    let mut slug = String::new();
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_end_matches('-').chars().take(40).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        return "dish".to_string();
    }
    slug.to_string()
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    let lowered = mime_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

fn export_html(run_dir: &Path, out_path: &Path) -> Result<()> {
    let summary_path = run_dir.join(SUMMARY_FILE);
    let summary = ResultsSummary::load(&summary_path)
        .with_context(|| format!("failed reading {}", summary_path.display()))?;

    let mut cards = String::new();
    for dish in &summary.dishes {
        let reference = dish
            .reference_url
            .as_deref()
            .map(|url| {
                format!(
                    "<div class='links'><a href='{url}'>reference</a></div>",
                    url = escape_html(url)
                )
            })
            .unwrap_or_default();
        cards.push_str(&format!(
            "<div class='card'><div class='thumb'><img src='{image_src}' alt='{name}'></div><div class='meta'><div class='name'>{name}</div>{reference}</div></div>",
            image_src = escape_html(&dish.image_path),
            name = escape_html(&dish.name),
        ));
    }

    let title = summary
        .restaurant_name
        .as_deref()
        .map(|name| format!("menushot: {}", escape_html(name)))
        .unwrap_or_else(|| "menushot".to_string());
    let style = summary
        .context_summary
        .as_deref()
        .map(|text| format!("<p class='style'>{}</p>", escape_html(text)))
        .unwrap_or_default();
    let sources = summary
        .sources
        .iter()
        .map(|source| {
            format!(
                "<li><a href='{uri}'>{title}</a></li>",
                uri = escape_html(&source.uri),
                title = escape_html(&source.title)
            )
        })
        .collect::<String>();
    let sources = if sources.is_empty() {
        String::new()
    } else {
        format!("<ul class='sources'>{sources}</ul>")
    };
    let exported_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let html_doc = format!(
        "<!doctype html>\n<html>\n<head>\n  <meta charset='utf-8'>\n  <title>{title}</title>\n  <style>\n    body {{ font-family: Arial, sans-serif; background: #f6f6f6; margin: 0; padding: 20px; }}\n    .grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(240px, 1fr)); gap: 16px; }}\n    .card {{ background: white; border-radius: 10px; overflow: hidden; box-shadow: 0 2px 8px rgba(0,0,0,0.08); }}\n    .thumb {{ width: 100%; height: 240px; background: #eee; display: flex; align-items: center; justify-content: center; }}\n    .thumb img {{ max-width: 100%; max-height: 100%; }}\n    .meta {{ padding: 10px; }}\n    .name {{ font-weight: bold; font-size: 14px; color: #333; }}\n    .style {{ color: #555; max-width: 720px; }}\n    .links a, .sources a {{ font-size: 12px; color: #0066cc; text-decoration: none; }}\n    footer {{ margin-top: 24px; font-size: 11px; color: #888; }}\n  </style>\n</head>\n<body>\n  <h1>{title}</h1>\n  {style}\n  <div class='grid'>\n    {cards}\n  </div>\n  {sources}\n  <footer>Session {session_id}, exported {exported_at}</footer>\n</body>\n</html>\n",
        session_id = escape_html(&summary.session_id),
    );

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out_path, html_doc)?;
    Ok(())
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}
