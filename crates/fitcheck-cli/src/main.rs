use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fitcheck_contracts::catalog::{
    default_wardrobe, BACKGROUND_PRESETS, POSE_INSTRUCTIONS, VIDEO_TEMPLATES,
};
use fitcheck_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use fitcheck_contracts::outfit::GarmentRef;
use fitcheck_engine::gateway::swatch_upload;
use fitcheck_engine::session::{
    available_pose_labels, current_pose_label, display_image, next_pose_index,
    outfit_description, previous_pose_index, scene_description,
};
use fitcheck_engine::{
    export_gallery, DryrunGateway, FailureKind, GatewayConfig, GenerationGateway, HttpGateway,
    Outcome, SessionConfig, TryOnSession, UploadFile,
};
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "fitcheck", version, about = "Virtual try-on session REPL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    /// Print poses, wardrobe, video templates and example scenes.
    Catalog,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Use the offline gateway instead of the backend.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    model_photo: Option<PathBuf>,
    #[arg(long)]
    brand: Option<String>,
}

const PROGRESS_POLL: Duration = Duration::from_millis(250);
const PREVIEW_CHARS: usize = 72;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("fitcheck error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Catalog => {
            print_catalog();
            Ok(0)
        }
    }
}

/// Where wardrobe garment images come from.
enum GarmentSource {
    /// Generated solid-color swatches, no network.
    Swatch,
    Download(HttpClient),
}

impl GarmentSource {
    fn load(&self, garment: &GarmentRef) -> Result<UploadFile> {
        match self {
            Self::Swatch => swatch_upload(garment),
            Self::Download(client) => {
                UploadFile::fetch(client, &garment.source, &format!("{}.png", garment.id))
                    .with_context(|| format!("failed to load garment image for {}", garment.id))
            }
        }
    }
}

struct ChatContext {
    session: TryOnSession,
    garments: GarmentSource,
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let (gateway, garments): (Arc<dyn GenerationGateway>, GarmentSource) = if args.dryrun {
        (Arc::new(DryrunGateway::default()), GarmentSource::Swatch)
    } else {
        let mut config = GatewayConfig::from_env();
        if let Some(api_base) = args.api_base.as_deref() {
            config = config.with_api_base(api_base);
        }
        let gateway = HttpGateway::new(config)?;
        let client = gateway.client().clone();
        (Arc::new(gateway), GarmentSource::Download(client))
    };
    let session = TryOnSession::new(
        args.out.clone(),
        events_path,
        gateway,
        SessionConfig::default(),
    )?;
    let context = ChatContext { session, garments };

    if let Some(brand) = args.brand.as_deref() {
        context.session.set_brand_name(brand);
    }
    if let Some(photo) = args.model_photo.as_deref() {
        let photo = UploadFile::from_path(photo)?;
        report(
            "Model",
            run_with_progress(&context.session, move |session| session.create_model(&photo)),
        );
    }

    println!("Fit Check chat started. Type /help for commands.");
    let result = chat_loop(&context, io::stdin().lock());
    context.session.close();
    result
}

/// Reads commands until end of input. The caller owns session teardown.
fn chat_loop(context: &ChatContext, mut input: impl BufRead) -> Result<()> {
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent.action == "noop" {
            continue;
        }
        if let Err(err) = dispatch(&context, &intent) {
            println!("Error: {err:#}");
        }
    }
    Ok(())
}

fn dispatch(context: &ChatContext, intent: &Intent) -> Result<()> {
    let session = &context.session;
    match intent.action.as_str() {
        "help" => {
            println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            println!("Plain text generates a scene from the text.");
        }
        "create_model" => {
            let photo = UploadFile::from_path(&path_arg(intent)?)?;
            report(
                "Model",
                run_with_progress(session, move |session| session.create_model(&photo)),
            );
        }
        "select_garment" => {
            let id = string_arg(intent, "garment_id").unwrap_or_default();
            let Some(garment) = session.inspect(|state| state.wardrobe.get(&id).cloned()) else {
                println!("Unknown garment '{id}'. Try /wardrobe.");
                return Ok(());
            };
            let file = context.garments.load(&garment)?;
            let label = format!("Garment {}", garment.name);
            report(
                &label,
                run_with_progress(session, move |session| {
                    session.select_garment(&file, garment)
                }),
            );
        }
        "upload_garment" => {
            let path = path_arg(intent)?;
            let file = UploadFile::from_path(&path)?;
            let garment = garment_from_upload(&path, string_arg(intent, "name").as_deref());
            let label = format!("Garment {}", garment.name);
            report(
                &label,
                run_with_progress(session, move |session| {
                    session.select_garment(&file, garment)
                }),
            );
        }
        "remove_garment" => report("Undo", session.remove_last_garment()),
        "select_pose" => {
            let Some(index) = index_arg(intent).filter(|index| *index < POSE_INSTRUCTIONS.len())
            else {
                println!("Pose must be 0..{}.", POSE_INSTRUCTIONS.len() - 1);
                return Ok(());
            };
            change_pose(session, index);
        }
        "next_pose" => {
            let index = session.inspect(next_pose_index);
            change_pose(session, index);
        }
        "previous_pose" => match session.inspect(previous_pose_index) {
            Some(index) => change_pose(session, index),
            None => println!("Only one pose rendered so far."),
        },
        "generate_background" => {
            let prompt = intent.prompt.clone().unwrap_or_default();
            report(
                "Scene",
                run_with_progress(session, move |session| session.generate_background(&prompt)),
            );
        }
        "upload_background" => {
            let file = UploadFile::from_path(&path_arg(intent)?)?;
            report(
                "Custom scene",
                run_with_progress(session, move |session| session.upload_background(&file)),
            );
        }
        "remove_background" => report("Scene removed", session.remove_background()),
        "select_gallery" => {
            let index = index_arg(intent).unwrap_or(usize::MAX);
            let Some(url) =
                session.inspect(|state| state.generation_history.get(index).cloned())
            else {
                println!("No gallery image #{index}.");
                return Ok(());
            };
            report("Gallery", session.select_gallery_image(&url));
        }
        "generate_video" => {
            let template_id = string_arg(intent, "template_id");
            report(
                "Video",
                run_with_progress(session, move |session| {
                    session.generate_video(template_id.as_deref())
                }),
            );
            if let Some(path) = session.inspect(|state| {
                state
                    .active_video
                    .as_ref()
                    .map(|video| video.handle.path().to_path_buf())
            }) {
                println!("Video at {} (deleted when the chat ends)", path.display());
            }
        }
        "close_video" => report("Video closed", session.close_video()),
        "select_video" | "remove_video" => {
            let index = index_arg(intent).unwrap_or(usize::MAX);
            let Some(id) =
                session.inspect(|state| state.video_history.get(index).map(|item| item.id.clone()))
            else {
                println!("No video #{index}.");
                return Ok(());
            };
            if intent.action == "select_video" {
                report("Video", session.select_video(&id));
            } else {
                report("Video removed", session.remove_video(&id));
            }
        }
        "generate_post_copy" => {
            report(
                "Post copy",
                run_with_progress(session, |session| session.generate_post_copy()),
            );
            if let Some(copy) = session.inspect(|state| state.post_copy.clone()) {
                println!("{copy}");
            }
        }
        "edit_post_copy" => {
            session.set_post_copy(&string_arg(intent, "text").unwrap_or_default());
            println!("Post copy updated.");
        }
        "set_brand" => {
            let brand = string_arg(intent, "text").unwrap_or_default();
            session.set_brand_name(&brand);
            println!("Brand set to '{}'.", brand.trim());
        }
        "generate_carousel" => {
            report(
                "Carousel",
                run_with_progress(session, |session| session.generate_carousel()),
            );
            for (index, image) in session
                .inspect(|state| state.carousel_images.clone())
                .iter()
                .enumerate()
            {
                println!("  [{index}] {}", preview(image));
            }
        }
        "export" => {
            let exported = export_gallery(session, &path_arg(intent)?)?;
            println!(
                "Exported {} images to {} (summary: {})",
                exported.images.len(),
                exported.dir.display(),
                exported.summary_path.display()
            );
        }
        "status" => print_status(session),
        "list_wardrobe" => {
            for garment in session.inspect(|state| state.wardrobe.items().to_vec()) {
                println!("  {:<14} {}", garment.id, garment.name);
            }
        }
        "list_poses" => print_poses(),
        "list_templates" => print_templates(),
        "reset" => {
            session.reset();
            println!("Session reset.");
        }
        "invalid" => println!(
            "{}",
            string_arg(intent, "reason").unwrap_or_else(|| "Invalid command".to_string())
        ),
        "unknown" => println!(
            "Unknown command /{}. Type /help.",
            string_arg(intent, "command").unwrap_or_default()
        ),
        other => println!("Unhandled action {other}"),
    }
    Ok(())
}

fn change_pose(session: &TryOnSession, index: usize) {
    let label = format!("Pose {index}");
    report(
        &label,
        run_with_progress(session, move |session| session.select_pose(index)),
    );
}

/// Runs a session operation on a worker thread and prints loading
/// messages as they change.
fn run_with_progress<F>(session: &TryOnSession, operation: F) -> Outcome
where
    F: FnOnce(&TryOnSession) -> Outcome + Send + 'static,
{
    let worker = session.clone();
    let handle = thread::spawn(move || operation(&worker));
    let mut last_message: Option<String> = None;
    while !handle.is_finished() {
        let message = session.inspect(|state| {
            state
                .loading
                .as_ref()
                .map(|loading| loading.message.clone())
        });
        if message.is_some() && message != last_message {
            println!("  ... {}", message.as_deref().unwrap_or_default());
            last_message = message;
        }
        thread::sleep(PROGRESS_POLL);
    }
    handle.join().unwrap_or_else(|_| Outcome::Failed {
        kind: FailureKind::Gateway,
        message: "The operation stopped unexpectedly.".to_string(),
    })
}

fn report(label: &str, outcome: Outcome) {
    println!("{}", describe_outcome(label, &outcome));
}

fn describe_outcome(label: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Applied => format!("{label}: done"),
        Outcome::Skipped => format!("{label}: skipped (busy or nothing to apply)"),
        Outcome::Failed { message, .. } => format!("{label}: {message}"),
        Outcome::Discarded => format!("{label}: discarded after reset"),
    }
}

fn print_status(session: &TryOnSession) {
    session.inspect(|state| {
        if state.history.is_empty() {
            println!("No model yet. Use /model <photo>.");
            return;
        }
        println!(
            "Layer {}/{} | pose {} ({})",
            state.current_outfit_index,
            state.history.len() - 1,
            state.current_pose_index,
            current_pose_label(state)
        );
        let outfit = outfit_description(state);
        println!(
            "Outfit: {}",
            if outfit.is_empty() { "(base model)" } else { &outfit }
        );
        println!("Scene: {}", scene_description(state));
        println!("Poses rendered: {}", available_pose_labels(state).join(" | "));
        if let Some(image) = display_image(state) {
            println!("Showing: {}", preview(image));
        }
        println!(
            "Gallery: {} images | videos: {}",
            state.generation_history.len(),
            state.video_history.len()
        );
        for (index, item) in state.video_history.iter().enumerate() {
            let playing = state
                .active_video
                .as_ref()
                .map(|video| video.source_id == item.id)
                .unwrap_or(false);
            println!(
                "  [{index}] {} {}{}",
                item.template_icon,
                item.template_name,
                if playing { " (playing)" } else { "" }
            );
        }
        if !state.brand_name.is_empty() {
            println!("Brand: {}", state.brand_name);
        }
        if let Some(copy) = state.post_copy.as_deref() {
            println!("Post copy: {copy}");
        }
        if !state.prompt_history.is_empty() {
            println!("Recent scenes: {}", state.prompt_history.join(" | "));
        }
        if let Some(error) = state.error.as_deref() {
            println!("Error: {error}");
        }
    });
}

fn print_catalog() {
    println!("Poses:");
    print_poses();
    println!("Wardrobe:");
    for garment in default_wardrobe() {
        println!(
            "  {:<14} {} ({})",
            garment.id,
            garment.name,
            garment.category.as_deref().unwrap_or("-")
        );
    }
    println!("Video templates:");
    print_templates();
    println!("Example scenes:");
    for preset in BACKGROUND_PRESETS {
        println!("  {:<14} {}", preset.id, preset.name);
    }
}

fn print_poses() {
    for (index, pose) in POSE_INSTRUCTIONS.iter().enumerate() {
        println!("  [{index}] {pose}");
    }
}

fn print_templates() {
    for template in VIDEO_TEMPLATES {
        println!(
            "  {} {:<18} {}s, {} motion. {}",
            template.icon,
            template.id,
            template.duration_s,
            template.motion_strength.as_str(),
            template.description
        );
    }
}

fn garment_from_upload(path: &Path, name: Option<&str>) -> GarmentRef {
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("garment")
        .to_string();
    let name = name
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| stem.clone());
    GarmentRef::new(
        format!("custom-{}", stem.to_ascii_lowercase().replace(' ', "-")),
        name,
        path.to_string_lossy().to_string(),
    )
}

fn string_arg(intent: &Intent, key: &str) -> Option<String> {
    let raw = intent
        .command_args
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn path_arg(intent: &Intent) -> Result<PathBuf> {
    string_arg(intent, "path")
        .map(PathBuf::from)
        .context("a file path is required")
}

fn index_arg(intent: &Intent) -> Option<usize> {
    intent
        .command_args
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
}

fn preview(url: &str) -> String {
    if url.chars().count() <= PREVIEW_CHARS {
        return url.to_string();
    }
    url.chars().take(PREVIEW_CHARS).collect::<String>() + "..."
}
