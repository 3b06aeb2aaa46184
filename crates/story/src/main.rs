use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow, bail};
use clap::Parser;
use manos_plate_core::{Editor, Point, Prompt, Selection, StoredDocument, markup};
use manos_plate_widgets::WidgetsConfig;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Commands run when neither input nor `--run` is given.
const DEMO_COMMANDS: &[&str] = &[
    "widgetBox.insert",
    "@:1",
    "insertBox.insert",
    "@:2",
    r#"sideCard.insert={"type":"alternate","url":"https://example.com"}"#,
    r#"placeholder.insert={"value":"first name"}"#,
];

#[derive(Parser, Debug)]
#[command(name = "manos-widgets-story")]
#[command(about = "Drive the widget editor and print its data and editing markup")]
struct Cli {
    /// Widget configuration file (JSON)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Data markup to load before running commands
    input: Option<PathBuf>,

    /// Command to run, optionally with JSON arguments (`id` or `id={...}`).
    /// `@path:offset` moves the caret instead.
    #[arg(long = "run", short = 'r')]
    run: Vec<String>,

    /// Raw control to press after the commands (`0.1:Set URL`)
    #[arg(long = "control")]
    controls: Vec<String>,

    /// Reply given to prompts raised by controls
    #[arg(long)]
    answer: Option<String>,

    /// Also print the content tree as stored JSON
    #[arg(long)]
    json: bool,

    /// List the available commands and exit
    #[arg(long)]
    list: bool,
}

struct FixedAnswer(Option<String>);

impl Prompt for FixedAnswer {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String> {
        tracing::info!(prompt = message, default, "control asked for input");
        self.0.clone()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let mut editor = manos_plate_widgets::editor(&config)?;

    if cli.list {
        for info in editor.commands() {
            println!("{}", serde_json::to_string(&info)?);
        }
        return Ok(());
    }

    if let Some(path) = &cli.input {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        editor
            .set_data(&data)
            .with_context(|| format!("parsing {}", path.display()))?;
    }

    let steps: Vec<&str> = if cli.input.is_none() && cli.run.is_empty() {
        DEMO_COMMANDS.to_vec()
    } else {
        cli.run.iter().map(String::as_str).collect()
    };
    for step in steps {
        run_step(&mut editor, step)?;
    }

    let mut answer = FixedAnswer(cli.answer.clone());
    for control in &cli.controls {
        press(&mut editor, control, &mut answer)?;
    }

    println!("data:\n{}", editor.get_data());
    println!("editing:\n{}", markup::to_markup(editor.editing_view()));
    if cli.json {
        let stored = StoredDocument::new(editor.doc().clone());
        println!("json:\n{}", stored.to_json_pretty()?);
    }
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<WidgetsConfig> {
    let Some(path) = path else {
        return Ok(WidgetsConfig::default());
    };
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    WidgetsConfig::from_json_str(&text).with_context(|| format!("loading {}", path.display()))
}

fn run_step(editor: &mut Editor, step: &str) -> Result<()> {
    if let Some(point) = step.strip_prefix('@') {
        let (path, offset) = point
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("expected `@path:offset`, got `{step}`"))?;
        let offset = offset
            .parse()
            .with_context(|| format!("invalid offset `{offset}`"))?;
        editor.set_selection(Selection::collapsed(Point::new(parse_path(path)?, offset)));
        return Ok(());
    }
    let (id, args) = match step.split_once('=') {
        Some((id, raw)) => {
            let args: Value = serde_json::from_str(raw)
                .with_context(|| format!("arguments for `{id}`"))?;
            (id, Some(args))
        }
        None => (step, None),
    };
    let enabled = editor.command_state(id).is_some_and(|state| state.enabled);
    tracing::debug!(command = id, enabled, "running command");
    editor.run_command(id, args)?;
    Ok(())
}

fn press(editor: &mut Editor, control: &str, prompt: &mut dyn Prompt) -> Result<()> {
    let (path, label) = control
        .split_once(':')
        .ok_or_else(|| anyhow!("expected `path:label`, got `{control}`"))?;
    let owner = parse_path(path)?;
    if !editor.trigger_control(&owner, label, prompt)? {
        bail!("no control `{label}` at `{path}`");
    }
    Ok(())
}

fn parse_path(path: &str) -> Result<Vec<usize>> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    path.split('.')
        .map(|index| {
            index
                .parse()
                .with_context(|| format!("invalid path segment `{index}`"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_editor() -> Editor {
        manos_plate_widgets::editor(&WidgetsConfig::default()).unwrap()
    }

    #[test]
    fn the_demo_script_runs_cleanly() {
        let mut editor = new_editor();
        for step in DEMO_COMMANDS {
            run_step(&mut editor, step).unwrap();
        }
        let data = editor.get_data();
        assert!(data.contains(r#"<section class="widget-box">"#));
        assert!(data.contains(r#"<section class="insert-box">"#));
        assert!(data.contains(r#"<aside class="side-card side-card-alternate">"#));
        assert!(data.contains(r#"<span class="placeholder">{first name}</span>"#));
    }

    #[test]
    fn paths_and_controls_are_parsed() {
        assert_eq!(parse_path("").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_path("0.2.1").unwrap(), vec![0, 2, 1]);
        assert!(parse_path("0.x").is_err());
        assert!(run_step(&mut new_editor(), "@0:x").is_err());

        let mut editor = new_editor();
        run_step(&mut editor, "sideCard.insert").unwrap();
        let mut answer = FixedAnswer(Some("https://example.com".into()));
        press(&mut editor, "0:Set URL", &mut answer).unwrap();
        assert!(editor.get_data().contains("https://example.com"));
        assert!(press(&mut editor, "0:Explode", &mut answer).is_err());
        assert!(press(&mut editor, "no-colon", &mut answer).is_err());
    }

    #[test]
    fn bad_arguments_are_reported() {
        let mut editor = new_editor();
        assert!(run_step(&mut editor, "sideCard.insert={oops").is_err());
        assert!(run_step(&mut editor, "nothing.here").is_err());
    }
}
