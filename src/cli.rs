use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::GraphView;
use crate::interact::Viewport;
use crate::layout::dagre::{DagreLayout, Rankdir};
use crate::model::GraphData;
use crate::reconcile::RenderMode;
use crate::render::ShapeRenderer;
use crate::scene::{Scene, SceneEdge, SceneNode};

#[derive(Parser, Debug)]
#[command(name = "cgv", version, about = "Compound graph layout/scene dump tool")]
pub struct Args {
    /// Input graph JSON file, or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the scene dump. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Engine config JSON file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Render mode
    #[arg(short = 'm', long = "mode", value_enum, default_value = "delta")]
    pub mode: Mode,

    /// Layout direction
    #[arg(short = 'r', long = "rankdir", value_enum, default_value = "tb")]
    pub rankdir: Direction,

    /// Collapse a container after the initial pass (repeatable)
    #[arg(long = "collapse")]
    pub collapse: Vec<String>,

    /// Expand a collapsed container (repeatable)
    #[arg(long = "expand")]
    pub expand: Vec<String>,

    /// Group siblings: name=id1,id2,... (repeatable)
    #[arg(long = "group")]
    pub group: Vec<String>,

    /// Dissolve a container (repeatable)
    #[arg(long = "ungroup")]
    pub ungroup: Vec<String>,

    /// Fit the viewport to the content before dumping
    #[arg(long = "fit")]
    pub fit: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Mode {
    Basic,
    Delta,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Direction {
    Tb,
    Lr,
}

/// Renderer that narrates scene changes through the log facade; enable
/// with RUST_LOG=info.
#[derive(Debug, Default)]
struct LogRenderer;

fn node_ids(nodes: &[&SceneNode]) -> String {
    nodes
        .iter()
        .map(|n| n.id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn edge_keys(edges: &[&SceneEdge]) -> String {
    edges
        .iter()
        .map(|e| e.key.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

impl ShapeRenderer for LogRenderer {
    fn node_added(&mut self, nodes: &[&SceneNode]) {
        log::info!("nodes added: {}", node_ids(nodes));
    }
    fn node_updated(&mut self, nodes: &[&SceneNode]) {
        log::info!("nodes updated: {}", node_ids(nodes));
    }
    fn node_removed(&mut self, nodes: &[&SceneNode]) {
        log::info!("nodes removed: {}", node_ids(nodes));
    }
    fn edge_added(&mut self, edges: &[&SceneEdge]) {
        log::info!("edges added: {}", edge_keys(edges));
    }
    fn edge_updated(&mut self, edges: &[&SceneEdge]) {
        log::info!("edges updated: {}", edge_keys(edges));
    }
    fn edge_removed(&mut self, edges: &[&SceneEdge]) {
        log::info!("edges removed: {}", edge_keys(edges));
    }
    fn render_node(&mut self, nodes: &[&SceneNode]) {
        log::info!("draw nodes: {}", node_ids(nodes));
    }
    fn render_edge(&mut self, edges: &[&SceneEdge]) {
        log::info!("draw edges: {}", edge_keys(edges));
    }
}

#[derive(Serialize)]
struct SceneDump<'a> {
    scene: &'a Scene,
    viewport: &'a Viewport,
}

pub fn run() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let input = read_input(args.input.as_deref())?;
    let graph: GraphData = serde_json::from_str(&input)?;

    let adapter = DagreLayout {
        rankdir: match args.rankdir {
            Direction::Tb => Rankdir::TopBottom,
            Direction::Lr => Rankdir::LeftRight,
        },
        default_node_width: config.default_node_width,
        default_node_height: config.default_node_height,
        ..DagreLayout::default()
    };

    let mut view = GraphView::with_config(Box::new(adapter), Box::new(LogRenderer), config);
    view.set_mode(match args.mode {
        Mode::Basic => RenderMode::Basic,
        Mode::Delta => RenderMode::Delta,
    });
    view.set_data(graph)?;

    for id in &args.collapse {
        view.collapse(id)?;
    }
    for id in &args.expand {
        view.expand(id)?;
    }
    for entry in &args.group {
        let (name, ids) = parse_group(entry)?;
        let ids: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        view.group(name, &ids)?;
    }
    for name in &args.ungroup {
        view.ungroup(name)?;
    }
    if args.fit {
        view.fit();
    }

    let dump = SceneDump {
        scene: view.scene(),
        viewport: view.viewport(),
    };
    let json = serde_json::to_string_pretty(&dump)?;
    write_output(&json, args.output.as_deref())?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_output(json: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn parse_group(entry: &str) -> Result<(&str, Vec<String>)> {
    let Some((name, rest)) = entry.split_once('=') else {
        return Err(anyhow::anyhow!("--group expects name=id1,id2,..."));
    };
    let ids: Vec<String> = rest
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if ids.is_empty() {
        return Err(anyhow::anyhow!("--group `{name}` lists no member ids"));
    }
    Ok((name, ids))
}
