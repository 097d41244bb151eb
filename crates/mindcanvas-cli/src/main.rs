use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mindcanvas_core::{CanvasDocument, NodeContent, NodeId, Vec2};
use mindcanvas_graph::Canvas;
use mindcanvas_graph::geometry::{fit_to_bounds, nodes_bounds};
use mindcanvas_storage::{read_document, write_document};
use std::path::{Path, PathBuf};

/// Inspect and rearrange exported canvas documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a document is structurally consistent
    Validate { file: PathBuf },
    /// Run the force-directed layout and write the result
    Layout {
        file: PathBuf,
        /// Where to write the arranged document (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only arrange these node ids (defaults to every node)
        #[arg(long = "node")]
        nodes: Vec<String>,
    },
    /// Store a transform that fits every node into a viewport
    Fit {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 1280.0)]
        width: f32,
        #[arg(long, default_value_t = 800.0)]
        height: f32,
        #[arg(long, default_value_t = 50.0)]
        padding: f32,
    },
    /// Print entity counts and content bounds
    Stats { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    match args.command {
        Command::Validate { file } => {
            let document = load(&file)?;
            println!(
                "{}: ok ({} nodes, {} connections, {} groups)",
                file.display(),
                document.nodes.len(),
                document.connections.len(),
                document.groups.len()
            );
        }
        Command::Layout {
            file,
            output,
            nodes,
        } => {
            let document = load(&file)?;
            let ids = parse_ids(&nodes)?;
            let arranged = arrange(document, &ids)?;
            let target = output.unwrap_or(file);
            write_document(&target, &arranged)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("Arranged {} nodes into {}", arranged.nodes.len(), target.display());
        }
        Command::Fit {
            file,
            output,
            width,
            height,
            padding,
        } => {
            let mut document = load(&file)?;
            if !(width > 0.0 && height > 0.0) {
                bail!("Viewport must have a positive size");
            }
            document.transform = fit_to_bounds(
                &document.nodes,
                Vec2::new(width, height),
                padding,
                1.0,
            );
            let target = output.unwrap_or(file);
            write_document(&target, &document)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            let translation = document.transform.translation();
            println!(
                "Transform x={:.1} y={:.1} scale={:.3}",
                translation.x,
                translation.y,
                document.transform.scale()
            );
        }
        Command::Stats { file } => {
            let document = load(&file)?;
            print!("{}", stats(&document));
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<CanvasDocument> {
    read_document(path).with_context(|| format!("Invalid canvas document {}", path.display()))
}

fn parse_ids(raw: &[String]) -> Result<Vec<NodeId>> {
    raw.iter()
        .map(|s| {
            s.parse()
                .map(NodeId)
                .with_context(|| format!("Not a node id: {s}"))
        })
        .collect()
}

/// Lay out `ids` (every node when empty) and return the updated document.
fn arrange(document: CanvasDocument, ids: &[NodeId]) -> Result<CanvasDocument> {
    let mut canvas = Canvas::new(document.canvas_name.clone());
    canvas.load_document(document)?;
    let ids: Vec<NodeId> = if ids.is_empty() {
        canvas.graph().node_ids().collect()
    } else {
        ids.to_vec()
    };
    match canvas.auto_layout(&ids) {
        Some(outcome) => tracing::info!(
            "Layout finished after {} iterations (converged: {})",
            outcome.iterations,
            outcome.converged
        ),
        None => tracing::info!("Fewer than two nodes to arrange; document unchanged"),
    }
    Ok(canvas.to_document())
}

fn stats(document: &CanvasDocument) -> String {
    let mut text = 0;
    let mut image = 0;
    let mut link = 0;
    let mut video = 0;
    for node in &document.nodes {
        match node.content {
            NodeContent::Text { .. } => text += 1,
            NodeContent::Image { .. } => image += 1,
            NodeContent::Link { .. } => link += 1,
            NodeContent::Video { .. } => video += 1,
        }
    }
    let grouped = document.nodes.iter().filter(|n| n.group_id.is_some()).count();

    let mut out = format!("Canvas: {}\n", document.canvas_name);
    out.push_str(&format!(
        "Nodes: {} (text {}, image {}, link {}, video {})\n",
        document.nodes.len(),
        text,
        image,
        link,
        video
    ));
    out.push_str(&format!("Connections: {}\n", document.connections.len()));
    out.push_str(&format!(
        "Groups: {} ({} grouped nodes)\n",
        document.groups.len(),
        grouped
    ));
    match nodes_bounds(&document.nodes) {
        Some(bounds) => out.push_str(&format!(
            "Bounds: ({:.1}, {:.1}) - ({:.1}, {:.1})\n",
            bounds.min.x, bounds.min.y, bounds.max.x, bounds.max.y
        )),
        None => out.push_str("Bounds: empty\n"),
    }
    out
}
